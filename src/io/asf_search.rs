use crate::types::{FlightDirection, StackError, StackResult};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Default ASF search endpoint
pub const ASF_SEARCH_URL: &str = "https://api.daac.asf.alaska.edu";

/// Date format used in search windows
const SEARCH_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parameters of one archive search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// (longitude, latitude)
    pub point_of_interest: (f64, f64),
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub platform: String,
    pub processing_level: String,
    pub beam_mode: String,
    pub flight_direction: FlightDirection,
    pub relative_orbit: u32,
}

impl SearchQuery {
    /// Sentinel-1 IW SLC search around a point
    pub fn sentinel1_slc(
        point_of_interest: (f64, f64),
        start: NaiveDate,
        end: NaiveDate,
        flight_direction: FlightDirection,
        relative_orbit: u32,
    ) -> Self {
        Self {
            point_of_interest,
            start,
            end,
            platform: "SENTINEL-1".to_string(),
            processing_level: "SLC".to_string(),
            beam_mode: "IW".to_string(),
            flight_direction,
            relative_orbit,
        }
    }

    /// WKT point used for `intersectsWith`
    pub fn intersects_with(&self) -> String {
        format!("POINT({} {})", self.point_of_interest.0, self.point_of_interest.1)
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("platform", self.platform.clone()),
            ("intersectsWith", self.intersects_with()),
            ("start", self.start.format(SEARCH_DATE_FORMAT).to_string()),
            ("end", self.end.format(SEARCH_DATE_FORMAT).to_string()),
            ("processingLevel", self.processing_level.clone()),
            ("beamMode", self.beam_mode.clone()),
            ("flightDirection", self.flight_direction.as_query_value().to_string()),
            ("relativeOrbit", self.relative_orbit.to_string()),
            ("output", "geojson".to_string()),
        ]
    }
}

/// One scene returned by the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub scene_name: String,
    pub start_time: Option<String>,
}

/// Remote geospatial archive search
pub trait ArchiveSearch: Send + Sync {
    fn search(&self, query: &SearchQuery) -> StackResult<Vec<SearchResult>>;
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureProperties {
    scene_name: String,
    #[serde(default)]
    start_time: Option<String>,
}

/// Parse a GeoJSON search response body
pub fn parse_search_response(body: &str) -> StackResult<Vec<SearchResult>> {
    let collection: FeatureCollection = serde_json::from_str(body)?;
    Ok(collection
        .features
        .into_iter()
        .map(|f| SearchResult {
            scene_name: f.properties.scene_name,
            start_time: f.properties.start_time,
        })
        .collect())
}

/// HTTP client for the ASF search API
pub struct AsfSearchClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl AsfSearchClient {
    pub fn new(base_url: &str) -> StackResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("sarstack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StackError::Remote(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl ArchiveSearch for AsfSearchClient {
    fn search(&self, query: &SearchQuery) -> StackResult<Vec<SearchResult>> {
        let url = format!("{}/services/search/param", self.base_url);
        log::info!(
            "Searching {} {} orbit {} from {} to {}",
            query.platform,
            query.flight_direction,
            query.relative_orbit,
            query.start,
            query.end
        );

        let response = self.client.get(&url).query(&query.to_query_pairs()).send()?;

        if !response.status().is_success() {
            return Err(StackError::Remote(format!(
                "Archive search failed with status: {}",
                response.status()
            )));
        }

        let body = response.text()?;
        let results = parse_search_response(&body)?;
        log::debug!("Archive search returned {} scenes", results.len());
        Ok(results)
    }
}
