//! Pipeline and per-stack configuration.
//!
//! Every geographic constant a stack needs lives in [`StackConfig`]; the
//! config value is passed explicitly to each stage.

use crate::io::asf_search::ASF_SEARCH_URL;
use crate::io::hyp3::HYP3_API_URL;
use crate::io::pair_list::SCENE_LIST_URL;
use crate::types::{FlightDirection, StackError, StackResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Half-open acquisition window `[start, stop)`; pairs are kept when
/// `date1 > start && date2 < stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub stop: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, stop: NaiveDate) -> Self {
        Self { start, stop }
    }

    pub fn contains_pair(&self, date1: NaiveDate, date2: NaiveDate) -> bool {
        date1 > self.start && date2 < self.stop
    }
}

/// Region of interest in geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// (latitude, longitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub lat: f64,
    pub lon: f64,
}

/// (longitude, latitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub lon: f64,
    pub lat: f64,
}

/// One independently processed imaging geometry and time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    pub direction: FlightDirection,
    pub relative_orbit: u32,
    pub date_window: DateWindow,
    pub mask_enabled: bool,
    pub point_of_interest: PointOfInterest,
    pub roi_box: RoiBox,
    pub reference_point: ReferencePoint,
    /// Line range `[start, stop)` of the pair list belonging to this stack
    pub pair_lines: Range<usize>,
}

impl StackConfig {
    /// Stack with the Edgecumbe geographic constants
    pub fn edgecumbe(direction: FlightDirection, relative_orbit: u32, pair_lines: Range<usize>) -> Self {
        Self {
            name: format!("{}_{}", direction, relative_orbit),
            direction,
            relative_orbit,
            date_window: DateWindow::new(ymd(2018, 1, 1), ymd(2020, 1, 1)),
            mask_enabled: true,
            point_of_interest: PointOfInterest { lon: -135.7525, lat: 57.0524 },
            roi_box: RoiBox {
                min_lat: 56.93,
                max_lat: 57.18,
                min_lon: -135.95,
                max_lon: -135.55,
            },
            reference_point: ReferencePoint { lat: 57.05, lon: -135.87 },
            pair_lines,
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        if self.name.trim().is_empty() {
            return Err(StackError::Config("stack name must not be empty".to_string()));
        }
        let fail = |msg: String| Err(StackError::Config(format!("stack '{}': {}", self.name, msg)));

        if !(1..=175).contains(&self.relative_orbit) {
            return fail(format!("relative orbit {} outside 1..=175", self.relative_orbit));
        }
        if self.date_window.start >= self.date_window.stop {
            return fail(format!(
                "date window start {} is not before stop {}",
                self.date_window.start, self.date_window.stop
            ));
        }
        let roi = &self.roi_box;
        if roi.min_lat >= roi.max_lat || roi.min_lon >= roi.max_lon {
            return fail(format!("invalid ROI box {:?}", roi));
        }
        if !(-90.0..=90.0).contains(&roi.min_lat) || !(-90.0..=90.0).contains(&roi.max_lat) {
            return fail("ROI latitude outside [-90, 90]".to_string());
        }
        let reference = &self.reference_point;
        if reference.lat < roi.min_lat
            || reference.lat > roi.max_lat
            || reference.lon < roi.min_lon
            || reference.lon > roi.max_lon
        {
            return fail(format!("reference point {:?} lies outside the ROI box", reference));
        }
        let poi = &self.point_of_interest;
        if !(-180.0..=180.0).contains(&poi.lon) || !(-90.0..=90.0).contains(&poi.lat) {
            return fail(format!("point of interest {:?} is not a valid lon/lat", poi));
        }
        if self.pair_lines.start >= self.pair_lines.end {
            return fail(format!("empty pair line range {:?}", self.pair_lines));
        }
        Ok(())
    }
}

/// Settings shared by all stacks of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub work_dir: PathBuf,
    pub pair_list_url: String,
    pub pair_list_path: PathBuf,
    pub search_url: String,
    pub hyp3_url: String,
    /// Environment variable holding the Earthdata Login token
    pub token_env: String,
    pub poll_interval_secs: u64,
    /// No limit when absent
    pub watch_timeout_secs: Option<u64>,
    pub stacks: Vec<StackConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            pair_list_url: SCENE_LIST_URL.to_string(),
            pair_list_path: PathBuf::from("InSAR_scenes.txt"),
            search_url: ASF_SEARCH_URL.to_string(),
            hyp3_url: HYP3_API_URL.to_string(),
            token_env: "EARTHDATA_TOKEN".to_string(),
            poll_interval_secs: 60,
            watch_timeout_secs: None,
            stacks: vec![
                StackConfig::edgecumbe(FlightDirection::Descending, 174, 810..1123),
                StackConfig::edgecumbe(FlightDirection::Ascending, 79, 433..708),
                StackConfig::edgecumbe(FlightDirection::Ascending, 50, 92..343),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> StackResult<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> StackResult<Self> {
        log::info!("Loading pipeline configuration: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> StackResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(StackError::Config("poll_interval_secs must be positive".to_string()));
        }

        let mut names = HashSet::new();
        for stack in &self.stacks {
            stack.validate()?;
            if !names.insert(stack.name.as_str()) {
                return Err(StackError::Config(format!("duplicate stack name '{}'", stack.name)));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn watch_timeout(&self) -> Option<Duration> {
        self.watch_timeout_secs.map(Duration::from_secs)
    }

    /// Pair list location, relative paths resolved against `work_dir`
    pub fn pair_list_file(&self) -> PathBuf {
        if self.pair_list_path.is_absolute() {
            self.pair_list_path.clone()
        } else {
            self.work_dir.join(&self.pair_list_path)
        }
    }

    pub fn stack_dir(&self, stack: &StackConfig) -> PathBuf {
        self.work_dir.join(&stack.name)
    }

    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
