use crate::config::StackConfig;
use crate::io::asf_search::{ArchiveSearch, SearchQuery};
use crate::types::{SceneMap, StackError, StackResult, TOKEN_DATE_FORMAT};
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Sentinel-1 scene name, e.g. `S1A_IW_SLC__1SDV_20180101T152512_...`.
/// The acquisition date sits at characters 17..25.
fn scene_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^S1[A-D]_[A-Z0-9]{2}_[A-Z_]{4}_[A-Z0-9]{4}_(\d{8})T\d{6}_")
            .expect("scene name pattern is valid")
    })
}

/// Acquisition date embedded in a scene name
pub fn scene_date(scene_name: &str) -> Option<NaiveDate> {
    let captures = scene_name_pattern().captures(scene_name)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), TOKEN_DATE_FORMAT).ok()
}

/// Resolves acquisition dates to catalog scenes for one stack geometry
pub struct CatalogResolver<'a> {
    search: &'a dyn ArchiveSearch,
}

impl<'a> CatalogResolver<'a> {
    pub fn new(search: &'a dyn ArchiveSearch) -> Self {
        Self { search }
    }

    /// Search window: one day of padding on each side of the date extrema
    pub fn search_query(stack: &StackConfig, dates: &BTreeSet<NaiveDate>) -> StackResult<SearchQuery> {
        let (first, last) = match (dates.iter().next(), dates.iter().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(StackError::EmptyInput("no dates to resolve".to_string())),
        };

        Ok(SearchQuery::sentinel1_slc(
            (stack.point_of_interest.lon, stack.point_of_interest.lat),
            first - Duration::days(1),
            last + Duration::days(1),
            stack.direction,
            stack.relative_orbit,
        ))
    }

    /// Map every date to exactly one scene.
    ///
    /// Fails on the first date (in ascending order) that matches zero or
    /// several distinct scene names; no partial mapping is returned.
    pub fn resolve(&self, stack: &StackConfig, dates: &BTreeSet<NaiveDate>) -> StackResult<SceneMap> {
        let query = Self::search_query(stack, dates)?;
        let results = self.search.search(&query)?;

        // date -> scene name -> acquisition start, as reported by the archive
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, Option<String>>> = BTreeMap::new();
        for result in results {
            match scene_date(&result.scene_name) {
                Some(date) => {
                    by_date
                        .entry(date)
                        .or_default()
                        .insert(result.scene_name, result.start_time);
                }
                None => log::warn!("Ignoring unrecognised scene name: {}", result.scene_name),
            }
        }

        let mut scenes = SceneMap::new();
        for date in dates {
            let candidates = by_date.remove(date).unwrap_or_default();
            if candidates.len() != 1 {
                log::error!(
                    "Stack {}: {} candidate scenes for {}",
                    stack.name,
                    candidates.len(),
                    date
                );
                for (name, start_time) in &candidates {
                    log::error!("  {} (start {})", name, start_time.as_deref().unwrap_or("unknown"));
                }
                return Err(StackError::Cardinality {
                    date: *date,
                    count: candidates.len(),
                });
            }
            if let Some((scene, _)) = candidates.into_iter().next() {
                scenes.insert(*date, scene);
            }
        }

        log::info!("Stack {}: resolved {} dates to scenes", stack.name, scenes.len());
        Ok(scenes)
    }
}
