use crate::config::DateWindow;
use crate::types::{DatePair, PairRecord, SceneMap, StackError, StackResult};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Builds the ordered pair table of a stack from raw tokens.
///
/// Pure: all I/O (search, persistence) happens outside.
#[derive(Debug, Clone)]
pub struct PairManifestBuilder {
    pairs: Vec<DatePair>,
}

impl PairManifestBuilder {
    /// Parse pair tokens; blank lines are skipped
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> StackResult<Self> {
        let pairs = tokens
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(DatePair::parse)
            .collect::<StackResult<Vec<_>>>()?;

        log::debug!("Parsed {} pair tokens", pairs.len());
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[DatePair] {
        &self.pairs
    }

    /// Distinct dates referenced by any pair, ascending
    pub fn distinct_dates(&self) -> BTreeSet<NaiveDate> {
        self.pairs.iter().flat_map(|p| [p.date1, p.date2]).collect()
    }

    /// Join every pair against the scene map, ordered by `date1`
    pub fn build(&self, scenes: &SceneMap) -> StackResult<Vec<PairRecord>> {
        let lookup = |date: NaiveDate| scenes.get(&date).cloned().ok_or(StackError::MissingScene(date));

        let mut records = self
            .pairs
            .iter()
            .map(|p| {
                Ok(PairRecord {
                    date1: p.date1,
                    date2: p.date2,
                    scene1: lookup(p.date1)?,
                    scene2: lookup(p.date2)?,
                })
            })
            .collect::<StackResult<Vec<_>>>()?;

        sort_by_date1(&mut records);
        Ok(records)
    }

    /// Build, then keep the pairs inside `window`
    pub fn build_filtered(&self, scenes: &SceneMap, window: &DateWindow) -> StackResult<Vec<PairRecord>> {
        let records = self.build(scenes)?;
        let total = records.len();
        let kept = filter_window(records, window);
        log::info!(
            "Kept {} of {} pairs inside ({}, {})",
            kept.len(),
            total,
            window.start,
            window.stop
        );
        Ok(kept)
    }
}

/// Stable sort on `date1`
pub fn sort_by_date1(records: &mut [PairRecord]) {
    records.sort_by_key(|r| r.date1);
}

/// Keep pairs with `date1 > start` and `date2 < stop`
pub fn filter_window(records: Vec<PairRecord>, window: &DateWindow) -> Vec<PairRecord> {
    records
        .into_iter()
        .filter(|r| window.contains_pair(r.date1, r.date2))
        .collect()
}
