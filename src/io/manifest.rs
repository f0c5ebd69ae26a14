use crate::types::{FlightDirection, PairRecord, StackResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file name used for a direction/orbit stack
pub fn manifest_file_name(direction: FlightDirection, relative_orbit: u32) -> String {
    format!("{}_{}_pairs.csv", direction, relative_orbit)
}

/// Persist a manifest as CSV (`date1,date2,scene1,scene2`).
///
/// The file is written to a temporary sibling first so readers never see a
/// partially written manifest.
pub fn write_manifest(path: &Path, pairs: &[PairRecord]) -> StackResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp_path)?;
        for pair in pairs {
            writer.serialize(pair)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    log::info!("Wrote {} pairs to {}", pairs.len(), path.display());
    Ok(path.to_path_buf())
}

/// Read a manifest back, ordered by `date1`
pub fn read_manifest(path: &Path) -> StackResult<Vec<PairRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut pairs = reader
        .deserialize::<PairRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    pairs.sort_by_key(|p| p.date1);
    Ok(pairs)
}
