use crate::types::{StackError, StackResult};
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

/// Published list of InSAR pairs for the Edgecumbe study
pub const SCENE_LIST_URL: &str = "https://zenodo.org/record/7151431/files/InSAR_scenes.txt";

/// Download `url` to `path` unless the file is already present
pub fn download_to_file(url: &str, path: &Path) -> StackResult<()> {
    if path.exists() {
        log::debug!("Pair list already present: {}", path.display());
        return Ok(());
    }

    log::info!("Downloading pair list from {}", url);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| StackError::Remote(format!("Failed to create HTTP client: {}", e)))?;

    let response = client.get(url).send()?;
    if !response.status().is_success() {
        return Err(StackError::Remote(format!(
            "Pair list download failed with status: {}",
            response.status()
        )));
    }

    let bytes = response.bytes()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;
    log::info!("Pair list saved to: {}", path.display());
    Ok(())
}

/// Lines `[start, end)` of a pair list; out-of-range bounds are clamped
pub fn select_lines(content: &str, lines: &Range<usize>) -> Vec<String> {
    let all: Vec<&str> = content.split('\n').collect();
    let end = lines.end.min(all.len());
    let start = lines.start.min(end);
    all[start..end].iter().map(|l| l.trim_end_matches('\r').to_string()).collect()
}

/// Read the pair tokens of one stack from a pair list file
pub fn read_pair_tokens(path: &Path, lines: &Range<usize>) -> StackResult<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(select_lines(&content, lines))
}
