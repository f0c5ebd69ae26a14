use crate::types::{StackError, StackResult};
use std::fs;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

/// Unpack a product archive next to itself.
///
/// HyP3 products contain a single top-level directory named after the
/// archive; the extracted directory is returned. Entries are unpacked into a
/// hidden staging directory and moved into place only once complete. An
/// existing product directory is reused when it holds every archive entry
/// at its full size, and replaced otherwise.
pub fn extract_zipped_product(zip_path: &Path) -> StackResult<PathBuf> {
    let invalid = |reason: String| StackError::Archive {
        path: zip_path.to_path_buf(),
        reason,
    };

    let stem = zip_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("archive has no file name".to_string()))?
        .to_string();
    let parent = zip_path.parent().unwrap_or_else(|| Path::new("."));
    let product_dir = parent.join(&stem);

    let file = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| invalid(e.to_string()))?;

    if archive.len() == 0 {
        return Err(invalid("archive is empty".to_string()));
    }

    let mut expected = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| invalid(format!("entry {}: {}", i, e)))?;
        let name = entry
            .enclosed_name()
            .ok_or_else(|| invalid(format!("unsafe entry path: {}", entry.name())))?
            .to_path_buf();

        match name.components().next() {
            Some(Component::Normal(top)) if top == stem.as_str() => {}
            _ => {
                return Err(invalid(format!(
                    "entry {} is outside the expected product directory {}",
                    name.display(),
                    stem
                )))
            }
        }
        if !entry.is_dir() {
            expected.push((name, entry.size()));
        }
    }

    if product_dir.is_dir() {
        let complete = expected.iter().all(|(name, size)| {
            fs::metadata(parent.join(name)).map_or(false, |m| m.is_file() && m.len() == *size)
        });
        if complete {
            log::debug!("Product already extracted: {}", product_dir.display());
            return Ok(product_dir);
        }
        log::warn!("Replacing incomplete product directory {}", product_dir.display());
        fs::remove_dir_all(&product_dir)?;
    }

    let staging = parent.join(format!(".{}.extracting", stem));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    log::info!("Extracting {} ({} entries)", zip_path.display(), archive.len());
    if let Err(e) = archive.extract(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(invalid(e.to_string()));
    }
    fs::rename(staging.join(&stem), &product_dir)?;
    fs::remove_dir_all(&staging)?;

    Ok(product_dir)
}
