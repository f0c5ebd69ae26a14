//! Common-overlap computation and clipping of per-pair raster products.
//!
//! Every product of a stack must share one pixel grid before time-series
//! inversion; the footprint is the intersection of the DEM extents and each
//! product band is cut to it.

use crate::types::{OverlapFootprint, RasterExtent, StackError, StackResult};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Product bands clipped for each pair
pub const PRODUCT_SUFFIXES: [&str; 6] = [
    "_water_mask.tif",
    "_corr.tif",
    "_unw_phase.tif",
    "_dem.tif",
    "_lv_theta.tif",
    "_lv_phi.tif",
];

/// Band whose extents define the common footprint
pub const FOOTPRINT_SUFFIX: &str = "_dem.tif";

pub const CLIPPED_TAG: &str = "_clipped";

/// Pixel window of a clip: offset and size in source pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

/// `foo_dem.tif` → `foo_dem_clipped.tif`
pub fn clipped_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("tif");
    path.with_file_name(format!("{}{}.{}", stem, CLIPPED_TAG, ext))
}

/// Corner coordinates of a north-up raster
pub fn raster_extent(path: &Path) -> StackResult<RasterExtent> {
    let dataset = Dataset::open(path)?;
    let gt = dataset.geo_transform()?;
    ensure_north_up(&gt, path)?;
    let (width, height) = dataset.raster_size();
    Ok(RasterExtent::from_geo_transform(&gt, width, height))
}

fn ensure_north_up(gt: &[f64; 6], path: &Path) -> StackResult<()> {
    if gt[2] != 0.0 || gt[4] != 0.0 || gt[1] <= 0.0 || gt[5] >= 0.0 {
        return Err(StackError::Raster {
            path: path.to_path_buf(),
            reason: format!("geotransform {:?} is not north-up", gt),
        });
    }
    Ok(())
}

/// Intersection of the extents of `paths`
pub fn common_footprint(paths: &[PathBuf]) -> StackResult<OverlapFootprint> {
    if paths.is_empty() {
        return Err(StackError::EmptyInput(
            "no rasters to compute a common overlap from".to_string(),
        ));
    }

    let extents = paths
        .iter()
        .map(|p| raster_extent(p))
        .collect::<StackResult<Vec<_>>>()?;

    let footprint = OverlapFootprint::intersection(&extents)?;
    log::info!("Common footprint of {} rasters: {}", paths.len(), footprint);
    Ok(footprint)
}

/// How a footprint maps onto one raster's pixel grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFit {
    /// The raster covers the whole footprint
    Covered(PixelWindow),
    /// The raster covers only part of the footprint
    Partial,
    /// Inverted footprint, or no shared pixel at all
    Disjoint,
}

/// Source pixel window of `footprint`, snapped to the raster grid.
///
/// The window is never shrunk to the raster edge: a clipped output must
/// carry exactly the footprint corners.
pub fn pixel_window(gt: &[f64; 6], raster_size: (usize, usize), footprint: &OverlapFootprint) -> WindowFit {
    if !footprint.is_valid() {
        return WindowFit::Disjoint;
    }

    let (width, height) = (raster_size.0 as f64, raster_size.1 as f64);
    let col = |x: f64| ((x - gt[0]) / gt[1]).round();
    let row = |y: f64| ((y - gt[3]) / gt[5]).round();

    let x0 = col(footprint.upper_left_x);
    let x1 = col(footprint.lower_right_x);
    let y0 = row(footprint.upper_left_y);
    let y1 = row(footprint.lower_right_y);

    if x1 <= x0 || y1 <= y0 || x1 <= 0.0 || y1 <= 0.0 || x0 >= width || y0 >= height {
        return WindowFit::Disjoint;
    }
    if x0 < 0.0 || y0 < 0.0 || x1 > width || y1 > height {
        return WindowFit::Partial;
    }

    WindowFit::Covered(PixelWindow {
        x_offset: x0 as usize,
        y_offset: y0 as usize,
        width: (x1 - x0) as usize,
        height: (y1 - y0) as usize,
    })
}

fn is_supported_band_type(band_type: GdalDataType) -> bool {
    matches!(
        band_type,
        GdalDataType::UInt8
            | GdalDataType::UInt16
            | GdalDataType::Int16
            | GdalDataType::UInt32
            | GdalDataType::Int32
            | GdalDataType::Float32
            | GdalDataType::Float64
    )
}

/// Clip `src` to `footprint`, writing a GeoTIFF to `dst`.
///
/// Band type, band count, projection and no-data values are carried over.
pub fn clip_to_footprint(src: &Path, footprint: &OverlapFootprint, dst: &Path) -> StackResult<PathBuf> {
    let no_overlap = || StackError::NoOverlap {
        footprint: *footprint,
        path: src.to_path_buf(),
    };

    if !footprint.is_valid() {
        return Err(no_overlap());
    }

    let dataset = Dataset::open(src)?;
    let gt = dataset.geo_transform()?;
    ensure_north_up(&gt, src)?;
    let window = match pixel_window(&gt, dataset.raster_size(), footprint) {
        WindowFit::Covered(window) => window,
        WindowFit::Partial => {
            return Err(StackError::Raster {
                path: src.to_path_buf(),
                reason: format!("does not cover footprint {}", footprint),
            })
        }
        WindowFit::Disjoint => return Err(no_overlap()),
    };

    log::debug!(
        "Clipping {} to window x={}+{} y={}+{}",
        src.display(),
        window.x_offset,
        window.width,
        window.y_offset,
        window.height
    );

    let band_type = dataset.rasterband(1)?.band_type();
    if !is_supported_band_type(band_type) {
        return Err(StackError::Raster {
            path: src.to_path_buf(),
            reason: format!("unsupported band type {:?}", band_type),
        });
    }

    match band_type {
        GdalDataType::UInt8 => copy_window::<u8>(&dataset, &gt, &window, dst)?,
        GdalDataType::UInt16 => copy_window::<u16>(&dataset, &gt, &window, dst)?,
        GdalDataType::Int16 => copy_window::<i16>(&dataset, &gt, &window, dst)?,
        GdalDataType::UInt32 => copy_window::<u32>(&dataset, &gt, &window, dst)?,
        GdalDataType::Int32 => copy_window::<i32>(&dataset, &gt, &window, dst)?,
        GdalDataType::Float64 => copy_window::<f64>(&dataset, &gt, &window, dst)?,
        // Float32, the only supported type left
        _ => copy_window::<f32>(&dataset, &gt, &window, dst)?,
    }

    Ok(dst.to_path_buf())
}

fn copy_window<T: GdalType + Copy>(
    src: &Dataset,
    gt: &[f64; 6],
    window: &PixelWindow,
    dst: &Path,
) -> StackResult<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let band_count = src.raster_count();
    let size = (window.width, window.height);
    let offset = (window.x_offset as isize, window.y_offset as isize);

    let mut output = driver.create_with_band_type::<T, _>(
        dst,
        window.width as isize,
        window.height as isize,
        band_count,
    )?;

    output.set_geo_transform(&[
        gt[0] + window.x_offset as f64 * gt[1],
        gt[1],
        0.0,
        gt[3] + window.y_offset as f64 * gt[5],
        0.0,
        gt[5],
    ])?;

    let projection = src.projection();
    if !projection.is_empty() {
        output.set_projection(&projection)?;
    }

    for index in 1..=band_count {
        let band = src.rasterband(index)?;
        let data: Array2<T> = band.read_as_array::<T>(offset, size, size, None)?;

        let mut out_band = output.rasterband(index)?;
        if let Some(no_data) = band.no_data_value() {
            out_band.set_no_data_value(Some(no_data))?;
        }
        let buffer = Buffer::new(size, data.into_raw_vec());
        out_band.write((0, 0), size, &buffer)?;
    }

    Ok(())
}

/// Outcome of clipping a product set
#[derive(Debug, Clone, Default)]
pub struct ClipSummary {
    pub clipped: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl ClipSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
enum ProductSource {
    /// Every product directory one level below a stack directory
    StackDir(PathBuf),
    /// An explicit list of product directories
    Products(Vec<PathBuf>),
}

/// Finds, measures and clips a set of products.
///
/// A product is a directory of rasters named `<name><suffix>`.
#[derive(Debug, Clone)]
pub struct OverlapNormalizer {
    source: ProductSource,
}

impl OverlapNormalizer {
    /// All products under `<root>/<product>/`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            source: ProductSource::StackDir(root.as_ref().to_path_buf()),
        }
    }

    /// Only the given product directories
    pub fn with_products(product_dirs: Vec<PathBuf>) -> Self {
        Self {
            source: ProductSource::Products(product_dirs),
        }
    }

    /// Product files ending in `suffix`, sorted
    pub fn find_products(&self, suffix: &str) -> StackResult<Vec<PathBuf>> {
        let patterns: Vec<String> = match &self.source {
            ProductSource::StackDir(root) => {
                vec![format!("{}/*/*{}", glob::Pattern::escape(&root.to_string_lossy()), suffix)]
            }
            ProductSource::Products(dirs) => dirs
                .iter()
                .map(|dir| format!("{}/*{}", glob::Pattern::escape(&dir.to_string_lossy()), suffix))
                .collect(),
        };

        let mut paths = Vec::new();
        for pattern in patterns {
            paths.extend(glob::glob(&pattern)?.filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    log::warn!("Unreadable path while scanning products: {}", e);
                    None
                }
            }));
        }
        paths.sort();
        Ok(paths)
    }

    pub fn footprint(&self) -> StackResult<OverlapFootprint> {
        let dems = self.find_products(FOOTPRINT_SUFFIX)?;
        common_footprint(&dems)
    }

    /// Clip every product band to `footprint`; failures do not stop siblings
    pub fn clip_all(&self, footprint: &OverlapFootprint) -> StackResult<ClipSummary> {
        let mut files = Vec::new();
        for suffix in PRODUCT_SUFFIXES {
            files.extend(self.find_products(suffix)?);
        }

        log::info!("Clipping {} rasters to {}", files.len(), footprint);

        let results: Vec<(PathBuf, Result<PathBuf, String>)> = files
            .par_iter()
            .map(|src| {
                let result = clip_to_footprint(src, footprint, &clipped_path(src)).map_err(|e| e.to_string());
                (src.clone(), result)
            })
            .collect();

        let mut summary = ClipSummary::default();
        for (src, result) in results {
            match result {
                Ok(dst) => summary.clipped.push(dst),
                Err(reason) => {
                    log::warn!("Clip of {} failed: {}", src.display(), reason);
                    summary.failures.push((src, reason));
                }
            }
        }
        Ok(summary)
    }

    /// Footprint plus clip in one step
    pub fn normalize(&self) -> StackResult<(OverlapFootprint, ClipSummary)> {
        let footprint = self.footprint()?;
        let summary = self.clip_all(&footprint)?;
        Ok((footprint, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GT: [f64; 6] = [500000.0, 80.0, 0.0, 6340000.0, 0.0, -80.0];

    fn footprint(ulx: f64, uly: f64, lrx: f64, lry: f64) -> OverlapFootprint {
        OverlapFootprint {
            upper_left_x: ulx,
            upper_left_y: uly,
            lower_right_x: lrx,
            lower_right_y: lry,
        }
    }

    #[test]
    fn test_clipped_path() {
        let path = Path::new("/stack/S1AA_x/S1AA_x_unw_phase.tif");
        assert_eq!(clipped_path(path), PathBuf::from("/stack/S1AA_x/S1AA_x_unw_phase_clipped.tif"));
    }

    #[test]
    fn test_pixel_window_full_extent() {
        let fp = footprint(500000.0, 6340000.0, 500000.0 + 100.0 * 80.0, 6340000.0 - 50.0 * 80.0);
        let fit = pixel_window(&GT, (100, 50), &fp);
        assert_eq!(fit, WindowFit::Covered(PixelWindow { x_offset: 0, y_offset: 0, width: 100, height: 50 }));
    }

    #[test]
    fn test_pixel_window_snaps_to_grid() {
        // 10.4 and 20.6 pixel offsets round to 10 and 21
        let fp = footprint(
            500000.0 + 10.4 * 80.0,
            6340000.0 - 5.0 * 80.0,
            500000.0 + 20.6 * 80.0,
            6340000.0 - 15.0 * 80.0,
        );
        let fit = pixel_window(&GT, (100, 50), &fp);
        assert_eq!(fit, WindowFit::Covered(PixelWindow { x_offset: 10, y_offset: 5, width: 11, height: 10 }));
    }

    #[test]
    fn test_pixel_window_inverted_footprint() {
        let fp = footprint(510000.0, 6300000.0, 505000.0, 6330000.0);
        assert_eq!(pixel_window(&GT, (100, 50), &fp), WindowFit::Disjoint);
    }

    #[test]
    fn test_pixel_window_outside_raster() {
        let fp = footprint(0.0, 100.0, 50.0, 0.0);
        assert_eq!(pixel_window(&GT, (100, 50), &fp), WindowFit::Disjoint);
    }

    #[test]
    fn test_pixel_window_half_covered_is_not_shrunk() {
        // Footprint starts 50 pixels west of the raster
        let gt = [500000.0, 80.0, 0.0, 6340000.0, 0.0, -80.0];
        let fp = footprint(496000.0, 6340000.0, 504000.0, 6332000.0);
        assert_eq!(pixel_window(&gt, (100, 100), &fp), WindowFit::Partial);

        let fp = footprint(500000.0, 6340000.0, 504000.0, 6328000.0);
        assert_eq!(pixel_window(&gt, (100, 100), &fp), WindowFit::Partial);
    }

    #[test]
    fn test_supported_band_types() {
        assert!(is_supported_band_type(GdalDataType::UInt8));
        assert!(is_supported_band_type(GdalDataType::Float32));
        assert!(is_supported_band_type(GdalDataType::Float64));
        assert!(!is_supported_band_type(GdalDataType::Unknown));
    }

    #[test]
    fn test_common_footprint_empty() {
        assert!(matches!(common_footprint(&[]), Err(StackError::EmptyInput(_))));
    }
}
