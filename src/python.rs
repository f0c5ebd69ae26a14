use pyo3::prelude::*;
use std::path::{Path, PathBuf};

use crate::core::overlap::{clip_to_footprint, clipped_path, common_footprint, OverlapNormalizer};
use crate::io::manifest::read_manifest;
use crate::types::OverlapFootprint;

fn to_py_err(e: crate::types::StackError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(compute_overlap, m)?)?;
    m.add_function(wrap_pyfunction!(clip_raster, m)?)?;
    m.add_function(wrap_pyfunction!(clip_stack, m)?)?;
    m.add_function(wrap_pyfunction!(load_manifest, m)?)?;
    Ok(())
}

/// Common footprint `(ulx, uly, lrx, lry)` of a list of rasters
#[pyfunction]
fn compute_overlap(paths: Vec<String>) -> PyResult<(f64, f64, f64, f64)> {
    let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
    let fp = common_footprint(&paths).map_err(to_py_err)?;
    Ok((fp.upper_left_x, fp.upper_left_y, fp.lower_right_x, fp.lower_right_y))
}

/// Clip one raster next to itself and return the output path
#[pyfunction]
fn clip_raster(path: String, footprint: (f64, f64, f64, f64)) -> PyResult<String> {
    let fp = OverlapFootprint {
        upper_left_x: footprint.0,
        upper_left_y: footprint.1,
        lower_right_x: footprint.2,
        lower_right_y: footprint.3,
    };
    let src = Path::new(&path);
    let dst = clip_to_footprint(src, &fp, &clipped_path(src)).map_err(to_py_err)?;
    Ok(dst.to_string_lossy().into_owned())
}

/// Clip every product under a stack directory; returns (clipped, failures)
#[pyfunction]
fn clip_stack(stack_dir: String) -> PyResult<(Vec<String>, Vec<(String, String)>)> {
    let (_, summary) = OverlapNormalizer::new(stack_dir).normalize().map_err(to_py_err)?;
    let clipped = summary
        .clipped
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let failures = summary
        .failures
        .into_iter()
        .map(|(p, reason)| (p.to_string_lossy().into_owned(), reason))
        .collect();
    Ok((clipped, failures))
}

/// Manifest rows as `(date1, date2, scene1, scene2)` with ISO dates
#[pyfunction]
fn load_manifest(path: String) -> PyResult<Vec<(String, String, String, String)>> {
    let pairs = read_manifest(Path::new(&path)).map_err(to_py_err)?;
    Ok(pairs
        .into_iter()
        .map(|p| (p.date1.to_string(), p.date2.to_string(), p.scene1, p.scene2))
        .collect())
}
