//! sarstack: Sentinel-1 InSAR stack preparation
//!
//! Resolves date pairs to Sentinel-1 scenes, runs the interferograms as HyP3
//! on-demand jobs, and clips the downloaded products to their common
//! footprint so a time-series tool can ingest them.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    DatePair, SceneMap, PairRecord, RemoteJob, JobStatus, JobFile,
    FlightDirection, RasterExtent, OverlapFootprint, StackError, StackResult,
};

pub use config::{PipelineConfig, StackConfig, DateWindow};
pub use io::{ArchiveSearch, AsfSearchClient, BatchService, Hyp3Client};
pub use crate::core::{
    CatalogResolver, PairManifestBuilder, JobOrchestrator, OverlapNormalizer, PipelineDriver,
};
