//! Core stack preparation stages

pub mod resolver;
pub mod manifest_builder;
pub mod orchestrator;
pub mod overlap;
pub mod pipeline;

// Re-export main types
pub use resolver::{CatalogResolver, scene_date};
pub use manifest_builder::{PairManifestBuilder, filter_window, sort_by_date1};
pub use orchestrator::{
    JobOrchestrator, Project, ProjectStage, partition_by_pairs, CancellationToken, WatchOptions,
    SubmissionSummary, DownloadSummary, ExtractionSummary,
};
pub use overlap::{OverlapNormalizer, ClipSummary, PixelWindow, WindowFit, clip_to_footprint, common_footprint, clipped_path};
pub use pipeline::{PipelineDriver, PipelineReport, StackHandoff, StackOutcome, StackProgress};
