//! I/O modules for the archive search, the batch service, pair lists, manifests and product archives

pub mod asf_search;
pub mod hyp3;
pub mod pair_list;
pub mod manifest;
pub mod archive;

pub use asf_search::{ArchiveSearch, AsfSearchClient, SearchQuery, SearchResult};
pub use hyp3::{BatchService, Hyp3Client, InsarJobRequest, JobOptions};
pub use manifest::{read_manifest, write_manifest};
pub use archive::extract_zipped_product;
