#![allow(dead_code)]

use gdal::raster::Buffer;
use gdal::DriverManager;
use sarstack::io::asf_search::{ArchiveSearch, SearchQuery, SearchResult};
use sarstack::io::hyp3::{BatchService, InsarJobRequest};
use sarstack::{JobFile, JobStatus, RemoteJob, StackError, StackResult};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zip::write::FileOptions;

/// Sentinel-1 SLC name acquired on `date` (YYYYMMDD)
pub fn scene_name(date: &str) -> String {
    format!("S1A_IW_SLC__1SDV_{}T152512_{}T152539_019969_022026_1A2B", date, date)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory archive returning a fixed scene list
pub struct FakeArchive {
    pub scenes: Vec<String>,
    pub queries: Mutex<Vec<SearchQuery>>,
    pub unavailable: bool,
}

impl FakeArchive {
    pub fn new(scenes: Vec<String>) -> Self {
        Self {
            scenes,
            queries: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    pub fn for_dates(dates: &[&str]) -> Self {
        Self::new(dates.iter().map(|d| scene_name(d)).collect())
    }
}

impl ArchiveSearch for FakeArchive {
    fn search(&self, query: &SearchQuery) -> StackResult<Vec<SearchResult>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.unavailable {
            return Err(StackError::Remote("archive search unavailable".to_string()));
        }
        Ok(self
            .scenes
            .iter()
            .map(|s| SearchResult {
                scene_name: s.clone(),
                start_time: None,
            })
            .collect())
    }
}

struct StoredJob {
    job: RemoteJob,
    final_status: JobStatus,
}

#[derive(Default)]
struct FakeState {
    jobs: Vec<StoredJob>,
    polls: usize,
    submissions: usize,
    downloads: Vec<String>,
}

type ProductBuilder = Box<dyn Fn(usize) -> Vec<(String, Vec<u8>)> + Send + Sync>;

/// In-memory batch service.
///
/// Jobs report RUNNING until `polls_until_done` listings have happened,
/// then their final status.
pub struct FakeBatch {
    state: Mutex<FakeState>,
    pub polls_until_done: usize,
    /// Reference scenes whose submission is rejected
    pub rejected: HashSet<String>,
    /// Reference scenes whose job ends FAILED
    pub remote_failures: HashSet<String>,
    /// Files placed in the product archive of the n-th job: (suffix, bytes)
    pub products: ProductBuilder,
}

impl FakeBatch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            polls_until_done: 0,
            rejected: HashSet::new(),
            remote_failures: HashSet::new(),
            products: Box::new(|_| vec![("_dem.tif".to_string(), b"not a raster".to_vec())]),
        }
    }

    fn store(&self, project_name: &str, reference: &str, secondary: &str) -> RemoteJob {
        let mut state = self.state.lock().unwrap();
        let index = state.jobs.len();
        let product = format!("S1AA_job{:03}", index);
        let job = RemoteJob {
            job_id: format!("job-{}", index),
            name: project_name.to_string(),
            status: JobStatus::Pending,
            granules: vec![reference.to_string(), secondary.to_string()],
            files: vec![JobFile {
                url: format!("https://fake.example/{}.zip", product),
                filename: format!("{}.zip", product),
                size: None,
            }],
        };
        let final_status = if self.remote_failures.contains(reference) {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        };
        state.jobs.push(StoredJob {
            job: job.clone(),
            final_status,
        });
        job
    }

    /// Register a job as if submitted by an earlier run
    pub fn preload(&self, project_name: &str, reference: &str, secondary: &str) -> RemoteJob {
        self.store(project_name, reference, secondary)
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().unwrap().downloads.clone()
    }

    pub fn job_count(&self, project_name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.job.name == project_name)
            .count()
    }
}

impl BatchService for FakeBatch {
    fn submit_insar_job(&self, request: &InsarJobRequest) -> StackResult<RemoteJob> {
        if self.rejected.contains(&request.reference) {
            return Err(StackError::Remote(format!("granule {} rejected", request.reference)));
        }
        let job = self.store(&request.project_name, &request.reference, &request.secondary);
        self.state.lock().unwrap().submissions += 1;
        Ok(job)
    }

    fn find_jobs(&self, project_name: &str) -> StackResult<Vec<RemoteJob>> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        let done = state.polls > self.polls_until_done;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.job.name == project_name)
            .map(|j| {
                let mut job = j.job.clone();
                job.status = if done { j.final_status } else { JobStatus::Running };
                job
            })
            .collect())
    }

    fn download(&self, job: &RemoteJob, dest_dir: &Path) -> StackResult<PathBuf> {
        if job.status != JobStatus::Succeeded {
            return Err(StackError::Remote(format!("job {} has no product", job.job_id)));
        }
        let file = job.result_file().ok_or_else(|| StackError::Remote("no file".to_string()))?;
        let index: usize = job.job_id.trim_start_matches("job-").parse().unwrap();
        let product = file.filename.trim_end_matches(".zip").to_string();

        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(&file.filename);
        write_zip(&path, &product, &(self.products)(index));
        self.state.lock().unwrap().downloads.push(job.job_id.clone());
        Ok(path)
    }
}

/// Zip `files` under `<product>/<product><suffix>`
pub fn write_zip(path: &Path, product: &str, files: &[(String, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (suffix, data) in files {
        writer
            .start_file(format!("{}/{}{}", product, product, suffix), FileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// Single-band float32 GeoTIFF filled with `value`
pub fn write_raster(path: &Path, gt: [f64; 6], width: usize, height: usize, value: f32) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)
        .unwrap();
    dataset.set_geo_transform(&gt).unwrap();
    let mut band = dataset.rasterband(1).unwrap();
    band.set_no_data_value(Some(0.0)).unwrap();
    let buffer = Buffer::new((width, height), vec![value; width * height]);
    band.write((0, 0), (width, height), &buffer).unwrap();
}

/// Single-band byte GeoTIFF with a row-dependent pattern
pub fn write_mask_raster(path: &Path, gt: [f64; 6], width: usize, height: usize) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<u8, _>(path, width as isize, height as isize, 1)
        .unwrap();
    dataset.set_geo_transform(&gt).unwrap();
    let data: Vec<u8> = (0..width * height).map(|i| ((i / width) % 2) as u8).collect();
    let mut band = dataset.rasterband(1).unwrap();
    band.write((0, 0), (width, height), &Buffer::new((width, height), data)).unwrap();
}

/// Bytes of a float32 GeoTIFF, for embedding in fake product archives
pub fn raster_bytes(gt: [f64; 6], width: usize, height: usize, value: f32) -> Vec<u8> {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("raster.tif");
    write_raster(&path, gt, width, height, value);
    std::fs::read(&path).unwrap()
}
