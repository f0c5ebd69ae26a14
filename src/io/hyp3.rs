use crate::types::{JobFile, JobStatus, RemoteJob, StackError, StackResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HyP3 API endpoint
pub const HYP3_API_URL: &str = "https://hyp3-api.asf.alaska.edu";

/// Processing options attached to every InSAR job of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub include_dem: bool,
    pub include_look_vectors: bool,
    pub apply_water_mask: bool,
}

impl JobOptions {
    pub fn for_stack(mask_enabled: bool) -> Self {
        Self {
            include_dem: true,
            include_look_vectors: true,
            apply_water_mask: mask_enabled,
        }
    }
}

/// One reference/secondary submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsarJobRequest {
    pub reference: String,
    pub secondary: String,
    pub project_name: String,
    pub options: JobOptions,
}

/// Remote batch processing service
pub trait BatchService: Send + Sync {
    /// Create one InSAR job
    fn submit_insar_job(&self, request: &InsarJobRequest) -> StackResult<RemoteJob>;

    /// All jobs tagged with a project name
    fn find_jobs(&self, project_name: &str) -> StackResult<Vec<RemoteJob>>;

    /// Fetch the result archive of a succeeded job into `dest_dir`
    fn download(&self, job: &RemoteJob, dest_dir: &Path) -> StackResult<PathBuf>;
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    jobs: Vec<JobSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct JobSpec<'a> {
    job_type: &'static str,
    name: &'a str,
    job_parameters: JobParameters<'a>,
}

#[derive(Debug, Serialize)]
struct JobParameters<'a> {
    granules: [&'a str; 2],
    include_dem: bool,
    include_look_vectors: bool,
    apply_water_mask: bool,
}

#[derive(Debug, Deserialize)]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<Hyp3Job>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hyp3Job {
    job_id: String,
    #[serde(default)]
    name: Option<String>,
    status_code: JobStatus,
    #[serde(default)]
    job_parameters: Option<Hyp3JobParameters>,
    #[serde(default)]
    files: Vec<JobFile>,
}

#[derive(Debug, Deserialize)]
struct Hyp3JobParameters {
    #[serde(default)]
    granules: Vec<String>,
}

impl From<Hyp3Job> for RemoteJob {
    fn from(job: Hyp3Job) -> Self {
        RemoteJob {
            job_id: job.job_id,
            name: job.name.unwrap_or_default(),
            status: job.status_code,
            granules: job.job_parameters.map(|p| p.granules).unwrap_or_default(),
            files: job.files,
        }
    }
}

fn submit_body(request: &InsarJobRequest) -> SubmitBody<'_> {
    SubmitBody {
        jobs: vec![JobSpec {
            job_type: "INSAR_GAMMA",
            name: &request.project_name,
            job_parameters: JobParameters {
                granules: [request.reference.as_str(), request.secondary.as_str()],
                include_dem: request.options.include_dem,
                include_look_vectors: request.options.include_look_vectors,
                apply_water_mask: request.options.apply_water_mask,
            },
        }],
    }
}

fn parse_jobs_page(body: &str) -> StackResult<(Vec<RemoteJob>, Option<String>)> {
    let page: JobsPage = serde_json::from_str(body)?;
    Ok((page.jobs.into_iter().map(RemoteJob::from).collect(), page.next))
}

/// HTTP client for the HyP3 on-demand processing API
pub struct Hyp3Client {
    client: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
}

impl Hyp3Client {
    pub fn new(base_url: &str, token: Option<String>) -> StackResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .user_agent(concat!("sarstack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StackError::Remote(format!("Failed to create HTTP client: {}", e)))?;

        if token.is_none() {
            log::warn!("No Earthdata token configured, HyP3 requests will be unauthenticated");
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorized(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn read_body(response: reqwest::blocking::Response, action: &str) -> StackResult<String> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(StackError::Remote(format!("{} failed ({}): {}", action, status, body)));
        }
        Ok(body)
    }
}

impl BatchService for Hyp3Client {
    fn submit_insar_job(&self, request: &InsarJobRequest) -> StackResult<RemoteJob> {
        let url = format!("{}/jobs", self.base_url);
        log::debug!("Submitting {} / {} to {}", request.reference, request.secondary, request.project_name);

        let response = self.authorized(self.client.post(&url).json(&submit_body(request))).send()?;
        let body = Self::read_body(response, "Job submission")?;
        let (mut jobs, _) = parse_jobs_page(&body)?;

        if jobs.len() != 1 {
            return Err(StackError::Remote(format!(
                "Expected 1 job in submission response, got {}",
                jobs.len()
            )));
        }
        Ok(jobs.remove(0))
    }

    fn find_jobs(&self, project_name: &str) -> StackResult<Vec<RemoteJob>> {
        let mut jobs = Vec::new();
        let first_url = format!("{}/jobs", self.base_url);

        let response = self
            .authorized(self.client.get(&first_url).query(&[("name", project_name)]))
            .send()?;
        let body = Self::read_body(response, "Job listing")?;
        let (page, mut next) = parse_jobs_page(&body)?;
        jobs.extend(page);

        while let Some(url) = next.take() {
            log::debug!("Following job listing page: {}", url);
            let response = self.authorized(self.client.get(&url)).send()?;
            let body = Self::read_body(response, "Job listing")?;
            let (page, following) = parse_jobs_page(&body)?;
            jobs.extend(page);
            next = following;
        }

        log::debug!("Found {} jobs for project {}", jobs.len(), project_name);
        Ok(jobs)
    }

    fn download(&self, job: &RemoteJob, dest_dir: &Path) -> StackResult<PathBuf> {
        let file = job.result_file().ok_or_else(|| {
            StackError::Remote(format!("Job {} has no product file", job.job_id))
        })?;

        fs::create_dir_all(dest_dir)?;
        let output_path = dest_dir.join(&file.filename);
        if output_path.exists() {
            log::info!("Product already downloaded: {}", output_path.display());
            return Ok(output_path);
        }

        log::info!("Downloading {} to {}", file.url, output_path.display());
        let mut response = self.client.get(&file.url).send()?;
        if !response.status().is_success() {
            return Err(StackError::Remote(format!(
                "Download of {} failed with status: {}",
                file.filename,
                response.status()
            )));
        }

        // Partial downloads never carry the final name
        let partial_path = output_path.with_extension("part");
        let mut out = fs::File::create(&partial_path)?;
        let bytes = std::io::copy(&mut response, &mut out)?;
        drop(out);
        fs::rename(&partial_path, &output_path)?;

        log::debug!("Downloaded {} bytes", bytes);
        Ok(output_path)
    }
}
