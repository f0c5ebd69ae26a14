//! Batch job lifecycle over a named project.
//!
//! A project moves through submit → poll → download → extract. Every remote
//! lookup is keyed by the project name, so a restarted process resumes by
//! re-querying the same name.

use crate::io::archive::extract_zipped_product;
use crate::io::hyp3::{BatchService, InsarJobRequest, JobOptions};
use crate::types::{JobStatus, PairRecord, RemoteJob, StackError, StackResult};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Suffix format appended to the project base name
pub const PROJECT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H:%M";

/// Local file remembering the remote project of a stack directory
pub const PROJECT_RECORD_FILE: &str = "project.json";

/// Lifecycle stage of a project as seen by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStage {
    Unsubmitted,
    Submitted,
    Polling,
    Downloaded,
    Extracted,
}

impl std::fmt::Display for ProjectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStage::Unsubmitted => write!(f, "unsubmitted"),
            ProjectStage::Submitted => write!(f, "submitted"),
            ProjectStage::Polling => write!(f, "polling"),
            ProjectStage::Downloaded => write!(f, "downloaded"),
            ProjectStage::Extracted => write!(f, "extracted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProjectRecord {
    name: String,
    created_at: DateTime<Utc>,
}

/// A named group of remote jobs plus its download directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub download_dir: PathBuf,
    stage: ProjectStage,
}

impl Project {
    /// New project named `<base>_<YYYYmmddTHH:MM>`
    pub fn new(base_name: &str, submitted_at: DateTime<Utc>, download_dir: PathBuf) -> Self {
        Self {
            name: format!("{}_{}", base_name, submitted_at.format(PROJECT_TIMESTAMP_FORMAT)),
            download_dir,
            stage: ProjectStage::Unsubmitted,
        }
    }

    /// Attach to an already named remote project
    pub fn resume(name: &str, download_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            download_dir,
            stage: ProjectStage::Unsubmitted,
        }
    }

    /// Reuse the project recorded in `stack_dir`, or start and record a new one
    pub fn load_or_create(stack_dir: &Path, base_name: &str, now: DateTime<Utc>) -> StackResult<Self> {
        let record_path = stack_dir.join(PROJECT_RECORD_FILE);
        if record_path.exists() {
            let record: ProjectRecord = serde_json::from_str(&fs::read_to_string(&record_path)?)?;
            log::info!("Resuming project {} (created {})", record.name, record.created_at);
            return Ok(Self::resume(&record.name, stack_dir.to_path_buf()));
        }

        let project = Self::new(base_name, now, stack_dir.to_path_buf());
        fs::create_dir_all(stack_dir)?;
        let record = ProjectRecord {
            name: project.name.clone(),
            created_at: now,
        };
        fs::write(&record_path, serde_json::to_string_pretty(&record)?)?;
        log::info!("Created project {}", project.name);
        Ok(project)
    }

    pub fn stage(&self) -> ProjectStage {
        self.stage
    }
}

/// Cooperative cancellation for the polling wait
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep up to `timeout`; returns `true` if cancelled before or during the wait
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// Re-poll interval and optional overall limit for [`JobOrchestrator::watch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: None,
        }
    }
}

/// Outcome of submitting a manifest to a project
#[derive(Debug, Clone, Default)]
pub struct SubmissionSummary {
    pub submitted: Vec<(PairRecord, RemoteJob)>,
    /// Pairs that already had a job under the project name
    pub already_submitted: Vec<PairRecord>,
    pub failed: Vec<(PairRecord, String)>,
}

impl SubmissionSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of fetching the artifacts of a terminal project
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub downloaded: Vec<(RemoteJob, PathBuf)>,
    /// Jobs that ended FAILED and have no artifact
    pub failed_jobs: Vec<RemoteJob>,
    pub errors: Vec<(RemoteJob, String)>,
}

impl DownloadSummary {
    pub fn archives(&self) -> Vec<PathBuf> {
        self.downloaded.iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_jobs.is_empty() && self.errors.is_empty()
    }
}

/// Outcome of unpacking downloaded archives
#[derive(Debug, Clone, Default)]
pub struct ExtractionSummary {
    pub extracted: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Split `jobs` into those whose granules belong to a manifest pair and the rest
pub fn partition_by_pairs(jobs: Vec<RemoteJob>, pairs: &[PairRecord]) -> (Vec<RemoteJob>, Vec<RemoteJob>) {
    let wanted: HashSet<(&str, &str)> = pairs.iter().map(|p| p.granules()).collect();
    jobs.into_iter().partition(|job| {
        job.granules.len() == 2 && wanted.contains(&(job.granules[0].as_str(), job.granules[1].as_str()))
    })
}

/// Drives one project through its lifecycle against a batch service
pub struct JobOrchestrator<'a> {
    service: &'a dyn BatchService,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(service: &'a dyn BatchService) -> Self {
        Self { service }
    }

    /// Submit one job per pair not yet present under the project name.
    ///
    /// Submissions are independent; a rejected pair is reported in the
    /// summary and does not affect the others. Failing to list the existing
    /// jobs aborts the whole submission, since de-duplication is impossible.
    pub fn submit(
        &self,
        project: &mut Project,
        pairs: &[PairRecord],
        options: JobOptions,
    ) -> StackResult<SubmissionSummary> {
        let existing = self.service.find_jobs(&project.name)?;
        let mut summary = SubmissionSummary::default();

        let mut seen: HashSet<(&str, &str)> = existing
            .iter()
            .filter(|job| job.granules.len() == 2)
            .map(|job| (job.granules[0].as_str(), job.granules[1].as_str()))
            .collect();

        let mut pending = Vec::new();
        for pair in pairs {
            if seen.insert(pair.granules()) {
                pending.push(pair);
            } else {
                log::debug!("Skipping already submitted pair {} / {}", pair.scene1, pair.scene2);
                summary.already_submitted.push(pair.clone());
            }
        }

        log::info!(
            "Project {}: submitting {} jobs ({} already present)",
            project.name,
            pending.len(),
            summary.already_submitted.len()
        );

        let results: Vec<(PairRecord, Result<RemoteJob, String>)> = pending
            .par_iter()
            .map(|pair| {
                let request = InsarJobRequest {
                    reference: pair.scene1.clone(),
                    secondary: pair.scene2.clone(),
                    project_name: project.name.clone(),
                    options,
                };
                let result = self.service.submit_insar_job(&request).map_err(|e| e.to_string());
                ((*pair).clone(), result)
            })
            .collect();

        for (pair, result) in results {
            match result {
                Ok(job) => summary.submitted.push((pair, job)),
                Err(reason) => {
                    log::warn!("Submission failed for {} / {}: {}", pair.scene1, pair.scene2, reason);
                    summary.failed.push((pair, reason));
                }
            }
        }

        project.stage = ProjectStage::Submitted;
        Ok(summary)
    }

    /// Block until every job of the project is terminal.
    ///
    /// Re-polls at `options.interval`. Cancellation or the optional timeout
    /// abort the wait without touching remote state; the project can be
    /// watched again later under the same name.
    pub fn watch(
        &self,
        project: &mut Project,
        options: &WatchOptions,
        cancel: &CancellationToken,
    ) -> StackResult<Vec<RemoteJob>> {
        project.stage = ProjectStage::Polling;
        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(StackError::Cancelled(project.name.clone()));
            }

            let jobs = self.service.find_jobs(&project.name)?;
            let pending = jobs.iter().filter(|j| !j.is_terminal()).count();

            if pending == 0 {
                if jobs.is_empty() {
                    log::warn!("Project {} has no jobs", project.name);
                }
                log::info!("Project {}: all {} jobs terminal", project.name, jobs.len());
                return Ok(jobs);
            }

            log::info!(
                "Project {}: {} of {} jobs still running, polling again in {:?}",
                project.name,
                pending,
                jobs.len(),
                options.interval
            );

            let mut wait = options.interval;
            if let Some(timeout) = options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(StackError::Timeout {
                        project: project.name.clone(),
                        seconds: timeout.as_secs(),
                    });
                }
                wait = wait.min(timeout - elapsed);
            }

            if cancel.wait_timeout(wait) {
                log::warn!("Watch of project {} cancelled", project.name);
                return Err(StackError::Cancelled(project.name.clone()));
            }
        }
    }

    /// Fetch the artifact of every succeeded job; failed jobs are reported
    pub fn download(&self, project: &mut Project, jobs: &[RemoteJob]) -> DownloadSummary {
        let mut summary = DownloadSummary::default();

        for job in jobs {
            match job.status {
                JobStatus::Succeeded => match self.service.download(job, &project.download_dir) {
                    Ok(path) => summary.downloaded.push((job.clone(), path)),
                    Err(e) => {
                        log::warn!("Download of job {} failed: {}", job.job_id, e);
                        summary.errors.push((job.clone(), e.to_string()));
                    }
                },
                JobStatus::Failed => {
                    log::warn!("Job {} ({}) failed remotely, no artifact", job.job_id, job.granules.join(" / "));
                    summary.failed_jobs.push(job.clone());
                }
                status => {
                    summary
                        .errors
                        .push((job.clone(), format!("job is not terminal ({})", status)));
                }
            }
        }

        log::info!(
            "Project {}: {} downloaded, {} failed remotely, {} download errors",
            project.name,
            summary.downloaded.len(),
            summary.failed_jobs.len(),
            summary.errors.len()
        );
        project.stage = ProjectStage::Downloaded;
        summary
    }

    /// Unpack every archive in place; failures are reported per archive
    pub fn extract(&self, project: &mut Project, archives: &[PathBuf]) -> ExtractionSummary {
        let mut summary = ExtractionSummary::default();

        for archive in archives {
            match extract_zipped_product(archive) {
                Ok(dir) => summary.extracted.push(dir),
                Err(e) => {
                    log::warn!("Extraction of {} failed: {}", archive.display(), e);
                    summary.failures.push((archive.clone(), e.to_string()));
                }
            }
        }

        project.stage = ProjectStage::Extracted;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_project_name_is_timestamp_qualified() {
        let at = Utc.with_ymd_and_hms(2023, 3, 14, 9, 5, 0).unwrap();
        let project = Project::new("ascending_79", at, PathBuf::from("ascending_79"));
        assert_eq!(project.name, "ascending_79_20230314T09:05");
        assert_eq!(project.stage(), ProjectStage::Unsubmitted);
    }

    #[test]
    fn test_project_record_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let stack_dir = temp_dir.path().join("descending_174");

        let first_time = Utc.with_ymd_and_hms(2023, 3, 14, 9, 5, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2023, 3, 15, 12, 0, 0).unwrap();

        let created = Project::load_or_create(&stack_dir, "descending_174", first_time).unwrap();
        let resumed = Project::load_or_create(&stack_dir, "descending_174", later).unwrap();
        assert_eq!(created.name, resumed.name);
        assert_eq!(resumed.name, "descending_174_20230314T09:05");
    }

    #[test]
    fn test_partition_by_pairs() {
        use chrono::NaiveDate;

        let day = |d: u32| NaiveDate::from_ymd_opt(2018, 1, d).unwrap();
        let pairs = vec![PairRecord {
            date1: day(1),
            date2: day(13),
            scene1: "REF".to_string(),
            scene2: "SEC".to_string(),
        }];
        let job = |id: &str, granules: [&str; 2]| RemoteJob {
            job_id: id.to_string(),
            name: "stack_20230314T09:05".to_string(),
            status: JobStatus::Succeeded,
            granules: granules.iter().map(|g| g.to_string()).collect(),
            files: Vec::new(),
        };

        let jobs = vec![job("a", ["REF", "SEC"]), job("b", ["OLD", "SEC"]), job("c", ["SEC", "REF"])];
        let (wanted, stale) = partition_by_pairs(jobs, &pairs);
        assert_eq!(wanted.len(), 1);
        assert_eq!(wanted[0].job_id, "a");
        assert_eq!(stale.len(), 2);
    }

    #[test]
    fn test_cancellation_interrupts_wait() {
        let token = CancellationToken::new();
        let remote = token.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(30));
        handle.join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_wait_without_cancel_times_out() {
        let token = CancellationToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
    }
}
