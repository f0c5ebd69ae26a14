use crate::config::{PipelineConfig, StackConfig};
use crate::core::manifest_builder::PairManifestBuilder;
use crate::core::orchestrator::{
    partition_by_pairs, CancellationToken, DownloadSummary, ExtractionSummary, JobOrchestrator, Project,
    ProjectStage, SubmissionSummary, WatchOptions,
};
use crate::core::overlap::{ClipSummary, OverlapNormalizer};
use crate::core::resolver::CatalogResolver;
use crate::io::asf_search::ArchiveSearch;
use crate::io::hyp3::{BatchService, JobOptions};
use crate::io::manifest::{manifest_file_name, read_manifest, write_manifest};
use crate::io::pair_list::{download_to_file, read_pair_tokens};
use crate::types::{OverlapFootprint, RemoteJob, StackError, StackResult};
use chrono::Utc;
use std::path::PathBuf;

fn submission_problems(summary: &SubmissionSummary, problems: &mut Vec<String>) {
    for (pair, reason) in &summary.failed {
        problems.push(format!("submit {} / {}: {}", pair.scene1, pair.scene2, reason));
    }
}

fn download_problems(summary: &DownloadSummary, problems: &mut Vec<String>) {
    for job in &summary.failed_jobs {
        problems.push(format!("job {} failed remotely ({})", job.job_id, job.granules.join(" / ")));
    }
    for (job, reason) in &summary.errors {
        problems.push(format!("download {}: {}", job.job_id, reason));
    }
}

fn extraction_problems(summary: &ExtractionSummary, problems: &mut Vec<String>) {
    for (path, reason) in &summary.failures {
        problems.push(format!("extract {}: {}", path.display(), reason));
    }
}

/// Everything the time-series tool needs from one stack, plus the
/// per-item outcome of each stage
#[derive(Debug, Clone)]
pub struct StackHandoff {
    pub stack_name: String,
    pub stack_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub project_name: String,
    pub footprint: OverlapFootprint,
    pub submission: SubmissionSummary,
    /// Jobs of the project whose pairs are not in the current manifest
    pub ignored_jobs: Vec<RemoteJob>,
    pub download: DownloadSummary,
    pub extraction: ExtractionSummary,
    pub clip: ClipSummary,
}

impl StackHandoff {
    pub fn clipped_files(&self) -> &[PathBuf] {
        &self.clip.clipped
    }

    /// One line per failed item across all stages
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        submission_problems(&self.submission, &mut problems);
        download_problems(&self.download, &mut problems);
        extraction_problems(&self.extraction, &mut problems);
        for (path, reason) in &self.clip.failures {
            problems.push(format!("clip {}: {}", path.display(), reason));
        }
        problems
    }
}

/// Stage results gathered while a stack runs; survives a later stage-fatal error
#[derive(Debug, Clone, Default)]
pub struct StackProgress {
    pub manifest_path: Option<PathBuf>,
    pub project_name: Option<String>,
    /// Last project stage reached
    pub stage: Option<ProjectStage>,
    pub submission: Option<SubmissionSummary>,
    pub ignored_jobs: Vec<RemoteJob>,
    pub download: Option<DownloadSummary>,
    pub extraction: Option<ExtractionSummary>,
}

impl StackProgress {
    /// One line per failed item of the stages that ran
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(summary) = &self.submission {
            submission_problems(summary, &mut problems);
        }
        if let Some(summary) = &self.download {
            download_problems(summary, &mut problems);
        }
        if let Some(summary) = &self.extraction {
            extraction_problems(summary, &mut problems);
        }
        problems
    }
}

/// Result of one stack run
#[derive(Debug)]
pub struct StackOutcome {
    pub stack_name: String,
    pub result: StackResult<StackHandoff>,
    pub progress: StackProgress,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<StackOutcome>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &StackHandoff> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &StackError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.stack_name.as_str(), e)))
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(handoff) => {
                    lines.push(format!(
                        "{}: {} clipped rasters in {}, manifest {}",
                        outcome.stack_name,
                        handoff.clip.clipped.len(),
                        handoff.stack_dir.display(),
                        handoff.manifest_path.display()
                    ));
                    if !handoff.ignored_jobs.is_empty() {
                        lines.push(format!(
                            "  {} project jobs ignored, pairs not in manifest",
                            handoff.ignored_jobs.len()
                        ));
                    }
                    for problem in handoff.problems() {
                        lines.push(format!("  {}", problem));
                    }
                }
                Err(e) => {
                    lines.push(format!("{}: FAILED: {}", outcome.stack_name, e));
                    if let (Some(project), Some(stage)) = (&outcome.progress.project_name, outcome.progress.stage) {
                        lines.push(format!("  project {} stopped at stage {}", project, stage));
                    }
                    for problem in outcome.progress.problems() {
                        lines.push(format!("  {}", problem));
                    }
                }
            }
        }
        lines
    }
}

/// Runs configured stacks end to end
pub struct PipelineDriver<'a> {
    config: &'a PipelineConfig,
    search: &'a dyn ArchiveSearch,
    batch: &'a dyn BatchService,
    watch: WatchOptions,
    cancel: CancellationToken,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(config: &'a PipelineConfig, search: &'a dyn ArchiveSearch, batch: &'a dyn BatchService) -> Self {
        Self {
            config,
            search,
            batch,
            watch: WatchOptions {
                interval: config.poll_interval(),
                timeout: config.watch_timeout(),
            },
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_watch_options(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    /// Resolve the stack's pairs and persist the filtered manifest
    pub fn prepare_manifest<S: AsRef<str>>(&self, stack: &StackConfig, tokens: &[S]) -> StackResult<PathBuf> {
        let builder = PairManifestBuilder::from_tokens(tokens)?;
        let dates = builder.distinct_dates();
        log::info!("Stack {}: {} pairs over {} dates", stack.name, builder.pairs().len(), dates.len());

        let scenes = CatalogResolver::new(self.search).resolve(stack, &dates)?;
        let pairs = builder.build_filtered(&scenes, &stack.date_window)?;

        let path = self
            .config
            .stack_dir(stack)
            .join(manifest_file_name(stack.direction, stack.relative_orbit));
        write_manifest(&path, &pairs)
    }

    /// Run every stage for one stack from its pair tokens
    pub fn process_stack<S: AsRef<str>>(&self, stack: &StackConfig, tokens: &[S]) -> StackResult<StackHandoff> {
        self.process_stack_tracked(stack, tokens, &mut StackProgress::default())
    }

    /// [`process_stack`](Self::process_stack), recording each finished stage in `progress`
    pub fn process_stack_tracked<S: AsRef<str>>(
        &self,
        stack: &StackConfig,
        tokens: &[S],
        progress: &mut StackProgress,
    ) -> StackResult<StackHandoff> {
        let stack_dir = self.config.stack_dir(stack);
        let manifest_path = self.prepare_manifest(stack, tokens)?;
        progress.manifest_path = Some(manifest_path.clone());

        let pairs = read_manifest(&manifest_path)?;
        if pairs.is_empty() {
            return Err(StackError::EmptyInput(format!(
                "no pairs of stack {} fall inside the date window",
                stack.name
            )));
        }

        let orchestrator = JobOrchestrator::new(self.batch);
        let mut project = Project::load_or_create(&stack_dir, &stack.name, Utc::now())?;
        progress.project_name = Some(project.name.clone());
        progress.stage = Some(project.stage());

        let submission = orchestrator.submit(&mut project, &pairs, JobOptions::for_stack(stack.mask_enabled))?;
        progress.submission = Some(submission.clone());
        progress.stage = Some(project.stage());

        let watched = orchestrator.watch(&mut project, &self.watch, &self.cancel);
        progress.stage = Some(project.stage());
        let (jobs, ignored_jobs) = partition_by_pairs(watched?, &pairs);
        if !ignored_jobs.is_empty() {
            log::warn!(
                "Project {}: ignoring {} jobs whose pairs are not in {}",
                project.name,
                ignored_jobs.len(),
                manifest_path.display()
            );
        }
        progress.ignored_jobs = ignored_jobs.clone();

        let download = orchestrator.download(&mut project, &jobs);
        progress.download = Some(download.clone());
        progress.stage = Some(project.stage());

        let extraction = orchestrator.extract(&mut project, &download.archives());
        progress.extraction = Some(extraction.clone());
        progress.stage = Some(project.stage());

        // Only this run's products; anything else in the stack directory is not in the manifest
        let (footprint, clip) = OverlapNormalizer::with_products(extraction.extracted.clone()).normalize()?;

        log::info!(
            "Stack {} ready for time-series inversion: {} ({} clipped rasters)",
            stack.name,
            stack_dir.display(),
            clip.clipped.len()
        );

        Ok(StackHandoff {
            stack_name: stack.name.clone(),
            stack_dir,
            manifest_path,
            project_name: project.name.clone(),
            footprint,
            submission,
            ignored_jobs,
            download,
            extraction,
            clip,
        })
    }

    /// Run one stack, reading its tokens from the pair list file
    pub fn run_stack(&self, stack: &StackConfig) -> StackResult<StackHandoff> {
        let tokens = read_pair_tokens(&self.config.pair_list_file(), &stack.pair_lines)?;
        self.process_stack(stack, &tokens)
    }

    /// Run the selected stacks (all when `only` is `None`); a failing stack
    /// never stops the others
    pub fn run(&self, only: Option<&str>) -> PipelineReport {
        let mut report = PipelineReport::default();
        let stacks: Vec<&StackConfig> = self
            .config
            .stacks
            .iter()
            .filter(|s| only.map_or(true, |name| s.name == name))
            .collect();

        if let Err(e) = download_to_file(&self.config.pair_list_url, &self.config.pair_list_file()) {
            log::error!("Pair list unavailable: {}", e);
            let reason = e.to_string();
            for stack in stacks {
                report.outcomes.push(StackOutcome {
                    stack_name: stack.name.clone(),
                    result: Err(StackError::Remote(format!("pair list unavailable: {}", reason))),
                    progress: StackProgress::default(),
                });
            }
            return report;
        }

        for stack in stacks {
            log::info!("=== Stack {} ===", stack.name);
            let mut progress = StackProgress::default();
            let result = read_pair_tokens(&self.config.pair_list_file(), &stack.pair_lines)
                .and_then(|tokens| self.process_stack_tracked(stack, &tokens, &mut progress));
            if let Err(e) = &result {
                log::error!("Stack {} failed: {}", stack.name, e);
            }
            report.outcomes.push(StackOutcome {
                stack_name: stack.name.clone(),
                result,
                progress,
            });
        }
        report
    }
}
