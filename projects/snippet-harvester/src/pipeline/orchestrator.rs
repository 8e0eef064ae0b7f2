// Pipeline orchestrator: manages the job lifecycle
//
// Runs the stages of one job in order on a background task, tracks its
// processing state and lets the UI cancel it.

pub use crate::pipeline::types::ProcessingState;
use crate::cli::ToolSettings;
use crate::pipeline::browser::{VideoBrowser, WebDriverBrowser};
use crate::pipeline::capture::{capture_screenshots, CaptureConfig};
use crate::pipeline::dedup::dedup_screenshots;
use crate::pipeline::ocr::{recognize_all, TesseractCli, TextRecognizer};
use crate::pipeline::ocr_check::ensure_ocr_engine;
use crate::pipeline::report::SnippetReport;
use crate::pipeline::types::{JobConfig, JobSummary};
use crate::run_context::RunContext;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Finished jobs kept around for the UI to look at
const MAX_FINISHED_JOBS: usize = 16;

static JOB_SEQ: AtomicU64 = AtomicU64::new(0);

// Global registry of jobs started by this process
lazy_static::lazy_static! {
    static ref PROCESSING_REGISTRY: JobRegistry = JobRegistry::default();
}

/// Manager that holds state and control handles for a job
pub struct JobManager {
    pub state: Arc<ProcessingState>,
    pub cancel: CancellationToken,
}

/// Jobs known to this process, keyed by job id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobManager>>>,
}

impl JobRegistry {
    pub fn get(&self, job_id: &str) -> Option<Arc<JobManager>> {
        self.jobs.read().ok()?.get(job_id).cloned()
    }

    /// All known jobs, newest first
    pub fn list(&self) -> Vec<Arc<ProcessingState>> {
        let mut jobs: Vec<Arc<ProcessingState>> = self
            .jobs
            .read()
            .map(|r| r.values().map(|jm| jm.state.clone()).collect())
            .unwrap_or_default();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Registers a new active job unless one is already running.
    ///
    /// The active check, pruning of old finished jobs and the insert all
    /// happen under one write guard.
    pub fn reserve(&self, job: &JobConfig) -> Result<(Arc<ProcessingState>, CancellationToken)> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| anyhow::anyhow!("Job registry poisoned"))?;

        if let Some(active) = jobs
            .values()
            .find(|jm| jm.state.is_active.load(Ordering::Relaxed))
        {
            anyhow::bail!("Job {} is already being processed", active.state.job_id);
        }

        // Everything left is finished; keep the newest and make room for one more
        let mut finished: Vec<(String, chrono::DateTime<chrono::Utc>)> = jobs
            .iter()
            .map(|(id, jm)| (id.clone(), jm.state.created_at))
            .collect();
        finished.sort_by(|a, b| b.1.cmp(&a.1));
        for (id, _) in finished.into_iter().skip(MAX_FINISHED_JOBS - 1) {
            jobs.remove(&id);
        }

        let job_id = new_job_id();
        let state = Arc::new(ProcessingState::new(job_id.clone(), job.clone()));
        let cancel = CancellationToken::new();
        tracing::info!("Registering job manager for job_id: {}", job_id);
        jobs.insert(
            job_id,
            Arc::new(JobManager {
                state: state.clone(),
                cancel: cancel.clone(),
            }),
        );

        Ok((state, cancel))
    }

    /// Start a job in the background.
    ///
    /// Jobs share the screenshot directory and output file, so only one may run
    /// at a time.
    pub fn start(
        &self,
        job: JobConfig,
        settings: ToolSettings,
    ) -> Result<(Arc<ProcessingState>, JoinHandle<()>)> {
        let (state, cancel) = self.reserve(&job)?;

        let state_task = state.clone();
        let handle = tokio::spawn(async move {
            tracing::info!("Starting job {} for {}", state_task.job_id, job.url);
            check_ocr_engine(&settings).await;

            let ctx = RunContext::from_settings(&settings);
            let result =
                match WebDriverBrowser::connect(&settings.webdriver_url, settings.headless).await {
                    Ok(mut browser) => {
                        let recognizer =
                            TesseractCli::new(&settings.tesseract_cmd, &settings.ocr_lang);
                        run_pipeline(
                            &job,
                            &settings,
                            &ctx,
                            &mut browser,
                            Arc::new(recognizer),
                            state_task.clone(),
                            cancel,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
            record_outcome(&state_task, result);
        });

        Ok((state, handle))
    }

    /// Stop a job. The capture loop and per-image stages notice between items.
    pub fn stop(&self, job_id: &str) -> bool {
        if let Some(manager) = self.get(job_id) {
            manager.cancel.cancel();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, job_id: &str, manager: Arc<JobManager>) {
        self.jobs
            .write()
            .unwrap()
            .insert(job_id.to_string(), manager);
    }

    #[cfg(test)]
    pub(crate) fn remove(&self, job_id: &str) {
        self.jobs.write().unwrap().remove(job_id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }
}

pub fn registry() -> &'static JobRegistry {
    &PROCESSING_REGISTRY
}

pub fn get_processing_state(job_id: &str) -> Option<Arc<ProcessingState>> {
    registry().get(job_id).map(|jm| jm.state.clone())
}

pub fn list_jobs() -> Vec<Arc<ProcessingState>> {
    registry().list()
}

pub fn start_processing(
    job: JobConfig,
    settings: ToolSettings,
) -> Result<(Arc<ProcessingState>, JoinHandle<()>)> {
    registry().start(job, settings)
}

pub fn stop_processing(job_id: &str) -> bool {
    registry().stop(job_id)
}

// Timestamp for readability, sequence number for uniqueness
fn new_job_id() -> String {
    format!(
        "job-{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S%3f"),
        JOB_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Runs before the browser is started, so the installer still gets its
/// chance when WebDriver is unreachable.
async fn check_ocr_engine(settings: &ToolSettings) {
    let tesseract_cmd = settings.tesseract_cmd.clone();
    let installer = settings.tesseract_installer.clone();
    match tokio::task::spawn_blocking(move || ensure_ocr_engine(&tesseract_cmd, &installer)).await
    {
        Ok(availability) => tracing::debug!("OCR engine check: {:?}", availability),
        Err(e) => tracing::warn!("OCR check worker join failed: {}", e),
    }
}

fn record_outcome(state: &ProcessingState, result: Result<Option<JobSummary>>) {
    match result {
        Ok(Some(summary)) => {
            tracing::info!(
                "Filtered code snippets saved to {}",
                summary.output_path.display()
            );
            state.finish(summary);
        }
        Ok(None) => {
            tracing::info!("Job {} cancelled", state.job_id);
            state.mark_cancelled();
        }
        Err(e) => {
            tracing::error!("Job {} failed: {:#}", state.job_id, e);
            state.fail(format!("{:#}", e));
        }
    }
}

/// Runs every stage after the OCR engine check. Returns `None` if the job
/// was cancelled.
///
/// The browser is closed before this returns, whatever the outcome.
pub async fn run_pipeline<B: VideoBrowser>(
    job: &JobConfig,
    settings: &ToolSettings,
    ctx: &RunContext,
    browser: &mut B,
    recognizer: Arc<dyn TextRecognizer>,
    state: Arc<ProcessingState>,
    cancel: CancellationToken,
) -> Result<Option<JobSummary>> {
    let capture_config = CaptureConfig {
        captures: job.capture_count(settings.seconds_per_capture),
        ready_timeout: settings.ready_timeout(),
        settle_timeout: settings.settle_timeout(),
    };
    let captured = async {
        ctx.prepare(settings.clean_screenshots)?;
        capture_screenshots(&mut *browser, &job.url, &capture_config, ctx, &state, &cancel).await
    }
    .await;
    if let Err(e) = browser.close().await {
        tracing::warn!("{:#}", e);
    }
    let captured = captured?;
    if cancel.is_cancelled() {
        return Ok(None);
    }

    // Stale screenshots from earlier runs take part in dedup and OCR
    let screenshots = ctx.list_screenshots();
    let outcome = {
        let state = state.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || dedup_screenshots(&screenshots, &state, &cancel))
            .await
            .context("dedup worker join failed")??
    };
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let snippets = {
        let state = state.clone();
        let cancel = cancel.clone();
        let kept = outcome.kept.clone();
        tokio::task::spawn_blocking(move || {
            recognize_all(recognizer.as_ref(), &kept, &state, &cancel)
        })
        .await
        .context("ocr worker join failed")??
    };
    if cancel.is_cancelled() {
        return Ok(None);
    }

    state.set_stage_total("report", 1);
    let report = SnippetReport::from_snippets(&snippets);
    ctx.write_output(&report.render())?;
    state.update_stage("report", 1, 0.0);

    Ok(Some(JobSummary {
        captured: captured.len(),
        duplicates_removed: outcome.removed.len(),
        recognized: snippets.len(),
        lines_written: report.line_count(),
        output_path: ctx.output_path.clone(),
    }))
}
