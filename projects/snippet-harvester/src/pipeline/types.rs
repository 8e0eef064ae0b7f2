use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

pub const STAGES: [&str; 4] = ["capture", "dedup", "ocr", "report"];

/// What the user asked for: the page to open and how long the video runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub url: String,
    pub duration_secs: i64,
}

impl JobConfig {
    pub fn new(url: impl Into<String>, duration_secs: i64) -> Self {
        Self {
            url: url.into(),
            duration_secs,
        }
    }

    /// Number of screenshots taken. Any fractional remainder is dropped and
    /// non-positive durations capture nothing.
    pub fn capture_count(&self, seconds_per_capture: i64) -> usize {
        if seconds_per_capture <= 0 {
            return 0;
        }
        (self.duration_secs / seconds_per_capture).max(0) as usize
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct StageProgress {
    pub current: usize,
    pub total: usize,
    pub ms_per_item: f64,
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobSummary {
    pub captured: usize,
    pub duplicates_removed: usize,
    pub recognized: usize,
    pub lines_written: usize,
    pub output_path: PathBuf,
}

/// Job state shared between the pipeline task and the UI
#[derive(Debug)]
pub struct ProcessingState {
    pub job_id: String,
    pub job: JobConfig,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_active: AtomicBool,
    pub is_complete: AtomicBool,
    pub was_cancelled: AtomicBool,
    pub error: RwLock<Option<String>>,
    pub summary: RwLock<Option<JobSummary>>,
    /// Progress per stage ("capture", "dedup", "ocr", "report")
    pub stages: RwLock<BTreeMap<String, StageProgress>>,
    pub start_time: std::time::Instant,
}

impl ProcessingState {
    pub fn new(job_id: String, job: JobConfig) -> Self {
        let stages = STAGES
            .iter()
            .map(|stage| {
                (
                    stage.to_string(),
                    StageProgress {
                        current: 0,
                        total: 0,
                        ms_per_item: 0.0,
                    },
                )
            })
            .collect();

        Self {
            job_id,
            job,
            created_at: chrono::Utc::now(),
            is_active: AtomicBool::new(true),
            is_complete: AtomicBool::new(false),
            was_cancelled: AtomicBool::new(false),
            error: RwLock::new(None),
            summary: RwLock::new(None),
            stages: RwLock::new(stages),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn set_stage_total(&self, stage: &str, total: usize) {
        if let Ok(mut stages) = self.stages.write() {
            if let Some(progress) = stages.get_mut(stage) {
                progress.total = total;
            }
        }
    }

    pub fn update_stage(&self, stage: &str, current: usize, ms_per_item: f64) {
        if let Ok(mut stages) = self.stages.write() {
            if let Some(progress) = stages.get_mut(stage) {
                progress.current = current;
                // Simple exponential moving average for smoothing durations
                if progress.ms_per_item == 0.0 {
                    progress.ms_per_item = ms_per_item;
                } else {
                    progress.ms_per_item = progress.ms_per_item * 0.9 + ms_per_item * 0.1;
                }
            }
        }
    }

    pub fn stage(&self, stage: &str) -> Option<StageProgress> {
        self.stages.read().ok()?.get(stage).cloned()
    }

    pub fn finish(&self, summary: JobSummary) {
        if let Ok(mut guard) = self.summary.write() {
            *guard = Some(summary);
        }
        self.is_complete.store(true, Ordering::Relaxed);
        self.is_active.store(false, Ordering::Relaxed);
    }

    pub fn fail(&self, message: String) {
        if let Ok(mut guard) = self.error.write() {
            *guard = Some(message);
        }
        self.is_active.store(false, Ordering::Relaxed);
    }

    pub fn mark_cancelled(&self) {
        self.was_cancelled.store(true, Ordering::Relaxed);
        self.is_active.store(false, Ordering::Relaxed);
    }

    pub fn status(&self) -> &'static str {
        if self.is_active.load(Ordering::Relaxed) {
            "running"
        } else if self.is_complete.load(Ordering::Relaxed) {
            "complete"
        } else if self.was_cancelled.load(Ordering::Relaxed) {
            "cancelled"
        } else {
            "failed"
        }
    }

    pub fn to_progress_json(&self) -> serde_json::Value {
        let stages = self
            .stages
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        let error = self.error.read().ok().and_then(|e| e.clone());
        let summary = self.summary.read().ok().and_then(|s| s.clone());

        serde_json::json!({
            "job_id": self.job_id,
            "url": self.job.url,
            "duration_secs": self.job.duration_secs,
            "created_at": self.created_at,
            "status": self.status(),
            "is_active": self.is_active.load(Ordering::Relaxed),
            "is_complete": self.is_complete.load(Ordering::Relaxed),
            "was_cancelled": self.was_cancelled.load(Ordering::Relaxed),
            "error": error,
            "stages": stages,
            "summary": summary,
            "elapsed_secs": self.start_time.elapsed().as_secs_f64(),
        })
    }
}
