use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cli::ToolSettings;

const SCREENSHOT_PREFIX: &str = "screenshot_";

/// Where a job keeps its screenshots and writes its output file.
///
/// Both locations are fixed per process, so consecutive jobs share them.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub screenshot_dir: PathBuf,
    pub output_path: PathBuf,
}

impl RunContext {
    pub fn new(screenshot_dir: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            screenshot_dir: screenshot_dir.into(),
            output_path: output_path.into(),
        }
    }

    pub fn from_settings(settings: &ToolSettings) -> Self {
        Self::new(&settings.screenshot_dir, &settings.output_file)
    }

    /// Creates the screenshot directory if missing. Screenshots from earlier
    /// runs are left in place unless `clean` is set.
    pub fn prepare(&self, clean: bool) -> Result<()> {
        fs::create_dir_all(&self.screenshot_dir).with_context(|| {
            format!(
                "Failed to create screenshot directory {}",
                self.screenshot_dir.display()
            )
        })?;

        if clean {
            let stale = self.list_screenshots();
            for path in &stale {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            tracing::info!("Removed {} stale screenshots", stale.len());
        }

        Ok(())
    }

    pub fn screenshot_path(&self, index: usize) -> PathBuf {
        self.screenshot_dir
            .join(format!("{}{}.png", SCREENSHOT_PREFIX, index))
    }

    /// PNG files in the screenshot directory, ordered by capture index.
    /// Files that do not follow the capture naming sort last, by name.
    pub fn list_screenshots(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.screenshot_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|s| s.to_str())
                    .map(|s| s == "png")
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
            .collect();

        files.sort_by_key(|p| {
            let name = file_name(p);
            (capture_index(&name).unwrap_or(usize::MAX), name)
        });
        files
    }

    /// Truncates and rewrites the output file.
    pub fn write_output(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.output_path, contents)
            .with_context(|| format!("Failed to write {}", self.output_path.display()))
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn capture_index(name: &str) -> Option<usize> {
    name.strip_prefix(SCREENSHOT_PREFIX)?
        .strip_suffix(".png")?
        .parse()
        .ok()
}
