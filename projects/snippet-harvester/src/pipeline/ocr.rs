use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pipeline::types::ProcessingState;
use crate::run_context::file_name;

/// Extracts text from an image file. Lines are separated by newlines.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<String>;
}

/// Runs the tesseract command line tool once per image.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    pub cmd: PathBuf,
    pub lang: String,
}

impl TesseractCli {
    pub fn new(cmd: impl Into<PathBuf>, lang: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            lang: lang.into(),
        }
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &Path) -> Result<String> {
        let output = Command::new(&self.cmd)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.lang])
            .output()
            .with_context(|| format!("Failed to run {}", self.cmd.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "tesseract failed on {} ({}): {}",
                image.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Recognizes every image in order, one text block per image.
pub fn recognize_all<R: TextRecognizer + ?Sized>(
    recognizer: &R,
    images: &[PathBuf],
    state: &Arc<ProcessingState>,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    state.set_stage_total("ocr", images.len());

    let mut snippets = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let start_inst = Instant::now();
        let text = recognizer.recognize(image)?;
        tracing::info!("Done image: {}", file_name(image));
        snippets.push(text);

        let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;
        state.update_stage("ocr", i + 1, duration_ms);
    }

    Ok(snippets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::JobConfig;
    use std::collections::HashMap;

    struct MapRecognizer(HashMap<String, String>);

    impl TextRecognizer for MapRecognizer {
        fn recognize(&self, image: &Path) -> Result<String> {
            self.0
                .get(&file_name(image))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no text for {}", image.display()))
        }
    }

    fn state() -> Arc<ProcessingState> {
        Arc::new(ProcessingState::new("t".to_string(), JobConfig::new("u", 5)))
    }

    #[test]
    fn test_recognize_all_keeps_order() {
        let recognizer = MapRecognizer(HashMap::from([
            ("b.png".to_string(), "second".to_string()),
            ("a.png".to_string(), "first".to_string()),
        ]));
        let images = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];

        let state = state();
        let texts = recognize_all(&recognizer, &images, &state, &CancellationToken::new()).unwrap();

        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(state.stage("ocr").unwrap().current, 2);
    }

    #[test]
    fn test_recognizer_error_propagates() {
        let recognizer = MapRecognizer(HashMap::new());
        let result = recognize_all(
            &recognizer,
            &[PathBuf::from("missing.png")],
            &state(),
            &CancellationToken::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_tesseract_binary_is_an_error() {
        let cli = TesseractCli::new("/nonexistent/tesseract", "eng");
        assert!(cli.recognize(Path::new("x.png")).is_err());
    }
}
