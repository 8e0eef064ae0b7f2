// OCR engine version check and silent install fallback

use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrAvailability {
    /// Engine answered the version check; carries the first line of its version output
    Available(String),
    /// Engine was missing and the installer was run. Not checked again.
    InstallAttempted,
    /// Engine missing and no installer could be run
    Unavailable,
}

/// Checks the OCR engine and, if it cannot be run, tries the installer once.
///
/// Never fails: installer problems are logged and the job continues, so a
/// missing engine surfaces later as an OCR stage error.
pub fn ensure_ocr_engine(tesseract_cmd: &Path, installer: &Path) -> OcrAvailability {
    match query_version(tesseract_cmd) {
        Ok(version) => {
            info!("OCR engine found: {}", version);
            return OcrAvailability::Available(version);
        }
        Err(e) => warn!("OCR engine not found ({}). Installing tesseract...", e),
    }

    if !installer.exists() {
        warn!("Installer {} not found, skipping install", installer.display());
        return OcrAvailability::Unavailable;
    }

    match Command::new(installer).arg("/SILENT").status() {
        Ok(status) if status.success() => info!("Tesseract installation completed"),
        Ok(status) => warn!("Installer exited with {}", status),
        Err(e) => {
            warn!("Failed to execute installer {}: {}", installer.display(), e);
            return OcrAvailability::Unavailable;
        }
    }

    if let Err(e) = fs::remove_file(installer) {
        warn!("Failed to remove installer {}: {}", installer.display(), e);
    }

    OcrAvailability::InstallAttempted
}

fn query_version(tesseract_cmd: &Path) -> anyhow::Result<String> {
    let output = Command::new(tesseract_cmd).arg("--version").output()?;
    if !output.status.success() {
        anyhow::bail!("`{} --version` exited with {}", tesseract_cmd.display(), output.status);
    }

    // Older builds print the version banner on stderr
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_engine_without_installer_is_unavailable() {
        let dir = tempdir().unwrap();
        let result = ensure_ocr_engine(
            &dir.path().join("no-such-tesseract"),
            &dir.path().join("no-such-installer.exe"),
        );
        assert_eq!(result, OcrAvailability::Unavailable);
    }

    #[cfg(unix)]
    #[test]
    fn test_installer_runs_silently_and_is_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let marker = dir.path().join("installed");
        let installer = dir.path().join("setup.sh");
        fs::write(
            &installer,
            format!("#!/bin/sh\n[ \"$1\" = \"/SILENT\" ] && touch {}\n", marker.display()),
        )
        .unwrap();
        fs::set_permissions(&installer, fs::Permissions::from_mode(0o755)).unwrap();

        let result = ensure_ocr_engine(&dir.path().join("no-such-tesseract"), &installer);

        assert_eq!(result, OcrAvailability::InstallAttempted);
        assert!(marker.exists());
        assert!(!installer.exists());
    }
}
