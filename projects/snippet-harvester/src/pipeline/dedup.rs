use anyhow::{Context, Result};
use image_hasher::{HashAlg, HasherConfig};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pipeline::types::ProcessingState;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    pub kept: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// 8x8 average hash of the image at `path`, base64 encoded.
pub fn average_hash(path: &Path) -> Result<String> {
    let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(8, 8)
        .to_hasher();

    Ok(hasher.hash_image(&img).to_base64())
}

/// Keeps the first screenshot of every distinct hash, in the given order,
/// and deletes the rest from disk. Only exact hash matches count as duplicates.
pub fn dedup_screenshots(
    paths: &[PathBuf],
    state: &Arc<ProcessingState>,
    cancel: &CancellationToken,
) -> Result<DedupOutcome> {
    state.set_stage_total("dedup", paths.len());

    let mut seen = HashSet::new();
    let mut outcome = DedupOutcome::default();

    for (i, path) in paths.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let start_inst = Instant::now();
        let hash = average_hash(path)?;
        if seen.insert(hash) {
            outcome.kept.push(path.clone());
        } else {
            outcome.removed.push(path.clone());
        }

        let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;
        state.update_stage("dedup", i + 1, duration_ms);
    }

    for path in &outcome.removed {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    tracing::info!(
        "Dedup kept {} screenshots, removed {} duplicates",
        outcome.kept.len(),
        outcome.removed.len()
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::capture::tests::png_with_pattern;
    use crate::pipeline::types::JobConfig;
    use tempfile::tempdir;

    fn state() -> Arc<ProcessingState> {
        Arc::new(ProcessingState::new("t".to_string(), JobConfig::new("u", 5)))
    }

    #[test]
    fn test_identical_images_share_a_hash() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        let c = dir.path().join("c.png");
        fs::write(&a, png_with_pattern(32)).unwrap();
        fs::write(&b, png_with_pattern(32)).unwrap();
        fs::write(&c, png_with_pattern(8)).unwrap();

        assert_eq!(average_hash(&a).unwrap(), average_hash(&b).unwrap());
        assert_ne!(average_hash(&a).unwrap(), average_hash(&c).unwrap());
    }

    #[test]
    fn test_dedup_keeps_first_of_each_hash() {
        let dir = tempdir().unwrap();
        let paths: Vec<PathBuf> = [32, 8, 32]
            .iter()
            .enumerate()
            .map(|(i, split)| {
                let p = dir.path().join(format!("screenshot_{}.png", i));
                fs::write(&p, png_with_pattern(*split)).unwrap();
                p
            })
            .collect();

        let outcome = dedup_screenshots(&paths, &state(), &CancellationToken::new()).unwrap();

        assert_eq!(outcome.kept, vec![paths[0].clone(), paths[1].clone()]);
        assert_eq!(outcome.removed, vec![paths[2].clone()]);
        assert!(paths[0].exists());
        assert!(paths[1].exists());
        assert!(!paths[2].exists());
    }

    #[test]
    fn test_undecodable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("broken.png");
        fs::write(&p, b"not a png").unwrap();

        let result = dedup_screenshots(&[p], &state(), &CancellationToken::new());
        assert!(result.is_err());
    }
}
