// Capture stage: opens the video page, starts playback in fullscreen and
// screenshots the player after each skip forward.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::browser::{PageCondition, PlayerKey, VideoBrowser};
use crate::pipeline::types::ProcessingState;
use crate::run_context::RunContext;

pub struct CaptureConfig {
    pub captures: usize,
    pub ready_timeout: Duration,
    pub settle_timeout: Duration,
}

/// Drives the player and writes `screenshot_<i>.png` for each capture.
/// Returns the paths written, in capture order. Stops early, without error,
/// when `cancel` fires.
pub async fn capture_screenshots<B: VideoBrowser>(
    browser: &mut B,
    url: &str,
    config: &CaptureConfig,
    ctx: &RunContext,
    state: &Arc<ProcessingState>,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    state.set_stage_total("capture", config.captures);

    browser.open(url).await?;
    wait_or_warn(browser, PageCondition::VideoReady, config.ready_timeout).await?;

    browser.send_key(PlayerKey::Fullscreen).await?;
    wait_or_warn(browser, PageCondition::Fullscreen, config.ready_timeout).await?;

    browser.send_key(PlayerKey::PlayPause).await?;
    wait_or_warn(browser, PageCondition::Playing, config.ready_timeout).await?;

    let mut written = Vec::with_capacity(config.captures);
    for index in 0..config.captures {
        if cancel.is_cancelled() {
            info!("Capture cancelled after {} screenshots", written.len());
            break;
        }

        let start_inst = Instant::now();
        let landed = match browser.playback_position_ms().await? {
            Some(from_ms) => PageCondition::SeekedPast { from_ms },
            None => PageCondition::SeekSettled,
        };
        browser.send_key(PlayerKey::SkipForward).await?;
        // A seek that has not landed still yields a usable frame
        if !browser.wait_until(landed, config.settle_timeout).await? {
            debug!("Skip {} did not reach {:?} in time", index, landed);
        }

        let png = browser.screenshot().await?;
        let path = ctx.screenshot_path(index);
        tokio::fs::write(&path, &png)
            .await
            .with_context(|| format!("Failed to save {}", path.display()))?;
        written.push(path);

        let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;
        state.update_stage("capture", index + 1, duration_ms);
    }

    Ok(written)
}

async fn wait_or_warn<B: VideoBrowser>(
    browser: &mut B,
    condition: PageCondition,
    timeout: Duration,
) -> Result<()> {
    if !browser.wait_until(condition, timeout).await? {
        warn!(
            "Page did not reach {:?} within {:?}, continuing",
            condition, timeout
        );
    }
    Ok(())
}
