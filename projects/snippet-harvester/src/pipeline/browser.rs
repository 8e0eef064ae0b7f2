// Browser automation seam: the capture stage talks to this trait, the
// WebDriver implementation drives a real browser through fantoccini.

use anyhow::{Context, Result};
use fantoccini::key::Key;
use fantoccini::{Client, ClientBuilder, Locator};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Smallest jump that counts as a completed skip. Player skip steps are
/// several seconds.
pub const MIN_SKIP_MS: u64 = 1000;

const VIDEO: &str = "const v = document.querySelector('video');";

/// Keyboard shortcuts understood by the common web video players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKey {
    Fullscreen,
    PlayPause,
    SkipForward,
}

impl PlayerKey {
    pub fn as_keys(&self) -> String {
        match self {
            PlayerKey::Fullscreen => "f".to_string(),
            PlayerKey::PlayPause => char::from(Key::Space).to_string(),
            PlayerKey::SkipForward => char::from(Key::Right).to_string(),
        }
    }
}

/// Page states the capture stage waits for instead of sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCondition {
    /// A `<video>` element has decoded enough to show the current frame
    VideoReady,
    Fullscreen,
    Playing,
    /// No seek in progress and the current frame is available
    SeekSettled,
    /// Settled at least [`MIN_SKIP_MS`] past `from_ms`, so a skip has landed
    SeekedPast { from_ms: u64 },
}

impl PageCondition {
    pub fn script(&self) -> String {
        match self {
            PageCondition::VideoReady => format!("{} return !!v && v.readyState >= 2;", VIDEO),
            PageCondition::Fullscreen => "return document.fullscreenElement !== null;".to_string(),
            PageCondition::Playing => format!("{} return !!v && !v.paused;", VIDEO),
            PageCondition::SeekSettled => {
                format!("{} return !!v && !v.seeking && v.readyState >= 2;", VIDEO)
            }
            PageCondition::SeekedPast { from_ms } => format!(
                "{} return !!v && !v.seeking && v.readyState >= 2 && v.currentTime * 1000 >= {};",
                VIDEO,
                from_ms + MIN_SKIP_MS
            ),
        }
    }
}

pub trait VideoBrowser: Send {
    fn open(&mut self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Polls `condition` until it holds or `timeout` elapses. Returns whether it held.
    fn wait_until(
        &mut self,
        condition: PageCondition,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn send_key(&mut self, key: PlayerKey) -> impl Future<Output = Result<()>> + Send;

    /// Current position of the video in milliseconds, `None` when the page
    /// has no readable `<video>` element.
    fn playback_position_ms(&mut self) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// PNG-encoded screenshot of the viewport
    fn screenshot(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Browser session behind a W3C WebDriver endpoint.
pub struct WebDriverBrowser {
    client: Client,
}

impl WebDriverBrowser {
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut caps = serde_json::Map::new();
        if headless {
            caps.insert(
                "goog:chromeOptions".to_string(),
                serde_json::json!({ "args": ["--headless=new", "--window-size=1920,1080"] }),
            );
            caps.insert(
                "moz:firefoxOptions".to_string(),
                serde_json::json!({ "args": ["-headless"] }),
            );
        }

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .with_context(|| format!("Failed to start a WebDriver session at {}", webdriver_url))?;
        tracing::info!("Connected to WebDriver at {}", webdriver_url);

        Ok(Self { client })
    }
}

impl VideoBrowser for WebDriverBrowser {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.client
            .goto(url)
            .await
            .with_context(|| format!("Failed to open {}", url))
    }

    async fn wait_until(&mut self, condition: PageCondition, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let value = self
                .client
                .execute(&condition.script(), vec![])
                .await
                .with_context(|| format!("Failed to evaluate {:?}", condition))?;
            if value.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn send_key(&mut self, key: PlayerKey) -> Result<()> {
        let body = self
            .client
            .find(Locator::Css("body"))
            .await
            .context("Page has no body element")?;
        body.send_keys(&key.as_keys())
            .await
            .with_context(|| format!("Failed to send {:?}", key))
    }

    async fn playback_position_ms(&mut self) -> Result<Option<u64>> {
        let value = self
            .client
            .execute(
                &format!("{} return v ? v.currentTime : null;", VIDEO),
                vec![],
            )
            .await
            .context("Failed to read playback position")?;
        Ok(value
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| (secs * 1000.0) as u64))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .context("Failed to take screenshot")
    }

    async fn close(&mut self) -> Result<()> {
        self.client
            .clone()
            .close()
            .await
            .context("Failed to close browser session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_keys() {
        assert_eq!(PlayerKey::Fullscreen.as_keys(), "f");
        assert_eq!(PlayerKey::PlayPause.as_keys(), "\u{e00d}");
        assert_eq!(PlayerKey::SkipForward.as_keys(), "\u{e014}");
    }

    #[test]
    fn test_condition_scripts_return_booleans() {
        for condition in [
            PageCondition::VideoReady,
            PageCondition::Fullscreen,
            PageCondition::Playing,
            PageCondition::SeekSettled,
            PageCondition::SeekedPast { from_ms: 0 },
        ] {
            assert!(condition.script().contains("return"));
        }
    }

    #[test]
    fn test_seeked_past_requires_a_full_skip() {
        let script = PageCondition::SeekedPast { from_ms: 5000 }.script();
        assert!(script.contains("!v.seeking"));
        assert!(script.ends_with("v.currentTime * 1000 >= 6000;"));
    }
}
