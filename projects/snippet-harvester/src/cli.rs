use clap::{Args as ClapArgs, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the web form and run jobs in the background
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Port to bind to
        #[arg(long, default_value_t = 12207)]
        port: u16,

        #[command(flatten)]
        settings: ToolSettings,
    },
    /// Run a single job in the foreground
    Run {
        /// Page hosting the video
        #[arg(long)]
        url: String,

        /// Video duration in seconds
        #[arg(long, allow_negative_numbers = true)]
        duration: i64,

        #[command(flatten)]
        settings: ToolSettings,
    },
}

/// Settings shared by every job. Job parameters (URL, duration) are not part of this.
#[derive(ClapArgs, Debug, Clone)]
pub struct ToolSettings {
    /// WebDriver endpoint (chromedriver, geckodriver, ...)
    #[arg(
        long,
        env = "SNIPPET_HARVESTER_WEBDRIVER_URL",
        default_value = "http://localhost:4444"
    )]
    pub webdriver_url: String,

    /// Ask the browser to run without a window
    #[arg(long, env = "SNIPPET_HARVESTER_HEADLESS")]
    pub headless: bool,

    /// Directory the screenshots are written to
    #[arg(long, env = "SNIPPET_HARVESTER_SCREENSHOT_DIR", default_value = "ss")]
    pub screenshot_dir: PathBuf,

    /// Text file the filtered snippets are written to
    #[arg(
        long,
        env = "SNIPPET_HARVESTER_OUTPUT_FILE",
        default_value = "output_code.txt"
    )]
    pub output_file: PathBuf,

    /// Remove screenshots left over from earlier runs before capturing
    #[arg(long, env = "SNIPPET_HARVESTER_CLEAN_SCREENSHOTS")]
    pub clean_screenshots: bool,

    /// Tesseract executable
    #[arg(long, env = "SNIPPET_HARVESTER_TESSERACT", default_value = "tesseract")]
    pub tesseract_cmd: PathBuf,

    /// Installer run silently when tesseract cannot be found
    #[arg(
        long,
        env = "SNIPPET_HARVESTER_TESSERACT_INSTALLER",
        default_value = "tesseract-ocr-setup.exe"
    )]
    pub tesseract_installer: PathBuf,

    /// OCR language passed to tesseract
    #[arg(long, env = "SNIPPET_HARVESTER_OCR_LANG", default_value = "eng")]
    pub ocr_lang: String,

    /// Seconds of video covered by one screenshot
    #[arg(long, env = "SNIPPET_HARVESTER_SECONDS_PER_CAPTURE", default_value_t = 5)]
    pub seconds_per_capture: i64,

    /// Upper bound for page readiness checks
    #[arg(long, env = "SNIPPET_HARVESTER_READY_TIMEOUT_SECS", default_value_t = 10)]
    pub ready_timeout_secs: u64,

    /// Upper bound for waiting on a seek to settle before a screenshot
    #[arg(long, env = "SNIPPET_HARVESTER_SETTLE_MS", default_value_t = 600)]
    pub settle_ms: u64,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl ToolSettings {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: false,
            screenshot_dir: PathBuf::from("ss"),
            output_file: PathBuf::from("output_code.txt"),
            clean_screenshots: false,
            tesseract_cmd: PathBuf::from("tesseract"),
            tesseract_installer: PathBuf::from("tesseract-ocr-setup.exe"),
            ocr_lang: "eng".to_string(),
            seconds_per_capture: 5,
            ready_timeout_secs: 10,
            settle_ms: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_defaults_match_tool_defaults() {
        let args = Args::try_parse_from([
            "snippet-harvester",
            "run",
            "--url",
            "https://example.com/watch",
            "--duration",
            "15",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                url,
                duration,
                settings,
            } => {
                assert_eq!(url, "https://example.com/watch");
                assert_eq!(duration, 15);
                let defaults = ToolSettings::default();
                assert_eq!(settings.screenshot_dir, defaults.screenshot_dir);
                assert_eq!(settings.output_file, defaults.output_file);
                assert_eq!(settings.seconds_per_capture, 5);
                assert_eq!(settings.settle_timeout(), Duration::from_millis(600));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_accepts_negative_duration() {
        let args = Args::try_parse_from([
            "snippet-harvester",
            "run",
            "--url",
            "x",
            "--duration",
            "-5",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Run { duration: -5, .. }));
    }
}
