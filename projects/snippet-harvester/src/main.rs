mod cli;
mod pipeline;
mod run_context;
mod web;

use anyhow::Result;
use cli::{Args, Command, ToolSettings};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::orchestrator::{start_processing, stop_processing};
use pipeline::types::{JobConfig, STAGES};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse_args();

    match args.command {
        Command::Serve {
            host,
            port,
            settings,
        } => run_server(host, port, settings).await?,
        Command::Run {
            url,
            duration,
            settings,
        } => run_foreground(JobConfig::new(url, duration), settings).await?,
    }

    Ok(())
}

/// Runs one job with a progress bar. Ctrl-C cancels it.
async fn run_foreground(job: JobConfig, settings: ToolSettings) -> Result<()> {
    let (state, mut handle) = start_processing(job, settings)?;

    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template(
        "{spinner} {msg:>8} [{bar:40}] {pos}/{len} ({elapsed})",
    )?);

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            joined = &mut handle => {
                joined?;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling job {}", state.job_id);
                stop_processing(&state.job_id);
            }
            _ = ticker.tick() => {
                // Show the first stage that still has work left
                if let Some((name, progress)) = STAGES
                    .iter()
                    .filter_map(|name| state.stage(name).map(|p| (*name, p)))
                    .find(|(_, p)| p.current < p.total)
                {
                    bar.set_message(name);
                    bar.set_length(progress.total as u64);
                    bar.set_position(progress.current as u64);
                }
            }
        }
    }
    bar.finish_and_clear();

    let status = state.to_progress_json();
    match state.status() {
        "complete" => {
            println!("{}", serde_json::to_string_pretty(&status["summary"])?);
            Ok(())
        }
        "cancelled" => anyhow::bail!("Job {} was cancelled", state.job_id),
        _ => anyhow::bail!(
            "Job {} failed: {}",
            state.job_id,
            status["error"].as_str().unwrap_or("unknown error")
        ),
    }
}
