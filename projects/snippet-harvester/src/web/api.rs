use crate::cli::ToolSettings;
use crate::pipeline::orchestrator::{
    get_processing_state, list_jobs, start_processing, stop_processing,
};
use crate::pipeline::types::JobConfig;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Raw form fields, as typed by the user
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub url: String,
    pub duration: String,
}

impl CreateJobRequest {
    pub fn to_job(&self) -> Result<JobConfig, String> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err("URL is required".to_string());
        }
        let duration = self
            .duration
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("Duration must be a whole number of seconds: {:?}", self.duration))?;
        Ok(JobConfig::new(url, duration))
    }
}

pub async fn create_job_handler(
    State(settings): State<Arc<ToolSettings>>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let job = payload
        .to_job()
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    match start_processing(job, settings.as_ref().clone()) {
        Ok((state, _handle)) => Ok((StatusCode::CREATED, Json(state.to_progress_json()))),
        Err(e) => Err((StatusCode::CONFLICT, e.to_string())),
    }
}

pub async fn list_jobs_handler() -> Json<Vec<serde_json::Value>> {
    Json(list_jobs().iter().map(|s| s.to_progress_json()).collect())
}

pub async fn get_job_handler(
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    get_processing_state(&job_id)
        .map(|state| Json(state.to_progress_json()))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn stop_job_handler(Path(job_id): Path<String>) -> StatusCode {
    if stop_processing(&job_id) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Streams progress JSON until the job stops being active. The last event
/// carries the final status.
pub async fn job_events_handler(
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let state = get_processing_state(&job_id).ok_or(StatusCode::NOT_FOUND)?;

    let stream = async_stream::stream! {
        let mut ticks = IntervalStream::new(tokio::time::interval(PROGRESS_INTERVAL));
        while ticks.next().await.is_some() {
            let active = state.is_active.load(Ordering::Relaxed);
            yield Ok(Event::default().event("progress").data(state.to_progress_json().to_string()));
            if !active {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, duration: &str) -> CreateJobRequest {
        CreateJobRequest {
            url: url.to_string(),
            duration: duration.to_string(),
        }
    }

    #[test]
    fn test_form_fields_become_job() {
        let job = request("  https://example.com/watch?v=1 ", " 15 ").to_job().unwrap();
        assert_eq!(job, JobConfig::new("https://example.com/watch?v=1", 15));
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(request("   ", "15").to_job().is_err());
    }

    #[test]
    fn test_non_numeric_duration_rejected() {
        assert!(request("https://example.com", "ten").to_job().is_err());
        assert!(request("https://example.com", "1.5").to_job().is_err());
    }

    #[test]
    fn test_negative_duration_accepted() {
        // Captures nothing, but is not an input error
        let job = request("https://example.com", "-5").to_job().unwrap();
        assert_eq!(job.capture_count(5), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        assert_eq!(
            get_job_handler(Path("missing".to_string())).await.unwrap_err(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            stop_job_handler(Path("missing".to_string())).await,
            StatusCode::NOT_FOUND
        );
        assert!(job_events_handler(Path("missing".to_string())).await.is_err());
    }

    #[tokio::test]
    async fn test_create_while_active_is_conflict() {
        // Hold an active job in the shared registry, waiting out any other
        // test that briefly holds one
        let registry = crate::pipeline::orchestrator::registry();
        let mut held = None;
        for _ in 0..200 {
            if let Ok(reserved) = registry.reserve(&JobConfig::new("https://example.com/held", 5)) {
                held = Some(reserved);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let (state, _cancel) = held.expect("registry stayed busy");

        let err = create_job_handler(
            State(Arc::new(ToolSettings::default())),
            Json(request("https://example.com/v", "15")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        state.mark_cancelled();
        registry.remove(&state.job_id);
    }

    #[tokio::test]
    async fn test_invalid_form_is_bad_request() {
        let err = create_job_handler(
            State(Arc::new(ToolSettings::default())),
            Json(request("", "15")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
