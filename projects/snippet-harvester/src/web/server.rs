use crate::cli::ToolSettings;
use crate::web::api::{
    create_job_handler, get_job_handler, job_events_handler, list_jobs_handler, stop_job_handler,
};
use crate::web::assets::{index_handler, static_handler};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn router(settings: Arc<ToolSettings>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/jobs", get(list_jobs_handler).post(create_job_handler))
        .route("/api/jobs/:job_id", get(get_job_handler))
        .route("/api/jobs/:job_id/stop", post(stop_job_handler))
        .route("/api/jobs/:job_id/events", get(job_events_handler))
        .route("/*path", get(static_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(settings)
}

pub async fn run_server(host: IpAddr, port: u16, settings: ToolSettings) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires a non-blocking socket
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port.wrapping_add(1);
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    };

    let app = router(Arc::new(settings));

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Snippet Harvester started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app).await?;

    Ok(())
}
