//! Health check endpoint handler.
//!
//! Plain-text status line followed by the running-statistics table. Answers
//! 503 when the last discovery failed or while draining.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = concat!("jvm-gc-exporter ", env!("CARGO_PKG_VERSION"));

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let last = state.last_cycle();

    let (status, message) = if state.lifecycle.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "Draining".to_string())
    } else {
        match &last {
            None => (StatusCode::OK, "OK - No collection cycle yet".to_string()),
            Some(c) if !c.discovery_ok => (
                StatusCode::SERVICE_UNAVAILABLE,
                "JVM discovery failed in last cycle".to_string(),
            ),
            Some(c) => (
                StatusCode::OK,
                format!(
                    "OK - {} JVMs at {}",
                    c.processes,
                    c.collected_at.format("%Y-%m-%d %H:%M:%S UTC")
                ),
            ),
        }
    };

    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}\n{FOOTER_TEXT}\n"),
    )
}
