//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every scrape runs one collection cycle. Cycles are serialized through the
//! state's cycle lock, so parallel scrapes queue instead of spawning
//! concurrent jps/jinfo/jstat storms.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, error, instrument};

use crate::metrics;
use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
    CycleFailed,
    Draining,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        match self {
            MetricsError::EncodingFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response(),
            MetricsError::CycleFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Collection cycle failed",
            )
                .into_response(),
            MetricsError::Draining => {
                (StatusCode::SERVICE_UNAVAILABLE, "Exporter is shutting down").into_response()
            }
        }
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    if state.lifecycle.is_draining() {
        return Err(MetricsError::Draining);
    }

    let _guard = state.cycle_lock.lock().await;
    // the lifecycle may have moved while this request queued
    if state.lifecycle.is_draining() {
        return Err(MetricsError::Draining);
    }

    let collector = state.collector.clone();
    let snapshot = tokio::task::spawn_blocking(move || collector.run_cycle())
        .await
        .map_err(|e| {
            error!("Collection cycle task failed: {}", e);
            MetricsError::CycleFailed
        })?;
    state.record_cycle(&snapshot);

    let body = metrics::render(&snapshot, None).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed
    })?;

    debug!(
        "Served {} JVMs, {} bytes in {:.2}ms",
        snapshot.records.len(),
        body.len(),
        snapshot.duration_seconds * 1000.0
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, metrics::content_type())],
        body,
    ))
}
