//! Index endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for `/`: a short description of the exporter and its endpoints.
#[instrument(skip(state))]
pub async fn index_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let health_line = if state.config.enable_health.unwrap_or(true) {
        "GET /health      - Exporter status and running statistics (plain text)\n"
    } else {
        ""
    };

    let doc = format!(
        r#"JVM GC EXPORTER
===============

Per-JVM heap ceiling and GC generation metrics, collected with
jps, jinfo and jstat on every scrape.

HTTP ENDPOINTS
--------------
GET /metrics     - Prometheus metrics endpoint
{health_line}GET /            - This page

METRICS
-------
jvm_heap_size_bytes{{pid,appname,variant}}      - Max heap size (MaxHeapSize flag)
jvm_gc_<counter>_bytes{{pid,appname,variant}}   - One gauge per jstat -gc column
jvm_exporter_*                                  - Exporter self-monitoring

Identity labels are read from the system properties
{app} (appname) and {variant} (variant).

{FOOTER_TEXT}
"#,
        app = state.config.app_name_property(),
        variant = state.config.variant_property(),
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
