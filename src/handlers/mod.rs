//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/metrics`: Prometheus metrics endpoint, one collection cycle per scrape
//! - `/health`: Health check endpoint
//! - `/`: Index page

use axum::{routing::get, Router};

use crate::state::SharedState;

pub mod doc;
pub mod health;
pub mod metrics;

// Re-export handlers
pub use doc::index_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

/// Routes of the pull-mode server; `/health` unless disabled in config.
pub fn build_router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler));

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AttributeCache;
    use crate::collector::Collector;
    use crate::config::Config;
    use crate::lifecycle::{Lifecycle, LifecycleState};
    use crate::state::AppState;
    use crate::tools::testing::FakeTools;
    use crate::tools::DiagnosticTools;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state_with(tools: &Arc<FakeTools>, config: Config) -> SharedState {
        let dyn_tools: Arc<dyn DiagnosticTools> = tools.clone();
        let collector =
            Collector::from_config(dyn_tools, Arc::new(AttributeCache::new()), &config).unwrap();
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Running);
        Arc::new(AppState::new(
            Arc::new(collector),
            Arc::new(config),
            lifecycle,
        ))
    }

    async fn get(state: &SharedState, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = build_router(state.clone())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_runs_a_cycle_per_scrape() {
        let tools = Arc::new(FakeTools::default());
        tools.set_listing("101 Foo\n");
        tools.add_jvm(
            101,
            "com.netfolio.appname=billing\ncom.netfolio.fullname=v3\n",
            "-XX:MaxHeapSize=2147483648",
            "S0C OC\n1024.0 8192.0\n",
        );
        let state = state_with(&tools, Config::default());

        let (status, content_type, body) = get(&state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(crate::metrics::content_type()));
        assert!(body.contains(
            r#"jvm_heap_size_bytes{appname="billing",pid="101",variant="v3"} 2147483648"#
        ));
        assert!(body.contains(r#"jvm_gc_oc_bytes{appname="billing",pid="101",variant="v3"} 8192"#));

        // the JVM exits before the next scrape
        tools.set_listing("");
        let (_, _, body) = get(&state, "/metrics").await;
        assert!(!body.contains("pid=\"101\""));
        assert_eq!(tools.calls(), (1, 1, 1));
        assert_eq!(state.health_stats.total_cycles(), 2);
    }

    #[tokio::test]
    async fn test_metrics_unavailable_while_draining() {
        let tools = Arc::new(FakeTools::default());
        tools.set_listing("1 A\n");
        let state = state_with(&tools, Config::default());
        state.lifecycle.transition(LifecycleState::Draining);

        let (status, _, _) = get(&state, "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.health_stats.total_cycles(), 0);
    }

    #[tokio::test]
    async fn test_health_reflects_last_discovery() {
        let tools = Arc::new(FakeTools::default());
        tools.set_listing("1 A\n");
        let state = state_with(&tools, Config::default());

        let (status, _, body) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("OK - No collection cycle yet"));

        get(&state, "/metrics").await;
        let (status, _, body) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("OK - 1 JVMs"));
        assert!(body.contains("number of done cycles: 1"));

        tools.fail_listing();
        get(&state, "/metrics").await;
        let (status, _, _) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_can_be_disabled() {
        let tools = Arc::new(FakeTools::default());
        let config = Config {
            enable_health: Some(false),
            ..Config::default()
        };
        let state = state_with(&tools, config);

        let (status, _, _) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, body) = get(&state, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("/health"));
        assert!(body.contains("com.netfolio.appname"));
    }
}
