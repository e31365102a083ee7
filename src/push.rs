//! Delivery of encoded snapshots to a Prometheus Pushgateway.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::Config;
use crate::error::DeliveryError;
use crate::metrics;

/// Destination for encoded snapshots in push mode.
pub trait MetricsSink: Send + Sync {
    /// Transmits one encoded snapshot. Not retried by callers.
    fn push(&self, body: String) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Pushes to `<gateway>/metrics/job/<job>/instance/<instance>`.
///
/// Uses `PUT`, which replaces the whole group on the gateway, so series of
/// JVMs that exited since the previous push disappear with it. The instance
/// in the grouping key keeps hosts sharing a job name from replacing each
/// other's groups.
#[derive(Debug, Clone)]
pub struct GatewayPusher {
    client: reqwest::Client,
    url: String,
}

impl GatewayPusher {
    pub fn new(
        base_url: &str,
        job: &str,
        instance: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: push_url(base_url, job, instance),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, reqwest::Error> {
        // a push must never outlive the interval it belongs to
        Self::new(
            cfg.gateway_url(),
            cfg.job_name(),
            &cfg.instance(),
            cfg.push_interval(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MetricsSink for GatewayPusher {
    async fn push(&self, body: String) -> Result<(), DeliveryError> {
        let bytes = body.len();
        let response = self
            .client
            .put(&self.url)
            .header(CONTENT_TYPE, metrics::content_type())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        debug!("Pushed {} bytes to {} ({})", bytes, self.url, status);
        Ok(())
    }
}

/// Gateway URL for a `job`/`instance` grouping key.
pub fn push_url(base_url: &str, job: &str, instance: &str) -> String {
    format!(
        "{}/metrics/job/{}/instance/{}",
        base_url.trim_end_matches('/'),
        job,
        instance
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Bytes, extract::State, http::StatusCode, routing::put, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Received = Arc<Mutex<Vec<String>>>;

    async fn fake_gateway(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/metrics/job/{job}/instance/{instance}",
                put(
                    move |State(seen): State<Received>, body: Bytes| async move {
                        seen.lock()
                            .unwrap()
                            .push(String::from_utf8_lossy(&body).into_owned());
                        status
                    },
                ),
            )
            .with_state(received.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), received)
    }

    #[test]
    fn test_push_url() {
        assert_eq!(
            push_url("http://pushgateway:9091/", "jvm_metrics_pusher", "node-1"),
            "http://pushgateway:9091/metrics/job/jvm_metrics_pusher/instance/node-1"
        );
    }

    #[test]
    fn test_hosts_sharing_a_job_push_to_separate_groups() {
        let pusher_for = |instance: &str| {
            let cfg = Config {
                instance: Some(instance.into()),
                ..Config::default()
            };
            GatewayPusher::from_config(&cfg).unwrap()
        };
        let a = pusher_for("host-a");
        let b = pusher_for("host-b");

        assert_ne!(a.url(), b.url());
        assert!(a.url().ends_with("/metrics/job/jvm_metrics_pusher/instance/host-a"));
        assert!(b.url().ends_with("/metrics/job/jvm_metrics_pusher/instance/host-b"));
    }

    #[tokio::test]
    async fn test_push_delivers_body() {
        let (base, received) = fake_gateway(StatusCode::OK).await;
        let pusher = GatewayPusher::new(&base, "jvms", "node-1", Duration::from_secs(5)).unwrap();

        pusher.push("jvm_heap_size_bytes 1\n".into()).await.unwrap();

        assert_eq!(received.lock().unwrap().as_slice(), ["jvm_heap_size_bytes 1\n"]);
    }

    #[tokio::test]
    async fn test_push_rejected_status() {
        let (base, _) = fake_gateway(StatusCode::BAD_REQUEST).await;
        let pusher = GatewayPusher::new(&base, "jvms", "node-1", Duration::from_secs(5)).unwrap();

        let err = pusher.push("x 1\n".into()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_push_transport_error() {
        // nothing listens on the discard port of localhost
        let pusher = GatewayPusher::new("http://127.0.0.1:9", "jvms", "node-1", Duration::from_secs(2))
                .unwrap();
        let err = pusher.push("x 1\n".into()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
