//! Client for the HTTP service-discovery registry.
//!
//! In pull mode the exporter announces its scrape target on startup and
//! withdraws it on shutdown. Both calls are best effort.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::lookup_host;
use tracing::{debug, warn};

use crate::config::{Config, HOSTNAME};
use crate::error::RegistrationError;

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, PartialEq)]
struct TargetGroup<'a> {
    targets: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a BTreeMap<String, String>>,
}

/// Announces and withdraws one `<host>:<port>` scrape target.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    client: reqwest::Client,
    url: String,
    target: String,
    labels: BTreeMap<String, String>,
}

impl ServiceRegistry {
    pub fn new(
        url: impl Into<String>,
        target: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            target: target.into(),
            labels,
        })
    }

    /// Builds a client when `sd_url` is configured.
    pub async fn from_config(cfg: &Config) -> Result<Option<Self>, reqwest::Error> {
        let Some(url) = cfg.sd_url.as_deref() else {
            return Ok(None);
        };
        let host = service_host(cfg).await;
        let target = format!("{}:{}", host, cfg.port());
        Self::new(url, target, cfg.sd_labels()).map(Some)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// `POST {"targets": [...], "labels": {...}}`.
    pub async fn announce(&self) -> Result<(), RegistrationError> {
        let body = TargetGroup {
            targets: [self.target.as_str()],
            labels: Some(&self.labels),
        };
        let response = self.client.post(&self.url).json(&body).send().await?;
        check(response.status())?;
        debug!("Registered {} with service discovery at {}", self.target, self.url);
        Ok(())
    }

    /// `DELETE {"targets": [...]}`.
    pub async fn withdraw(&self) -> Result<(), RegistrationError> {
        let body = TargetGroup {
            targets: [self.target.as_str()],
            labels: None,
        };
        let response = self.client.delete(&self.url).json(&body).send().await?;
        check(response.status())?;
        debug!("Deregistered {} from {}", self.target, self.url);
        Ok(())
    }
}

fn check(status: reqwest::StatusCode) -> Result<(), RegistrationError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RegistrationError::Rejected(status.as_u16()))
    }
}

/// Configured service host, else the first IPv4 address of the host name,
/// else the host name itself.
pub async fn service_host(cfg: &Config) -> String {
    if let Some(host) = cfg.service_host.as_deref().filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    match lookup_host((HOSTNAME.as_str(), cfg.port())).await {
        Ok(addrs) => {
            let addrs: Vec<_> = addrs.collect();
            addrs
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addrs.first())
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| HOSTNAME.clone())
        }
        Err(e) => {
            warn!("Could not resolve host name {}: {}", *HOSTNAME, e);
            HOSTNAME.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Calls = Arc<Mutex<Vec<(&'static str, Value)>>>;

    async fn fake_registry() -> (String, Calls) {
        let calls: Calls = Arc::default();
        let app = Router::new()
            .route(
                "/sd",
                post(|State(c): State<Calls>, Json(v): Json<Value>| async move {
                    c.lock().unwrap().push(("POST", v));
                    StatusCode::OK
                })
                .delete(|State(c): State<Calls>, Json(v): Json<Value>| async move {
                    c.lock().unwrap().push(("DELETE", v));
                    StatusCode::OK
                }),
            )
            .with_state(calls.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/sd"), calls)
    }

    #[tokio::test]
    async fn test_announce_and_withdraw() {
        let (url, calls) = fake_registry().await;
        let mut labels = BTreeMap::new();
        labels.insert("job".to_string(), "docker-metrics-service".to_string());
        let registry = ServiceRegistry::new(url, "10.0.0.5:9100", labels).unwrap();

        registry.announce().await.unwrap();
        registry.withdraw().await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "POST");
        assert_eq!(
            calls[0].1,
            serde_json::json!({
                "targets": ["10.0.0.5:9100"],
                "labels": {"job": "docker-metrics-service"}
            })
        );
        assert_eq!(calls[1].0, "DELETE");
        assert_eq!(calls[1].1, serde_json::json!({"targets": ["10.0.0.5:9100"]}));
    }

    #[tokio::test]
    async fn test_announce_failure_is_an_error() {
        let registry =
            ServiceRegistry::new("http://127.0.0.1:9/sd", "h:1", BTreeMap::new()).unwrap();
        assert!(matches!(
            registry.announce().await,
            Err(RegistrationError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_disabled_without_url() {
        assert!(ServiceRegistry::from_config(&Config::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_service_host_prefers_configured_value() {
        let cfg = Config {
            service_host: Some("jvm-host.internal".into()),
            port: Some(9200),
            sd_url: Some("http://sd:8000/sd".into()),
            ..Config::default()
        };
        assert_eq!(service_host(&cfg).await, "jvm-host.internal");
        let registry = ServiceRegistry::from_config(&cfg).await.unwrap().unwrap();
        assert_eq!(registry.target(), "jvm-host.internal:9200");
    }
}
