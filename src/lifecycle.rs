//! Process lifecycle: state machine, signal handling, and the two run loops.
//!
//! The exporter moves strictly forward through
//! `Starting -> Running -> Draining -> Stopped`. Draining is entered on
//! SIGINT/SIGTERM: the push loop finishes any in-flight cycle and stops, the
//! pull server stops accepting connections and `/metrics` answers 503.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::collector::{Collector, MetricSnapshot};
use crate::error::DeliveryError;
use crate::health_stats::HealthStats;
use crate::metrics;
use crate::push::MetricsSink;
use crate::registry::ServiceRegistry;
use crate::state::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Cloneable handle to the shared lifecycle state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Moves to `next` if it lies ahead of the current state.
    ///
    /// Returns false (and changes nothing) for backward or repeated moves.
    pub fn transition(&self, next: LifecycleState) -> bool {
        let mut from = None;
        let moved = self.tx.send_if_modified(|current| {
            if next > *current {
                from = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            info!("Lifecycle: {:?} -> {:?}", from, next);
        }
        moved
    }

    pub fn is_draining(&self) -> bool {
        self.state() >= LifecycleState::Draining
    }

    /// Resolves once the state reaches `Draining` (or later).
    pub async fn draining(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in self, so wait_for only fails if it is dropped
        let _ = rx.wait_for(|s| *s >= LifecycleState::Draining).await;
    }
}

/// Completes on SIGINT or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that branch
/// never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Settings of the push loop.
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub interval: Duration,
    /// Value of the `instance` label on every pushed series.
    pub instance: String,
}

/// Collects and pushes every `interval` until the lifecycle starts draining.
///
/// The first cycle runs immediately. A cycle that overruns the interval
/// delays the schedule rather than bursting. Delivery errors are logged and
/// never stop the loop.
pub async fn run_push_loop<S: MetricsSink>(
    collector: Arc<Collector>,
    sink: S,
    settings: PushSettings,
    lifecycle: Lifecycle,
    health: Arc<HealthStats>,
) {
    lifecycle.transition(LifecycleState::Running);
    info!(
        "Push loop started with {}s interval (instance={})",
        settings.interval.as_secs_f64(),
        settings.instance
    );

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = lifecycle.draining() => break,
            _ = ticker.tick() => {}
        }

        // not raced against draining: an in-flight cycle always completes
        push_once(&collector, &sink, &settings.instance, &health).await;
    }

    info!("Push loop stopped");
}

async fn push_once<S: MetricsSink>(
    collector: &Arc<Collector>,
    sink: &S,
    instance: &str,
    health: &HealthStats,
) {
    let worker = collector.clone();
    let snapshot = match tokio::task::spawn_blocking(move || worker.run_cycle()).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Collection cycle task failed: {}", e);
            return;
        }
    };
    health.record_cycle(
        snapshot.records.len(),
        snapshot.duration_seconds,
        snapshot.failed_extractions,
    );

    let body = match render_push_body(&snapshot, instance, health) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            health.record_push(false);
            return;
        }
    };

    match sink.push(body).await {
        Ok(()) => {
            health.record_push(true);
            info!(
                "Pushed metrics for {} JVMs ({} GC keys) in {:.2}ms",
                snapshot.records.len(),
                snapshot.gc_keys.len(),
                snapshot.duration_seconds * 1000.0
            );
        }
        Err(e) => {
            health.record_push(false);
            warn!("Push failed, retrying next interval: {}", e);
        }
    }
}

/// Snapshot gauges plus the push counters accumulated so far.
fn render_push_body(
    snapshot: &MetricSnapshot,
    instance: &str,
    health: &HealthStats,
) -> Result<String, DeliveryError> {
    let registry = metrics::build_registry(snapshot, Some(instance))?;
    metrics::register_push_metrics(
        &registry,
        health.pushes_ok(),
        health.pushes_failed(),
        Some(instance),
    )?;
    metrics::encode_text(&registry)
}

/// Serves the HTTP endpoints until `shutdown` resolves, then drains.
///
/// Announces to the service registry before serving and withdraws once
/// draining starts. Registry failures are logged only.
pub async fn run_pull_server<F>(
    state: SharedState,
    listener: TcpListener,
    registry: Option<ServiceRegistry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let lifecycle = state.lifecycle.clone();
    let app = crate::handlers::build_router(state);

    if let Some(registry) = &registry {
        match registry.announce().await {
            Ok(()) => info!("Announced {} to service discovery", registry.target()),
            Err(e) => warn!("Service discovery registration failed: {}", e),
        }
    }

    lifecycle.transition(LifecycleState::Running);

    let drain = lifecycle.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            drain.transition(LifecycleState::Draining);
            if let Some(registry) = registry {
                match registry.withdraw().await {
                    Ok(()) => debug!("Withdrew {} from service discovery", registry.target()),
                    Err(e) => warn!("Service discovery deregistration failed: {}", e),
                }
            }
        })
        .await?;

    lifecycle.transition(LifecycleState::Stopped);
    Ok(())
}
