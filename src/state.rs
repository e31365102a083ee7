//! Application state shared with the HTTP handlers.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::collector::{Collector, MetricSnapshot};
use crate::config::Config;
use crate::health_stats::HealthStats;
use crate::lifecycle::Lifecycle;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Outcome of the most recent collection cycle, for `/health`.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub processes: usize,
    pub discovery_ok: bool,
    pub failed_extractions: usize,
    pub collected_at: DateTime<Utc>,
}

impl From<&MetricSnapshot> for CycleSummary {
    fn from(snapshot: &MetricSnapshot) -> Self {
        Self {
            processes: snapshot.records.len(),
            discovery_ok: snapshot.discovery_ok,
            failed_extractions: snapshot.failed_extractions,
            collected_at: snapshot.collected_at,
        }
    }
}

pub struct AppState {
    pub collector: Arc<Collector>,
    /// Serializes pull-mode cycles; concurrent scrapes queue behind it.
    pub cycle_lock: Mutex<()>,
    pub config: Arc<Config>,
    pub lifecycle: Lifecycle,
    pub health_stats: Arc<HealthStats>,
    pub last_cycle: StdMutex<Option<CycleSummary>>,
}

impl AppState {
    pub fn new(collector: Arc<Collector>, config: Arc<Config>, lifecycle: Lifecycle) -> Self {
        Self {
            collector,
            cycle_lock: Mutex::new(()),
            config,
            lifecycle,
            health_stats: Arc::new(HealthStats::new()),
            last_cycle: StdMutex::new(None),
        }
    }

    pub fn record_cycle(&self, snapshot: &MetricSnapshot) {
        self.health_stats.record_cycle(
            snapshot.records.len(),
            snapshot.duration_seconds,
            snapshot.failed_extractions,
        );
        if let Ok(mut last) = self.last_cycle.lock() {
            *last = Some(CycleSummary::from(snapshot));
        }
    }

    pub fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle.lock().ok().and_then(|l| l.clone())
    }
}
