//! Collection cycle orchestration.
//!
//! One cycle enumerates the live JVMs, prunes the attribute cache to them,
//! extracts identity, heap and GC data for each pid in parallel and returns a
//! self-contained [`MetricSnapshot`]. Extraction failures are absorbed per pid
//! and per attribute kind; every live pid yields exactly one record.

use ahash::AHashSet as HashSet;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::cache::AttributeCache;
use crate::config::Config;
use crate::discovery::{self, ProcessFilter, ProcessHandle};
use crate::error::ExtractionError;
use crate::extract::{AttributeExtractor, GcSnapshot, HeapAttributes, IdentityAttributes};
use crate::schema::{gc_key_union, MetricSchema};
use crate::tools::DiagnosticTools;

/// Everything collected for one live JVM in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedRecord {
    pub pid: u32,
    pub display_name: String,
    pub identity: IdentityAttributes,
    pub heap: HeapAttributes,
    pub gc: GcSnapshot,
}

/// Result of one collection cycle; the unit of publication.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    /// One record per live pid, ordered by pid.
    pub records: Vec<CollectedRecord>,
    /// Sorted union of the GC keys over all records.
    pub gc_keys: Vec<String>,
    /// False when the process listing itself failed.
    pub discovery_ok: bool,
    pub failed_extractions: usize,
    pub cached_processes: usize,
    pub duration_seconds: f64,
    pub collected_at: DateTime<Utc>,
}

impl MetricSnapshot {
    pub fn schema(&self) -> MetricSchema {
        MetricSchema::build(&self.gc_keys)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.pid).collect()
    }
}

/// Drives collection cycles against a set of diagnostic tools.
pub struct Collector {
    tools: Arc<dyn DiagnosticTools>,
    extractor: AttributeExtractor,
    cache: Arc<AttributeCache>,
    filter: ProcessFilter,
    pool: Option<rayon::ThreadPool>,
}

impl Collector {
    /// Builds a collector; `parallelism` of `None` or 0 uses rayon's global pool.
    pub fn new(
        tools: Arc<dyn DiagnosticTools>,
        extractor: AttributeExtractor,
        cache: Arc<AttributeCache>,
        filter: ProcessFilter,
        parallelism: Option<usize>,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = match parallelism {
            Some(threads) if threads > 0 => {
                debug!("Extraction pool configured with {} threads", threads);
                Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(threads)
                        .thread_name(|i| format!("jvm-extract-{i}"))
                        .build()?,
                )
            }
            _ => None,
        };

        Ok(Self {
            tools,
            extractor,
            cache,
            filter,
            pool,
        })
    }

    pub fn from_config(
        tools: Arc<dyn DiagnosticTools>,
        cache: Arc<AttributeCache>,
        cfg: &Config,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let extractor = AttributeExtractor::from_config(tools.clone(), cfg);
        Self::new(
            tools,
            extractor,
            cache,
            ProcessFilter::from_config(cfg),
            cfg.parallelism,
        )
    }

    pub fn cache(&self) -> &Arc<AttributeCache> {
        &self.cache
    }

    /// Runs one full cycle. Blocking; call from a blocking context.
    #[instrument(skip(self))]
    pub fn run_cycle(&self) -> MetricSnapshot {
        let start = Instant::now();
        let collected_at = Utc::now();

        let (handles, discovery_ok) = match discovery::enumerate(self.tools.as_ref(), &self.filter)
        {
            Ok(handles) => (handles, true),
            Err(e) => {
                warn!("{}; treating as no JVMs this cycle", e);
                (Vec::new(), false)
            }
        };

        let live: HashSet<u32> = handles.iter().map(|h| h.pid).collect();
        let pruned = self.cache.prune(&live);
        if pruned > 0 {
            debug!("Pruned {} cache entries of exited JVMs", pruned);
        }

        let failures = AtomicUsize::new(0);
        let mut records: Vec<CollectedRecord> = match &self.pool {
            Some(pool) => pool.install(|| self.collect_all(&handles, &failures)),
            None => self.collect_all(&handles, &failures),
        };
        records.sort_by_key(|r| r.pid);

        let gc_keys = gc_key_union(&records);
        let failed_extractions = failures.load(Ordering::Relaxed);

        debug!(
            "Cycle completed: {} JVMs, {} GC keys, {} failed extractions, {:.2}ms",
            records.len(),
            gc_keys.len(),
            failed_extractions,
            start.elapsed().as_secs_f64() * 1000.0
        );

        MetricSnapshot {
            records,
            gc_keys,
            discovery_ok,
            failed_extractions,
            cached_processes: self.cache.len(),
            duration_seconds: start.elapsed().as_secs_f64(),
            collected_at,
        }
    }

    fn collect_all(&self, handles: &[ProcessHandle], failures: &AtomicUsize) -> Vec<CollectedRecord> {
        handles
            .par_iter()
            .map(|handle| self.collect_one(handle, failures))
            .collect()
    }

    fn collect_one(&self, handle: &ProcessHandle, failures: &AtomicUsize) -> CollectedRecord {
        let pid = handle.pid;

        let identity = match self.cache.identity(pid) {
            Some(identity) => identity,
            None => match self.extractor.resolve_identity(pid) {
                Ok(identity) => {
                    self.cache.put_identity(pid, identity.clone());
                    identity
                }
                Err(e) => absorb(e, failures),
            },
        };

        let heap = match self.cache.heap(pid) {
            Some(heap) => heap,
            None => match self.extractor.resolve_heap(pid) {
                Ok(heap) => {
                    self.cache.put_heap(pid, heap);
                    heap
                }
                Err(e) => absorb(e, failures),
            },
        };

        let gc = self
            .extractor
            .resolve_gc(pid)
            .unwrap_or_else(|e| absorb(e, failures));

        debug!(
            "Collected JVM {} ({}): appname={}, variant={}, max_heap={} bytes, {} GC counters",
            pid,
            handle.display_name,
            identity.app_name,
            identity.variant,
            heap.max_heap_bytes,
            gc.len()
        );

        CollectedRecord {
            pid,
            display_name: handle.display_name.clone(),
            identity,
            heap,
            gc,
        }
    }
}

/// Logs an extraction failure and yields the attribute's default value.
fn absorb<T: Default>(err: ExtractionError, failures: &AtomicUsize) -> T {
    warn!(pid = err.pid, kind = %err.kind, "{}", err);
    failures.fetch_add(1, Ordering::Relaxed);
    T::default()
}
