//! Single-cycle command implementation.
//!
//! Runs exactly one collection cycle against the real JDK tools and prints
//! the exposition text to stdout, with an optional summary on stderr.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use crate::cache::AttributeCache;
use crate::collector::{Collector, MetricSnapshot};
use crate::config::Config;
use crate::metrics;
use crate::tools::{DiagnosticTools, JdkTools};

/// Runs one cycle and prints the result.
pub fn command_once(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let tools: Arc<dyn DiagnosticTools> = Arc::new(JdkTools::from_config(config));
    let collector = Collector::from_config(tools, Arc::new(AttributeCache::new()), config)?;

    let snapshot = collector.run_cycle();
    if verbose {
        eprint!("{}", summarize(&snapshot));
    }
    print!("{}", metrics::render(&snapshot, None)?);
    Ok(())
}

/// Human-readable per-JVM summary of a snapshot.
pub fn summarize(snapshot: &MetricSnapshot) -> String {
    let mut out = String::new();
    writeln!(
        out,
        "Cycle at {}: {} JVMs, {} GC keys, {} failed extractions, {:.2}ms",
        snapshot.collected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.records.len(),
        snapshot.gc_keys.len(),
        snapshot.failed_extractions,
        snapshot.duration_seconds * 1000.0
    )
    .ok();
    if !snapshot.discovery_ok {
        writeln!(out, "  JVM discovery failed").ok();
    }
    for r in &snapshot.records {
        writeln!(
            out,
            "  {:>7} {:<30} appname={} variant={} max_heap={}MB gc_keys={}",
            r.pid,
            r.display_name,
            r.identity.app_name,
            r.identity.variant,
            r.heap.max_heap_bytes / 1024 / 1024,
            r.gc.len()
        )
        .ok();
    }
    out
}
