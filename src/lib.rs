//! Prometheus exporter for per-JVM heap ceiling and GC generation metrics.
//!
//! Each collection cycle discovers the running JVMs with `jps`, reads identity
//! labels and the maximum heap size with `jinfo` (memoized per pid) and the
//! generation capacities with `jstat -gc`. Snapshots are either served on
//! `/metrics` (pull) or pushed to a Prometheus Pushgateway (push).

pub mod cache;
pub mod cli;
pub mod collector;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod health_stats;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod push;
pub mod registry;
pub mod schema;
pub mod state;
pub mod tools;
