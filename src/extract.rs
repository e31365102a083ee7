//! Per-process attribute extraction.
//!
//! Each `resolve_*` call runs exactly one diagnostic query and parses its raw
//! text in-process. Parsing is lenient: missing fields fall back to their
//! documented defaults and only a failed invocation is reported as an error.
//! Callers replace an error with the same default, so a JVM is never dropped
//! because one of its attributes could not be read.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::error::{AttributeKind, ExtractionError};
use crate::tools::DiagnosticTools;

/// Label value used when an identity property cannot be determined.
pub const UNKNOWN: &str = "unknown";

/// Flag carrying the configured heap ceiling in `jinfo -flags` output.
const MAX_HEAP_FLAG: &str = "MaxHeapSize=";

/// Application identity embedded as system properties at JVM startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityAttributes {
    pub app_name: String,
    pub variant: String,
}

impl Default for IdentityAttributes {
    fn default() -> Self {
        Self {
            app_name: UNKNOWN.to_string(),
            variant: UNKNOWN.to_string(),
        }
    }
}

/// Configured heap ceiling; 0 when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapAttributes {
    pub max_heap_bytes: u64,
}

/// Lower-cased `jstat -gc` column -> value.
pub type GcSnapshot = BTreeMap<String, f64>;

/// Extracts the two identity properties from `key=value` lines.
pub fn parse_identity(output: &str, app_key: &str, variant_key: &str) -> IdentityAttributes {
    let mut identity = IdentityAttributes::default();

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            k if k == app_key => identity.app_name = value.to_string(),
            k if k == variant_key => identity.variant = value.to_string(),
            _ => {}
        }
    }

    identity
}

/// Extracts the last `MaxHeapSize=<bytes>` value; 0 when absent.
pub fn parse_max_heap(output: &str) -> u64 {
    output
        .split_whitespace()
        .filter_map(|token| {
            let start = token.find(MAX_HEAP_FLAG)?;
            let digits: String = token[start + MAX_HEAP_FLAG.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u64>().ok()
        })
        .last()
        .unwrap_or(0)
}

/// Parses the two-line header/value table printed by `jstat -gc`.
///
/// Headers are lower-cased; a value that is not a number (newer JDKs print
/// `-` for unsupported columns) is recorded as 0.0. Output with fewer than
/// two non-empty lines yields an empty snapshot.
pub fn parse_gc_table(output: &str) -> GcSnapshot {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let (Some(header), Some(values)) = (lines.next(), lines.next()) else {
        return GcSnapshot::new();
    };

    header
        .split_whitespace()
        .zip(values.split_whitespace())
        .map(|(key, value)| (key.to_lowercase(), value.parse::<f64>().unwrap_or(0.0)))
        .collect()
}

/// Runs the identity, heap and GC queries for a single pid.
#[derive(Clone)]
pub struct AttributeExtractor {
    tools: Arc<dyn DiagnosticTools>,
    app_name_property: String,
    variant_property: String,
}

impl AttributeExtractor {
    pub fn new(
        tools: Arc<dyn DiagnosticTools>,
        app_name_property: impl Into<String>,
        variant_property: impl Into<String>,
    ) -> Self {
        Self {
            tools,
            app_name_property: app_name_property.into(),
            variant_property: variant_property.into(),
        }
    }

    pub fn from_config(tools: Arc<dyn DiagnosticTools>, cfg: &Config) -> Self {
        Self::new(tools, cfg.app_name_property(), cfg.variant_property())
    }

    /// Identity labels; fields absent from the properties are `"unknown"`.
    pub fn resolve_identity(&self, pid: u32) -> Result<IdentityAttributes, ExtractionError> {
        let output = self
            .tools
            .system_properties(pid)
            .map_err(|source| ExtractionError {
                pid,
                kind: AttributeKind::Identity,
                source,
            })?;
        Ok(parse_identity(
            &output,
            &self.app_name_property,
            &self.variant_property,
        ))
    }

    /// Heap ceiling in bytes; 0 when the flag is not reported.
    pub fn resolve_heap(&self, pid: u32) -> Result<HeapAttributes, ExtractionError> {
        let output = self.tools.vm_flags(pid).map_err(|source| ExtractionError {
            pid,
            kind: AttributeKind::Heap,
            source,
        })?;
        Ok(HeapAttributes {
            max_heap_bytes: parse_max_heap(&output),
        })
    }

    /// Current GC counters; empty when the table is malformed.
    pub fn resolve_gc(&self, pid: u32) -> Result<GcSnapshot, ExtractionError> {
        let output = self.tools.gc_stats(pid).map_err(|source| ExtractionError {
            pid,
            kind: AttributeKind::Gc,
            source,
        })?;
        Ok(parse_gc_table(&output))
    }
}
