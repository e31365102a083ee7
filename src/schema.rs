//! Per-cycle metric schema for GC counters.
//!
//! The set of `jstat -gc` columns depends on the collector and JDK version, so
//! the gauges exported in a cycle are derived from the keys actually observed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::collector::CollectedRecord;

/// Prefix of every per-counter gauge.
pub const GC_METRIC_PREFIX: &str = "jvm_gc_";
/// Suffix of every per-counter gauge.
pub const GC_METRIC_SUFFIX: &str = "_bytes";

/// One gauge of the dynamic schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeDescriptor {
    /// Counter key as found in the GC snapshot.
    pub key: String,
    pub name: String,
    pub help: String,
}

impl GaugeDescriptor {
    pub fn for_key(key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: format!("{GC_METRIC_PREFIX}{}{GC_METRIC_SUFFIX}", sanitize(key)),
            help: format!("GC metric for {key}."),
        }
    }
}

/// Ordered gauge descriptors for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSchema {
    pub gauges: Vec<GaugeDescriptor>,
    /// Raw keys left out because an earlier key took their metric name.
    pub dropped: Vec<String>,
}

impl MetricSchema {
    /// One descriptor per key, in the order given.
    ///
    /// Two raw keys may sanitize to the same metric name; the first one wins.
    pub fn build<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut schema = Self::default();
        for key in keys {
            let descriptor = GaugeDescriptor::for_key(key.as_ref());
            if let Some(owner) = owners.get(&descriptor.name) {
                warn!(
                    "GC key '{}' maps to {} already used by '{}', dropping it",
                    descriptor.key, descriptor.name, owner
                );
                schema.dropped.push(descriptor.key);
                continue;
            }
            owners.insert(descriptor.name.clone(), descriptor.key.clone());
            schema.gauges.push(descriptor);
        }
        schema
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }
}

/// Sorted union of all GC keys seen across `records`.
pub fn gc_key_union(records: &[CollectedRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.gc.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Maps a counter key onto the Prometheus metric name charset.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
