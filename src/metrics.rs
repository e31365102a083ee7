//! Prometheus encoding of collection snapshots.
//!
//! Every snapshot is rendered into a fresh [`Registry`]: the GC gauge set
//! changes from cycle to cycle, and a fresh registry guarantees that series of
//! exited JVMs never linger.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::collector::MetricSnapshot;
use crate::error::DeliveryError;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Name of the heap ceiling gauge.
pub const HEAP_METRIC: &str = "jvm_heap_size_bytes";

const BASE_LABELS: [&str; 3] = ["pid", "appname", "variant"];
const INSTANCE_LABEL: &str = "instance";

/// Builds a registry holding the snapshot's gauges.
///
/// `instance` adds an `instance` label to every series (push mode).
/// A JVM lacking a GC key present on another JVM reports 0.0 for it.
pub fn build_registry(
    snapshot: &MetricSnapshot,
    instance: Option<&str>,
) -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();

    let mut label_names: Vec<&str> = BASE_LABELS.to_vec();
    if instance.is_some() {
        label_names.push(INSTANCE_LABEL);
    }

    let heap = GaugeVec::new(Opts::new(HEAP_METRIC, "Max heap size in bytes."), &label_names)?;
    registry.register(Box::new(heap.clone()))?;

    let schema = snapshot.schema();
    let mut gc_gauges = Vec::with_capacity(schema.len());
    for descriptor in &schema.gauges {
        let gauge = GaugeVec::new(
            Opts::new(descriptor.name.as_str(), descriptor.help.as_str()),
            &label_names,
        )?;
        registry.register(Box::new(gauge.clone()))?;
        gc_gauges.push((descriptor, gauge));
    }

    for record in &snapshot.records {
        let pid = record.pid.to_string();
        let mut values: Vec<&str> = vec![
            pid.as_str(),
            record.identity.app_name.as_str(),
            record.identity.variant.as_str(),
        ];
        if let Some(instance) = instance {
            values.push(instance);
        }

        heap.with_label_values(values.as_slice())
            .set(record.heap.max_heap_bytes as f64);

        for (descriptor, gauge) in &gc_gauges {
            let value = record.gc.get(&descriptor.key).copied().unwrap_or(0.0);
            gauge.with_label_values(values.as_slice()).set(value);
        }
    }

    register_exporter_metrics(&registry, snapshot, instance)?;
    Ok(registry)
}

fn register_gauge(
    registry: &Registry,
    name: &str,
    help: &str,
    value: f64,
    instance: Option<&str>,
) -> Result<(), prometheus::Error> {
    let mut opts = Opts::new(name, help);
    if let Some(instance) = instance {
        opts = opts.const_label(INSTANCE_LABEL, instance);
    }
    let gauge = Gauge::with_opts(opts)?;
    gauge.set(value);
    registry.register(Box::new(gauge))
}

/// Exporter self-monitoring gauges.
fn register_exporter_metrics(
    registry: &Registry,
    snapshot: &MetricSnapshot,
    instance: Option<&str>,
) -> Result<(), prometheus::Error> {
    let gauges = [
        (
            "jvm_exporter_processes_total",
            "Number of JVM processes in the last collection cycle",
            snapshot.records.len() as f64,
        ),
        (
            "jvm_exporter_cycle_duration_seconds",
            "Time spent in the last collection cycle",
            snapshot.duration_seconds,
        ),
        (
            "jvm_exporter_discovery_success",
            "Whether JVM discovery succeeded (1) or failed (0) in the last cycle",
            if snapshot.discovery_ok { 1.0 } else { 0.0 },
        ),
        (
            "jvm_exporter_failed_extractions",
            "Attribute extractions that fell back to defaults in the last cycle",
            snapshot.failed_extractions as f64,
        ),
        (
            "jvm_exporter_cached_processes",
            "JVM processes with cached identity/heap attributes",
            snapshot.cached_processes as f64,
        ),
    ];

    for (name, help, value) in gauges {
        register_gauge(registry, name, help, value, instance)?;
    }
    Ok(())
}

/// Adds the push outcome counters to a registry about to be pushed.
///
/// The counts cover pushes before the one carrying them.
pub fn register_push_metrics(
    registry: &Registry,
    pushes_ok: u64,
    pushes_failed: u64,
    instance: Option<&str>,
) -> Result<(), prometheus::Error> {
    register_gauge(
        registry,
        "jvm_exporter_pushes_ok",
        "Pushes accepted by the gateway before this one",
        pushes_ok as f64,
        instance,
    )?;
    register_gauge(
        registry,
        "jvm_exporter_pushes_failed",
        "Pushes that failed before this one",
        pushes_failed as f64,
        instance,
    )
}

/// Encodes a registry in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> Result<String, DeliveryError> {
    let families = registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    TextEncoder::new().encode(&families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| DeliveryError::Encode(prometheus::Error::Msg(e.to_string())))
}

/// Convenience: snapshot straight to exposition text.
pub fn render(snapshot: &MetricSnapshot, instance: Option<&str>) -> Result<String, DeliveryError> {
    let registry = build_registry(snapshot, instance)?;
    encode_text(&registry)
}

/// Content type of [`encode_text`] output.
pub fn content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectedRecord;
    use crate::extract::{GcSnapshot, HeapAttributes, IdentityAttributes};
    use chrono::Utc;

    fn record(pid: u32, app: &str, variant: &str, heap: u64, gc: &[(&str, f64)]) -> CollectedRecord {
        CollectedRecord {
            pid,
            display_name: "Main".into(),
            identity: IdentityAttributes {
                app_name: app.into(),
                variant: variant.into(),
            },
            heap: HeapAttributes {
                max_heap_bytes: heap,
            },
            gc: gc
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<GcSnapshot>(),
        }
    }

    fn snapshot(records: Vec<CollectedRecord>) -> MetricSnapshot {
        let gc_keys = crate::schema::gc_key_union(&records);
        MetricSnapshot {
            records,
            gc_keys,
            discovery_ok: true,
            failed_extractions: 0,
            cached_processes: 0,
            duration_seconds: 0.01,
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_single_jvm() {
        let snap = snapshot(vec![record(
            101,
            "billing",
            "v3",
            2147483648,
            &[("s0c", 1024.0), ("oc", 8192.0)],
        )]);
        let text = render(&snap, None).unwrap();

        assert!(text.contains(
            r#"jvm_heap_size_bytes{appname="billing",pid="101",variant="v3"} 2147483648"#
        ));
        assert!(text.contains(r#"jvm_gc_s0c_bytes{appname="billing",pid="101",variant="v3"} 1024"#));
        assert!(text.contains(r#"jvm_gc_oc_bytes{appname="billing",pid="101",variant="v3"} 8192"#));
        assert!(text.contains("# HELP jvm_gc_oc_bytes GC metric for oc."));
        assert!(text.contains("# TYPE jvm_heap_size_bytes gauge"));
        assert!(text.contains("jvm_exporter_processes_total 1"));
    }

    #[test]
    fn test_missing_key_is_zero_not_omitted() {
        let snap = snapshot(vec![
            record(1, "a", "a1", 0, &[("s0c", 5.0)]),
            record(2, "b", "b1", 0, &[("s0c", 6.0), ("oc", 7.0)]),
        ]);
        let registry = build_registry(&snap, None).unwrap();
        let text = encode_text(&registry).unwrap();

        let oc_series = text
            .lines()
            .filter(|l| l.starts_with("jvm_gc_oc_bytes{"))
            .count();
        assert_eq!(oc_series, 2);
        assert!(text.contains(r#"jvm_gc_oc_bytes{appname="a",pid="1",variant="a1"} 0"#));
        assert!(text.contains(r#"jvm_gc_oc_bytes{appname="b",pid="2",variant="b1"} 7"#));
    }

    #[test]
    fn test_unknown_jvm_without_gc_keys() {
        let snap = snapshot(vec![record(202, "unknown", "unknown", 0, &[])]);
        let text = render(&snap, None).unwrap();
        assert!(text.contains(
            r#"jvm_heap_size_bytes{appname="unknown",pid="202",variant="unknown"} 0"#
        ));
        assert!(!text.contains("jvm_gc_"));
    }

    #[test]
    fn test_instance_label_in_push_encoding() {
        let snap = snapshot(vec![record(7, "svc", "blue", 10, &[("ec", 1.5)])]);
        let text = render(&snap, Some("host-1")).unwrap();
        assert!(text.contains(
            r#"jvm_gc_ec_bytes{appname="svc",instance="host-1",pid="7",variant="blue"} 1.5"#
        ));
        assert!(text.contains(r#"jvm_exporter_processes_total{instance="host-1"} 1"#));
        assert!(text.contains(r#"jvm_exporter_discovery_success{instance="host-1"} 1"#));
    }

    #[test]
    fn test_push_counters_carry_instance() {
        let snap = snapshot(Vec::new());
        let registry = build_registry(&snap, Some("host-1")).unwrap();
        register_push_metrics(&registry, 4, 2, Some("host-1")).unwrap();
        let text = encode_text(&registry).unwrap();

        assert!(text.contains(r#"jvm_exporter_pushes_ok{instance="host-1"} 4"#));
        assert!(text.contains(r#"jvm_exporter_pushes_failed{instance="host-1"} 2"#));
    }

    #[test]
    fn test_empty_snapshot_still_encodes_self_metrics() {
        let mut snap = snapshot(Vec::new());
        snap.discovery_ok = false;
        let text = render(&snap, None).unwrap();
        assert!(!text.contains(HEAP_METRIC));
        assert!(text.contains("jvm_exporter_discovery_success 0"));
        assert!(text.contains("jvm_exporter_processes_total 0"));
    }
}
