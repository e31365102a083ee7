//! Running statistics rendered by the `/health` endpoint.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min)
    fn snapshot(&self) -> (f64, f64, f64, f64) {
        match self.inner.lock() {
            Ok(s) => (s.last, s.avg(), s.max, s.min),
            Err(_) => (0.0, 0.0, 0.0, 0.0),
        }
    }
}

/// Exporter-internal counters since startup.
pub struct HealthStats {
    started: Instant,
    jvm_processes: Stat,
    cycle_duration_seconds: Stat,
    failed_extractions: Stat,
    total_cycles: AtomicU64,
    pushes_ok: AtomicU64,
    pushes_failed: AtomicU64,
    http_requests: AtomicU64,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            jvm_processes: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            failed_extractions: Stat::default(),
            total_cycles: AtomicU64::new(0),
            pushes_ok: AtomicU64::new(0),
            pushes_failed: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle(&self, processes: usize, duration_seconds: f64, failed_extractions: usize) {
        self.jvm_processes.add_sample(processes as f64);
        self.cycle_duration_seconds.add_sample(duration_seconds);
        self.failed_extractions.add_sample(failed_extractions as f64);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push(&self, ok: bool) {
        let counter = if ok {
            &self.pushes_ok
        } else {
            &self.pushes_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pushes_ok(&self) -> u64 {
        self.pushes_ok.load(Ordering::Relaxed)
    }

    pub fn pushes_failed(&self) -> u64 {
        self.pushes_failed.load(Ordering::Relaxed)
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        let rows = [
            ("jvm processes", &self.jvm_processes, 0usize),
            ("cycle duration (s)", &self.cycle_duration_seconds, 3),
            ("failed extractions", &self.failed_extractions, 0),
        ];
        for (label, stat, precision) in rows {
            let (cur, avg, max, min) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.*}", precision, cur),
                format!("{:.*}", precision.max(1), avg),
                format!("{:.*}", precision, max),
                format!("{:.*}", precision, min),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "number of done cycles: {}", self.total_cycles()).ok();
        writeln!(
            out,
            "http requests: {}",
            self.http_requests.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(out, "uptime (s): {}", self.uptime_seconds()).ok();

        out
    }
}
