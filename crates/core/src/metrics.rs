//! Process-wide counters and gauges, with a Prometheus text exporter.
//!
//! The collector is plain atomics so the hot paths never lock; the exporter
//! renders on scrape.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Metrics collector shared by every pipeline component.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    spool_files_on_disk: AtomicU64,
    bytes_sent: DashMap<String, AtomicU64>,
    send_duration_ms: DashMap<String, AtomicU64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gauge: files currently waiting in the spool directory.
    pub fn set_spool_files_on_disk(&self, count: u64) {
        self.spool_files_on_disk.store(count, Ordering::Relaxed);
    }

    pub fn spool_files_on_disk(&self) -> u64 {
        self.spool_files_on_disk.load(Ordering::Relaxed)
    }

    /// Counter: payload bytes delivered to a target.
    pub fn record_bytes_sent(&self, target: &str, bytes: u64) {
        self.bytes_sent
            .entry(target.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self, target: &str) -> u64 {
        self.bytes_sent
            .get(target)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Counter: cumulative flush duration per target, in milliseconds.
    pub fn record_send_duration(&self, target: &str, millis: u64) {
        self.send_duration_ms
            .entry(target.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(millis, Ordering::Relaxed);
    }

    pub fn send_duration_ms(&self, target: &str) -> u64 {
        self.send_duration_ms
            .get(target)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Renders a [`MetricsCollector`] in Prometheus text format.
pub struct PrometheusExporter {
    collector: Arc<MetricsCollector>,
    namespace: String,
}

impl PrometheusExporter {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            namespace: "nagflux".to_string(),
        }
    }

    pub fn with_namespace(collector: Arc<MetricsCollector>, namespace: impl Into<String>) -> Self {
        Self {
            collector,
            namespace: namespace.into(),
        }
    }

    /// Export all metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let mut output = String::new();

        self.write_gauge(
            &mut output,
            "spool_files_on_disk",
            "Number of files waiting in the spool directory",
            self.collector.spool_files_on_disk() as f64,
        );

        self.write_labelled(
            &mut output,
            "bytes_sent_total",
            "Total payload bytes sent per target",
            "counter",
            &self.collector.bytes_sent,
        );

        self.write_labelled(
            &mut output,
            "send_duration_ms_total",
            "Cumulative flush duration per target in milliseconds",
            "counter",
            &self.collector.send_duration_ms,
        );

        output
    }

    fn write_gauge(&self, output: &mut String, name: &str, help: &str, value: f64) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} gauge\n", full_name));
        output.push_str(&format!("{} {}\n", full_name, value));
    }

    fn write_labelled(
        &self,
        output: &mut String,
        name: &str,
        help: &str,
        kind: &str,
        values: &DashMap<String, AtomicU64>,
    ) {
        let full_name = format!("{}_{}", self.namespace, name);
        output.push_str(&format!("# HELP {} {}\n", full_name, help));
        output.push_str(&format!("# TYPE {} {}\n", full_name, kind));
        for entry in values.iter() {
            output.push_str(&format!(
                "{}{{target=\"{}\"}} {}\n",
                full_name,
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            ));
        }
    }
}
