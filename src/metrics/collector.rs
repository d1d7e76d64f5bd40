//! Prometheus metrics collection

use crate::store::MetricsSink;
use anyhow::Result;
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus-backed metrics sink
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    gauges: GaugeVec,
    timers: HistogramVec,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauges = GaugeVec::new(
            Opts::new("matchmaker_gauge", "Matchmaker gauge values"),
            &["name"],
        )?;
        registry.register(Box::new(gauges.clone()))?;

        let timers = HistogramVec::new(
            HistogramOpts::new(
                "matchmaker_timer_seconds",
                "Matchmaker operation durations in seconds",
            )
            .buckets(vec![
                0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
                0.25, 0.5, 1.0,
            ]),
            &["name"],
        )?;
        registry.register(Box::new(timers.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            gauges,
            timers,
        })
    }

    /// Registry handle for the scrape endpoint
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl MetricsSink for MetricsCollector {
    fn gauge_set(&self, name: &str, value: f64) {
        self.gauges.with_label_values(&[name]).set(value);
    }

    fn timer_record(&self, name: &str, duration: Duration) {
        self.timers
            .with_label_values(&[name])
            .observe(duration.as_secs_f64());
    }
}
