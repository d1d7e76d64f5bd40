//! Metrics for the matchmaking engine
//!
//! A Prometheus-backed implementation of the `MetricsSink` collaborator
//! surface. Deployments that scrape elsewhere can substitute their own sink.

pub mod collector;

pub use collector::MetricsCollector;
