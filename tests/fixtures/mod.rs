//! Test fixtures: entry builders and recording collaborators

use arena_matchmaker::matchmaker::entry::TicketEntry;
use arena_matchmaker::store::MetricsSink;
use arena_matchmaker::types::EntryPresence;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Builder for ticket entries with sensible arena defaults
pub struct EntryBuilder {
    ticket: String,
    user_id: String,
    properties: HashMap<String, Value>,
}

impl EntryBuilder {
    pub fn new(ticket: &str, user_id: &str) -> Self {
        let mut properties = HashMap::new();
        properties.insert("group_id".to_string(), json!("guild-1"));
        properties.insert("game_mode".to_string(), json!("arena_public"));
        properties.insert("rtt_us_east".to_string(), json!(40.0));
        Self {
            ticket: ticket.to_string(),
            user_id: user_id.to_string(),
            properties,
        }
    }

    pub fn mode(mut self, mode: &str) -> Self {
        self.properties
            .insert("game_mode".to_string(), json!(mode));
        self
    }

    pub fn prop(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn without_prop(mut self, key: &str) -> Self {
        self.properties.remove(key);
        self
    }

    pub fn rating(self, mu: f64, sigma: f64) -> Self {
        self.prop("rating_mu", json!(mu))
            .prop("rating_sigma", json!(sigma))
    }

    pub fn build(self) -> TicketEntry {
        TicketEntry {
            presence: EntryPresence {
                user_id: self.user_id.clone(),
                session_id: format!("session-{}", self.user_id),
                username: self.user_id,
            },
            ticket: self.ticket,
            properties: self.properties,
        }
    }
}

/// Shorthand for a solo arena entry reachable on the default server
pub fn entry(ticket: &str, user_id: &str) -> TicketEntry {
    EntryBuilder::new(ticket, user_id).build()
}

/// Metrics sink that records every call for assertions
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub gauges: Mutex<Vec<(String, f64)>>,
    pub timers: Mutex<Vec<(String, Duration)>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge_values(&self, name: &str) -> Vec<f64> {
        self.gauges
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn timer_count(&self, name: &str) -> usize {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }
}

impl MetricsSink for RecordingMetrics {
    fn gauge_set(&self, name: &str, value: f64) {
        self.gauges.lock().unwrap().push((name.to_string(), value));
    }

    fn timer_record(&self, name: &str, duration: Duration) {
        self.timers
            .lock()
            .unwrap()
            .push((name.to_string(), duration));
    }
}
