//! Point-in-time view of a measurement engine.
//!
//! A [`Snapshot`] is a plain value: it owns copies of every field and never
//! refers back to the engine that produced it, so it can be handed to
//! printers, the TUI, or the JSON report freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::round2;

/// Average, minimum and maximum latency over the retained samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyAggregates {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Network quality statistics at one instant.
///
/// Floating point fields are rounded to two decimal places and are `0.0`
/// when no samples are retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Probe destination as given by the user
    pub target: String,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packet_loss_percent: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub jitter_ms: f64,
}

impl Snapshot {
    /// Assemble a snapshot from raw engine figures, rounding for reporting.
    pub fn new(
        target: impl Into<String>,
        packets_sent: u64,
        packets_received: u64,
        loss_percent: f64,
        latency: LatencyAggregates,
        jitter_ms: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            target: target.into(),
            packets_sent,
            packets_received,
            packet_loss_percent: round2(loss_percent),
            avg_latency_ms: round2(latency.avg_ms),
            min_latency_ms: round2(latency.min_ms),
            max_latency_ms: round2(latency.max_ms),
            jitter_ms: round2(jitter_ms),
        }
    }

    pub fn packets_lost(&self) -> u64 {
        self.packets_sent.saturating_sub(self.packets_received)
    }

    /// Whether any probe has succeeded.
    pub fn has_samples(&self) -> bool {
        self.packets_received > 0
    }

    /// Compare every field except the timestamp.
    pub fn same_measurements(&self, other: &Snapshot) -> bool {
        self.target == other.target
            && self.packets_sent == other.packets_sent
            && self.packets_received == other.packets_received
            && self.packet_loss_percent == other.packet_loss_percent
            && self.avg_latency_ms == other.avg_latency_ms
            && self.min_latency_ms == other.min_latency_ms
            && self.max_latency_ms == other.max_latency_ms
            && self.jitter_ms == other.jitter_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        Snapshot::new(
            "8.8.8.8",
            3,
            2,
            100.0 / 3.0,
            LatencyAggregates { avg_ms: 15.456, min_ms: 10.0, max_ms: 20.912 },
            10.912,
        )
    }

    #[test]
    fn test_new_rounds_for_reporting() {
        let snapshot = sample_snapshot();

        assert_eq!(snapshot.target, "8.8.8.8");
        assert_eq!(snapshot.packet_loss_percent, 33.33);
        assert_eq!(snapshot.avg_latency_ms, 15.46);
        assert_eq!(snapshot.min_latency_ms, 10.0);
        assert_eq!(snapshot.max_latency_ms, 20.91);
        assert_eq!(snapshot.jitter_ms, 10.91);
        assert_eq!(snapshot.packets_lost(), 1);
        assert!(snapshot.has_samples());
    }

    #[test]
    fn test_serializes_expected_fields() {
        let json = serde_json::to_value(sample_snapshot()).unwrap();

        for field in [
            "timestamp",
            "target",
            "packets_sent",
            "packets_received",
            "packet_loss_percent",
            "avg_latency_ms",
            "min_latency_ms",
            "max_latency_ms",
            "jitter_ms",
        ] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }

        // ISO-8601 / RFC 3339 timestamp
        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_same_measurements_ignores_timestamp() {
        let a = sample_snapshot();
        let mut b = a.clone();
        b.timestamp = a.timestamp + chrono::Duration::seconds(5);
        assert!(a.same_measurements(&b));

        b.packets_sent += 1;
        assert!(!a.same_measurements(&b));
    }
}
