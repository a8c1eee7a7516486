//! TUI state management.
//!
//! Holds everything needed to draw a frame: what is being probed, the ALG
//! verdict, the latest statistics and a short window of recent samples for
//! the sparkline.

use std::collections::VecDeque;

use super::progress::{CheckPhase, ProgressEvent};
use crate::alg::AlgReport;
use crate::probe::ProbeStrategy;
use crate::snapshot::Snapshot;

/// Number of recent probes kept for the sparkline.
pub const SPARKLINE_CAPACITY: usize = 120;

/// Error information for display.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Error message
    pub message: String,
    /// Optional suggestion for resolution
    pub suggestion: Option<String>,
}

/// State for the TUI display.
#[derive(Debug, Clone)]
pub struct TuiState {
    /// Current phase
    pub phase: CheckPhase,
    /// Probe destination
    pub target: Option<String>,
    /// Active probe strategy
    pub strategy: Option<ProbeStrategy>,
    /// ALG heuristic result, once known
    pub alg: Option<AlgReport>,
    /// Statistics after the most recent probe
    pub snapshot: Option<Snapshot>,
    /// Most recent probe outcomes, oldest first; `None` is a lost probe
    pub recent: VecDeque<Option<f64>>,
    /// Sequence number of the most recent probe
    pub last_sequence: u64,
    /// Error message if any
    pub error: Option<ErrorInfo>,
    /// Terminal width for layout
    pub terminal_width: u16,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            phase: CheckPhase::Initializing,
            target: None,
            strategy: None,
            alg: None,
            snapshot: None,
            recent: VecDeque::with_capacity(SPARKLINE_CAPACITY),
            last_sequence: 0,
            error: None,
            terminal_width: 80,
        }
    }
}

impl TuiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an error state with optional suggestion.
    ///
    /// Statistics collected before the error are kept.
    pub fn set_error(&mut self, message: String, suggestion: Option<String>) {
        self.error = Some(ErrorInfo { message, suggestion });
    }

    /// Latencies for the sparkline, lost probes drawn as zero.
    pub fn sparkline_data(&self) -> Vec<u64> {
        self.recent
            .iter()
            .map(|sample| sample.map(|ms| ms.round().max(0.0) as u64).unwrap_or(0))
            .collect()
    }

    /// Latency of the most recent probe, if it was answered.
    pub fn last_latency(&self) -> Option<f64> {
        self.recent.back().copied().flatten()
    }

    /// Update state from a progress event.
    pub fn update_from_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PhaseChange(phase) => {
                self.phase = *phase;
            }
            ProgressEvent::MonitorStarted { target, strategy } => {
                self.target = Some(target.clone());
                self.strategy = Some(*strategy);
            }
            ProgressEvent::AlgResult(report) => {
                self.alg = Some(report.clone());
            }
            ProgressEvent::Sample { sequence, latency_ms, snapshot } => {
                if self.recent.len() == SPARKLINE_CAPACITY {
                    self.recent.pop_front();
                }
                self.recent.push_back(*latency_ms);
                self.last_sequence = *sequence;
                self.snapshot = Some(snapshot.clone());
            }
            ProgressEvent::Finished(snapshot) => {
                self.snapshot = Some(snapshot.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::{AlgEvidence, AlgVerdict};
    use crate::snapshot::LatencyAggregates;
    use proptest::prelude::*;

    fn snapshot(sent: u64) -> Snapshot {
        Snapshot::new(
            "192.0.2.1",
            sent,
            sent,
            0.0,
            LatencyAggregates { avg_ms: 10.0, min_ms: 10.0, max_ms: 10.0 },
            0.0,
        )
    }

    fn sample(sequence: u64, latency_ms: Option<f64>) -> ProgressEvent {
        ProgressEvent::Sample { sequence, latency_ms, snapshot: snapshot(sequence) }
    }

    #[test]
    fn test_default_state() {
        let state = TuiState::new();
        assert_eq!(state.phase, CheckPhase::Initializing);
        assert!(state.snapshot.is_none());
        assert!(state.recent.is_empty());
        assert_eq!(state.terminal_width, 80);
    }

    #[test]
    fn test_update_from_phase_change() {
        let mut state = TuiState::new();
        state.update_from_event(&ProgressEvent::PhaseChange(CheckPhase::AlgCheck));
        assert_eq!(state.phase, CheckPhase::AlgCheck);
    }

    #[test]
    fn test_update_from_monitor_started() {
        let mut state = TuiState::new();
        state.update_from_event(&ProgressEvent::MonitorStarted {
            target: "sip.example.net".to_string(),
            strategy: ProbeStrategy::TcpConnect,
        });

        assert_eq!(state.target.as_deref(), Some("sip.example.net"));
        assert_eq!(state.strategy, Some(ProbeStrategy::TcpConnect));
    }

    #[test]
    fn test_update_from_alg_result() {
        let mut state = TuiState::new();
        let report = AlgReport::from_evidence(&AlgEvidence {
            local_ip: None,
            behind_nat: false,
            sip_port_bind_failed: false,
        });

        state.update_from_event(&ProgressEvent::AlgResult(report));

        assert_eq!(state.alg.map(|alg| alg.verdict), Some(AlgVerdict::Unlikely));
    }

    #[test]
    fn test_update_from_samples() {
        let mut state = TuiState::new();
        state.update_from_event(&sample(1, Some(12.4)));
        state.update_from_event(&sample(2, None));

        assert_eq!(state.last_sequence, 2);
        assert_eq!(state.last_latency(), None);
        assert_eq!(state.sparkline_data(), vec![12, 0]);
        assert_eq!(state.snapshot.map(|s| s.packets_sent), Some(2));
    }

    #[test]
    fn test_update_from_error_keeps_statistics() {
        let mut state = TuiState::new();
        state.update_from_event(&sample(1, Some(5.0)));
        state.set_error("socket closed".to_string(), None);

        assert_eq!(state.error.as_ref().map(|e| e.message.as_str()), Some("socket closed"));
        assert!(state.snapshot.is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: the sparkline window never exceeds its capacity and
        /// always ends with the newest sample.
        #[test]
        fn sparkline_window_is_bounded(
            samples in prop::collection::vec(prop::option::of(0.0f64..500.0), 0..300)
        ) {
            let mut state = TuiState::new();
            for (i, latency) in samples.iter().enumerate() {
                state.update_from_event(&sample(i as u64 + 1, *latency));
            }

            prop_assert!(state.recent.len() <= SPARKLINE_CAPACITY);
            prop_assert_eq!(state.recent.len(), samples.len().min(SPARKLINE_CAPACITY));
            if let Some(last) = samples.last() {
                prop_assert_eq!(state.recent.back().copied().flatten(), *last);
            }
        }
    }
}
