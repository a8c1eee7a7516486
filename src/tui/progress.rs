//! Progress event types and callback interface.
//!
//! Defines the events emitted while a check runs and the callback trait
//! the display layer implements to receive them.

use crate::alg::AlgReport;
use crate::probe::ProbeStrategy;
use crate::snapshot::Snapshot;

/// Phases of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    /// Parsing configuration, choosing a probe strategy
    Initializing,
    /// Gathering SIP ALG evidence
    AlgCheck,
    /// Probing the target
    Monitoring,
    /// Everything finished
    Complete,
}

/// Progress events emitted during a check.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Phase has changed
    PhaseChange(CheckPhase),
    /// Monitoring is about to start
    MonitorStarted {
        /// Probe destination
        target: String,
        /// Active probe strategy
        strategy: ProbeStrategy,
    },
    /// ALG heuristic finished
    AlgResult(AlgReport),
    /// One probe completed
    Sample {
        /// Probe number (1-indexed)
        sequence: u64,
        /// Latency of this probe, `None` when it was lost
        latency_ms: Option<f64>,
        /// Statistics after this probe
        snapshot: Snapshot,
    },
    /// Monitoring finished with final statistics
    Finished(Snapshot),
}

/// Callback interface for progress updates.
///
/// Implementations must be non-blocking so they do not skew probe timing.
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);
}
