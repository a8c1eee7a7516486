//! Tick loop that drives a [`MonitorEngine`].
//!
//! The session owns the cadence and the stop conditions; the engine only
//! knows how to take one measurement. A stop request is honoured between
//! probes, never in the middle of one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::time::{Instant, MissedTickBehavior};

use crate::engine::MonitorEngine;
use crate::errors::CheckError;
use crate::probe::Probe;
use crate::snapshot::Snapshot;
use crate::tui::progress::{CheckPhase, ProgressCallback, ProgressEvent};

/// Default time between probes in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// When a session stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLimit {
    /// After this many probes.
    Count(u64),
    /// Once this much time has passed since the first probe.
    Duration(Duration),
    /// Only when the stop future completes.
    Unbounded,
}

/// A monitoring run: one engine, a probe interval and a stop condition.
pub struct MonitorSession<P> {
    engine: MonitorEngine<P>,
    interval: Duration,
    limit: SessionLimit,
    callback: Option<Arc<dyn ProgressCallback>>,
}

impl<P: Probe> MonitorSession<P> {
    /// # Errors
    /// Returns a configuration error for a zero interval.
    pub fn new(
        engine: MonitorEngine<P>,
        interval: Duration,
        limit: SessionLimit,
    ) -> Result<Self, CheckError> {
        if interval.is_zero() {
            return Err(CheckError::config("probe interval must be positive"));
        }

        Ok(Self { engine, interval, limit, callback: None })
    }

    /// Receive a [`ProgressEvent::Sample`] after every probe.
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn engine(&self) -> &MonitorEngine<P> {
        &self.engine
    }

    /// Probe once per interval until the limit is reached or `stop`
    /// completes, then return the final statistics.
    pub async fn run<F>(&mut self, stop: F) -> Snapshot
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        info!(
            "Starting monitor session for {} every {} ms ({:?})",
            self.engine.target(),
            self.interval.as_millis(),
            self.limit
        );
        self.emit(ProgressEvent::PhaseChange(CheckPhase::Monitoring));

        while !self.limit_reached(started) {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    info!("Stop requested, ending monitor session");
                    break;
                }
                _ = ticker.tick() => {}
            }
            // The tick may land after the deadline.
            if self.limit_reached(started) {
                break;
            }

            let success = self.engine.measure().await;
            let latency_ms =
                if success { self.engine.history().latest() } else { None };

            if self.callback.is_some() {
                self.emit(ProgressEvent::Sample {
                    sequence: self.engine.packets_sent(),
                    latency_ms,
                    snapshot: self.engine.snapshot(),
                });
            }
        }

        let snapshot = self.engine.snapshot();
        info!(
            "Monitor session complete: sent={}, received={}, loss={:.2}%",
            snapshot.packets_sent,
            snapshot.packets_received,
            snapshot.packet_loss_percent
        );
        self.emit(ProgressEvent::Finished(snapshot.clone()));

        snapshot
    }

    fn limit_reached(&self, started: Instant) -> bool {
        match self.limit {
            SessionLimit::Count(count) => self.engine.packets_sent() >= count,
            SessionLimit::Duration(duration) => started.elapsed() >= duration,
            SessionLimit::Unbounded => false,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.callback {
            debug!("progress: {:?}", event);
            callback.on_progress(event);
        }
    }
}
