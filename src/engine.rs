//! The measurement engine.
//!
//! [`MonitorEngine`] issues one probe per [`MonitorEngine::measure`] call,
//! keeps the sent/lost counters, and retains the most recent successful
//! latencies in a [`HistoryBuffer`]. Statistics are derived on demand from
//! that state; nothing is cached.

use std::time::Duration;

use log::{debug, info};

use crate::errors::{to_check_error, CheckError};
use crate::history::HistoryBuffer;
use crate::probe::icmp::check_icmp_socket;
use crate::probe::{NetworkProbe, Probe, ProbeStrategy, Target, DEFAULT_TCP_PORT};
use crate::snapshot::{LatencyAggregates, Snapshot};
use crate::stats::{jitter_f64, loss_percent, mean_f64, min_max_f64};

/// Configuration for a monitoring session.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Host name or IP address to probe.
    pub target: String,
    /// Number of successful samples retained for statistics.
    /// Default: 30
    pub sample_size: usize,
    /// How long a single probe may wait for a reply.
    /// Default: 2s
    pub probe_timeout: Duration,
    /// Probe strategy; `None` picks the best available at construction.
    pub strategy: Option<ProbeStrategy>,
    /// Port for the TCP connect strategy.
    /// Default: 53
    pub tcp_port: u16,
}

impl MonitorConfig {
    pub const DEFAULT_TARGET: &'static str = "8.8.8.8";

    pub const DEFAULT_SAMPLE_SIZE: usize = 30;

    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            sample_size: Self::DEFAULT_SAMPLE_SIZE,
            probe_timeout: Duration::from_millis(Self::DEFAULT_PROBE_TIMEOUT_MS),
            strategy: None,
            tcp_port: DEFAULT_TCP_PORT,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn with_strategy(mut self, strategy: ProbeStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_tcp_port(mut self, tcp_port: u16) -> Self {
        self.tcp_port = tcp_port;
        self
    }

    /// Check every parameter and return the parsed target.
    pub fn validate(&self) -> Result<Target, CheckError> {
        if self.sample_size == 0 {
            return Err(CheckError::config("sample size must be at least 1"));
        }

        if self.probe_timeout.is_zero() {
            return Err(CheckError::config("probe timeout must be positive"));
        }

        Target::parse(&self.target)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TARGET)
    }
}

/// Repeated reachability measurement against a single target.
///
/// The engine is driven by its caller: each [`measure`](Self::measure) call
/// is exactly one probe with no retries. Ordinary network failures only
/// show up in the statistics.
///
/// # Example
/// ```no_run
/// use sip_alg_check::engine::{MonitorConfig, MonitorEngine};
///
/// #[tokio::main]
/// async fn main() {
///     let mut engine =
///         MonitorEngine::connect(MonitorConfig::new("8.8.8.8")).unwrap();
///     for _ in 0..5 {
///         engine.measure().await;
///     }
///     println!("{:?}", engine.snapshot());
/// }
/// ```
pub struct MonitorEngine<P = NetworkProbe> {
    config: MonitorConfig,
    target: Target,
    probe: P,
    packets_sent: u64,
    packet_loss_count: u64,
    history: HistoryBuffer,
}

impl MonitorEngine<NetworkProbe> {
    /// Create an engine that probes the real network.
    ///
    /// When no strategy is configured, [`ProbeStrategy::detect`] chooses
    /// one; the choice is available afterwards via `probe().strategy()`.
    ///
    /// # Errors
    /// Configuration errors, a socket error (classified by cause, usually
    /// permission) when ICMP was requested but cannot be used, or a resolver
    /// setup error.
    pub fn connect(config: MonitorConfig) -> Result<Self, CheckError> {
        config.validate()?;

        let strategy = match config.strategy {
            Some(ProbeStrategy::Icmp) => {
                check_icmp_socket().map_err(|e| {
                    to_check_error(
                        Box::new(e),
                        "ICMP probes were requested but no ICMP socket can be opened",
                    )
                })?;
                ProbeStrategy::Icmp
            }
            Some(strategy) => strategy,
            None => ProbeStrategy::detect(),
        };

        let probe = NetworkProbe::new(strategy, config.tcp_port)?;
        info!(
            "Monitoring {} with {} probes (timeout {} ms, {} samples)",
            config.target,
            strategy,
            config.probe_timeout.as_millis(),
            config.sample_size
        );

        Self::new(config, probe)
    }
}

impl<P: Probe> MonitorEngine<P> {
    /// Create an engine around any probe implementation.
    ///
    /// # Errors
    /// Returns a configuration error for an empty or malformed target, a
    /// zero sample size, or a zero timeout.
    pub fn new(config: MonitorConfig, probe: P) -> Result<Self, CheckError> {
        let target = config.validate()?;
        let history = HistoryBuffer::new(config.sample_size)?;

        Ok(Self {
            config,
            target,
            probe,
            packets_sent: 0,
            packet_loss_count: 0,
            history,
        })
    }

    /// Run one probe and record its outcome.
    ///
    /// Returns `true` when a latency sample was recorded. Waits at most the
    /// configured probe timeout.
    pub async fn measure(&mut self) -> bool {
        self.packets_sent += 1;

        match self.probe.probe(&self.target, self.config.probe_timeout).await {
            Ok(latency_ms) => {
                let latency_ms = latency_ms.max(0.0);
                self.history.push(latency_ms);
                debug!(
                    "probe #{} to {}: {:.2} ms",
                    self.packets_sent, self.target, latency_ms
                );
                true
            }
            Err(failure) => {
                self.packet_loss_count += 1;
                debug!(
                    "probe #{} to {} failed: {}",
                    self.packets_sent, self.target, failure
                );
                false
            }
        }
    }

    /// Lost probes as a percentage of sent probes, at full precision.
    pub fn loss_percent(&self) -> f64 {
        loss_percent(self.packets_sent, self.packet_loss_count)
    }

    /// Mean absolute difference between consecutive retained samples.
    pub fn jitter(&self) -> f64 {
        jitter_f64(self.history.iter())
    }

    /// Average, minimum and maximum over the retained samples; all zero
    /// when nothing is retained.
    pub fn latency_aggregates(&self) -> LatencyAggregates {
        let avg_ms = mean_f64(self.history.iter()).unwrap_or(0.0);
        let (min_ms, max_ms) =
            min_max_f64(self.history.iter()).unwrap_or((0.0, 0.0));

        LatencyAggregates { avg_ms, min_ms, max_ms }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.target.host(),
            self.packets_sent,
            self.packets_received(),
            self.loss_percent(),
            self.latency_aggregates(),
            self.jitter(),
        )
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn packet_loss_count(&self) -> u64 {
        self.packet_loss_count
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_sent - self.packet_loss_count
    }
}
