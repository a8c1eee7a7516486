//! Reachability probes.
//!
//! A probe performs exactly one round-trip measurement against a target and
//! reports either the elapsed time in milliseconds or a [`ProbeFailure`].
//! Failures are ordinary outcomes (timeouts, refused connections, unknown
//! hosts) and callers are expected to count them rather than abort.

use std::error::Error;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use hickory_resolver::TokioAsyncResolver;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::errors::CheckError;

pub mod icmp;
pub mod tcp;

/// Default TCP port used by the connect strategy.
pub const DEFAULT_TCP_PORT: u16 = 53;

/// Maximum length of a DNS name.
const MAX_HOSTNAME_LEN: usize = 253;

/// A validated probe destination.
///
/// Holds the host exactly as the user gave it, plus the parsed address when
/// the host is an IP literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    ip: Option<IpAddr>,
}

impl Target {
    /// Validate a host name or IP literal.
    ///
    /// IPv6 literals may be wrapped in brackets.
    ///
    /// # Errors
    /// Returns a configuration error for an empty or malformed target.
    pub fn parse(input: &str) -> Result<Self, CheckError> {
        let host = input.trim();

        if host.is_empty() {
            return Err(CheckError::config("target must not be empty"));
        }

        if let Some(inner) =
            host.strip_prefix('[').and_then(|h| h.strip_suffix(']'))
        {
            return match inner.parse::<IpAddr>() {
                Ok(ip @ IpAddr::V6(_)) => {
                    Ok(Self { host: inner.to_string(), ip: Some(ip) })
                }
                _ => Err(CheckError::config(format!(
                    "target '{}': only IPv6 addresses may be written in brackets",
                    host
                ))),
            };
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self { host: host.to_string(), ip: Some(ip) });
        }

        if !is_valid_hostname(host) {
            return Err(CheckError::config(format!(
                "target '{}' is neither an IP address nor a valid host name",
                host
            )));
        }

        Ok(Self { host: host.to_string(), ip: None })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The address when the target was given as an IP literal.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);

    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

/// Why a single probe did not produce a latency sample.
#[derive(Debug)]
pub enum ProbeFailure {
    /// No reply before the deadline.
    Timeout(Duration),
    /// The target host name could not be resolved.
    Resolve(String),
    /// Socket-level failure (refused, unreachable, permission).
    Io(io::Error),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout(timeout) => {
                write!(f, "no reply within {} ms", timeout.as_millis())
            }
            ProbeFailure::Resolve(msg) => {
                write!(f, "failed to resolve target: {}", msg)
            }
            ProbeFailure::Io(e) => write!(f, "{}", e),
        }
    }
}

impl Error for ProbeFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeFailure::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeFailure {
    fn from(e: io::Error) -> Self {
        ProbeFailure::Io(e)
    }
}

/// A single round-trip measurement capability.
#[allow(async_fn_in_trait)]
pub trait Probe {
    /// Measure one round trip to `target`, giving up after `timeout`.
    ///
    /// Returns the elapsed time in milliseconds.
    async fn probe(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<f64, ProbeFailure>;
}

impl<T: Probe> Probe for &T {
    async fn probe(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<f64, ProbeFailure> {
        (**self).probe(target, timeout).await
    }
}

/// How reachability is measured on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStrategy {
    /// ICMP echo request / echo reply.
    Icmp,
    /// TCP three-way handshake time.
    TcpConnect,
}

serde_plain::derive_display_from_serialize!(ProbeStrategy);

impl ProbeStrategy {
    /// Pick the best strategy this process is allowed to use.
    ///
    /// ICMP needs either an unprivileged ping socket or a raw socket; when
    /// neither can be opened the TCP connect strategy is used instead.
    pub fn detect() -> Self {
        if icmp::icmp_available() {
            debug!("ICMP sockets available, using echo probes");
            ProbeStrategy::Icmp
        } else {
            debug!("ICMP sockets unavailable, falling back to TCP connect probes");
            ProbeStrategy::TcpConnect
        }
    }
}

/// Probe that talks to the real network using the selected strategy.
pub struct NetworkProbe {
    strategy: ProbeStrategy,
    tcp_port: u16,
    resolver: TokioAsyncResolver,
    sequence: AtomicU16,
}

impl NetworkProbe {
    /// Create a probe using `strategy`. `tcp_port` is only used by the
    /// TCP connect strategy.
    ///
    /// # Errors
    /// Fails when the system resolver configuration cannot be loaded.
    pub fn new(
        strategy: ProbeStrategy,
        tcp_port: u16,
    ) -> Result<Self, CheckError> {
        if tcp_port == 0 && strategy == ProbeStrategy::TcpConnect {
            return Err(CheckError::config("TCP probe port must be non-zero"));
        }

        let resolver =
            TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
                CheckError::dns(format!(
                    "failed to load system resolver configuration: {}",
                    e
                ))
                .with_source(e)
            })?;

        Ok(Self { strategy, tcp_port, resolver, sequence: AtomicU16::new(0) })
    }

    pub fn strategy(&self) -> ProbeStrategy {
        self.strategy
    }

    /// Resolve the target, preferring IPv4 addresses.
    async fn resolve(&self, target: &Target) -> Result<IpAddr, ProbeFailure> {
        if let Some(ip) = target.ip() {
            return Ok(ip);
        }

        let response = self
            .resolver
            .lookup_ip(target.host())
            .await
            .map_err(|e| ProbeFailure::Resolve(e.to_string()))?;

        let mut fallback = None;
        for ip in response.iter() {
            if ip.is_ipv4() {
                return Ok(ip);
            }
            fallback.get_or_insert(ip);
        }

        fallback.ok_or_else(|| {
            ProbeFailure::Resolve(format!("no addresses for {}", target))
        })
    }
}

impl Probe for NetworkProbe {
    async fn probe(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<f64, ProbeFailure> {
        let started = Instant::now();
        let ip = tokio::time::timeout(timeout, self.resolve(target))
            .await
            .map_err(|_| ProbeFailure::Timeout(timeout))??;
        trace!("{} resolved to {}", target, ip);

        // Resolution counts against the probe's time budget.
        let timeout = timeout.saturating_sub(started.elapsed());
        if timeout.is_zero() {
            return Err(ProbeFailure::Timeout(started.elapsed()));
        }

        match self.strategy {
            ProbeStrategy::Icmp => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                icmp::echo(ip, sequence, timeout).await
            }
            ProbeStrategy::TcpConnect => {
                tcp::connect_latency(SocketAddr::new(ip, self.tcp_port), timeout)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_target_parse_ipv4() {
        let target = Target::parse("8.8.8.8").unwrap();
        assert_eq!(target.host(), "8.8.8.8");
        assert_eq!(target.ip(), Some("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_target_parse_bracketed_ipv6() {
        let target = Target::parse("[2001:db8::1]").unwrap();
        assert_eq!(target.host(), "2001:db8::1");
        assert!(target.ip().unwrap().is_ipv6());
    }

    #[test]
    fn test_target_parse_rejects_bracketed_ipv4() {
        let err = Target::parse("[8.8.8.8]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(Target::parse("[sip.example.net]").is_err());
    }

    #[test]
    fn test_target_parse_hostname() {
        let target = Target::parse("  sip.example.com ").unwrap();
        assert_eq!(target.host(), "sip.example.com");
        assert_eq!(target.ip(), None);
        assert_eq!(target.to_string(), "sip.example.com");
    }

    #[test]
    fn test_target_parse_rejects_empty() {
        let err = Target::parse("   ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_target_parse_rejects_garbage() {
        assert!(Target::parse("not a host").is_err());
        assert!(Target::parse("-bad.example.com").is_err());
        assert!(Target::parse("a..b").is_err());
        assert!(Target::parse(&"a".repeat(300)).is_err());
    }

    #[test]
    fn test_probe_strategy_display() {
        assert_eq!(ProbeStrategy::Icmp.to_string(), "icmp");
        assert_eq!(ProbeStrategy::TcpConnect.to_string(), "tcp-connect");
    }

    #[test]
    fn test_probe_failure_display() {
        let failure = ProbeFailure::Timeout(Duration::from_millis(2000));
        assert_eq!(failure.to_string(), "no reply within 2000 ms");

        let failure = ProbeFailure::Resolve("NXDOMAIN".to_string());
        assert!(failure.to_string().contains("NXDOMAIN"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let failure: ProbeFailure =
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(failure, ProbeFailure::Io(_)));
        assert!(failure.source().is_some());
    }
}
