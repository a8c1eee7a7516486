//! SIP ALG heuristic.
//!
//! There is no reliable way to detect a SIP Application-Level Gateway
//! without a cooperating SIP server on the far side. This module gathers two
//! cheap pieces of local evidence and maps them onto a three-level verdict:
//!
//! - whether this host sits behind NAT (private local address), since
//!   ALGs live on NAT gateways;
//! - whether the SIP port cannot be bound locally, which happens on some
//!   gateways and softphone setups that hold the port.
//!
//! The verdict is a hint, never proof.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

/// Default SIP signalling port.
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Configuration for the ALG heuristic.
#[derive(Debug, Clone)]
pub struct AlgCheckConfig {
    /// Local address override; skips interface discovery.
    pub local_ip: Option<IpAddr>,
    /// Port whose availability is checked.
    /// Default: 5060
    pub sip_port: u16,
    /// Public address used to discover the outbound interface. No packets
    /// are sent to it.
    pub discovery_addr: SocketAddr,
}

impl Default for AlgCheckConfig {
    fn default() -> Self {
        Self {
            local_ip: None,
            sip_port: DEFAULT_SIP_PORT,
            discovery_addr: SocketAddr::from(([8, 8, 8, 8], 80)),
        }
    }
}

/// How likely it is that an ALG rewrites SIP traffic on this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlgVerdict {
    Unlikely,
    Possible,
    Likely,
}

serde_plain::derive_display_from_serialize!(AlgVerdict);

impl AlgVerdict {
    /// Advice shown next to the verdict.
    pub fn recommendation(&self) -> &'static str {
        match self {
            AlgVerdict::Unlikely => {
                "No sign of SIP ALG. If calls still drop or have one-way \
                 audio, check the provider's NAT keep-alive settings."
            }
            AlgVerdict::Possible => {
                "SIP ALG may be active on your router. If you see one-way \
                 audio, failed registrations or calls dropping after ~30s, \
                 look for a 'SIP ALG' or 'SIP helper' option in the router's \
                 firewall/NAT settings and disable it."
            }
            AlgVerdict::Likely => {
                "SIP ALG is likely interfering. Disable 'SIP ALG' / 'SIP \
                 helper' / 'SIP passthrough' in the router's firewall or NAT \
                 settings, reboot it, and re-run this check."
            }
        }
    }
}

/// Evidence the verdict is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgEvidence {
    /// Address of the outbound interface, when it could be discovered.
    pub local_ip: Option<IpAddr>,
    /// Local address is in a private or shared range.
    pub behind_nat: bool,
    /// Binding the SIP port locally failed.
    pub sip_port_bind_failed: bool,
}

/// Result of the ALG heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgReport {
    pub local_ip: Option<IpAddr>,
    pub behind_nat: bool,
    pub sip_port_bind_failed: bool,
    pub verdict: AlgVerdict,
    pub recommendation: String,
}

impl AlgReport {
    pub fn from_evidence(evidence: &AlgEvidence) -> Self {
        let verdict = classify(evidence);

        Self {
            local_ip: evidence.local_ip,
            behind_nat: evidence.behind_nat,
            sip_port_bind_failed: evidence.sip_port_bind_failed,
            verdict,
            recommendation: verdict.recommendation().to_string(),
        }
    }
}

/// Map evidence onto a verdict.
///
/// | behind NAT | port bind failed | verdict  |
/// |------------|------------------|----------|
/// | yes        | yes              | Likely   |
/// | yes        | no               | Possible |
/// | no         | yes              | Possible |
/// | no         | no               | Unlikely |
pub fn classify(evidence: &AlgEvidence) -> AlgVerdict {
    match (evidence.behind_nat, evidence.sip_port_bind_failed) {
        (true, true) => AlgVerdict::Likely,
        (true, false) | (false, true) => AlgVerdict::Possible,
        (false, false) => AlgVerdict::Unlikely,
    }
}

/// Whether `ip` is in a range that is only reachable through NAT.
///
/// Covers RFC 1918, the RFC 6598 shared (carrier-grade NAT) range and IPv6
/// unique-local addresses.
pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || is_shared_v4(v4),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xFE00) == 0xFC00,
    }
}

fn is_shared_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 100 && (b & 0xC0) == 64
}

/// Find the local address the OS would use to reach `via`.
///
/// Connecting a UDP socket only selects a route; nothing is transmitted.
pub async fn discover_local_ip(via: SocketAddr) -> Option<IpAddr> {
    let bind_addr: SocketAddr = if via.is_ipv6() {
        SocketAddr::from(([0u16; 8], 0))
    } else {
        SocketAddr::from(([0, 0, 0, 0], 0))
    };

    let socket = match UdpSocket::bind(bind_addr).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Failed to open UDP socket for interface discovery: {}", e);
            return None;
        }
    };

    if let Err(e) = socket.connect(via).await {
        debug!("No route towards {}: {}", via, e);
        return None;
    }

    match socket.local_addr() {
        Ok(addr) if !addr.ip().is_unspecified() => Some(addr.ip()),
        Ok(_) => None,
        Err(e) => {
            debug!("Could not read local address: {}", e);
            None
        }
    }
}

/// Whether binding UDP `port` on `local_ip` fails.
///
/// The heuristic binds the wildcard address so that any local holder of the
/// port is detected.
///
/// The socket is released immediately when the bind succeeds.
pub async fn sip_port_bind_fails(local_ip: IpAddr, port: u16) -> bool {
    match UdpSocket::bind(SocketAddr::new(local_ip, port)).await {
        Ok(socket) => {
            drop(socket);
            false
        }
        Err(e) => {
            debug!("Binding {}:{} failed: {}", local_ip, port, e);
            true
        }
    }
}

/// Gather local evidence for the ALG heuristic.
pub async fn gather_evidence(config: &AlgCheckConfig) -> AlgEvidence {
    let local_ip = match config.local_ip {
        Some(ip) => Some(ip),
        None => discover_local_ip(config.discovery_addr).await,
    };

    let behind_nat = local_ip.map(is_private).unwrap_or(false);

    let bind_ip = match local_ip {
        Some(IpAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };
    let sip_port_bind_failed = sip_port_bind_fails(bind_ip, config.sip_port).await;

    AlgEvidence { local_ip, behind_nat, sip_port_bind_failed }
}

/// Run the full heuristic and log the verdict.
pub async fn check_sip_alg(config: &AlgCheckConfig) -> AlgReport {
    let evidence = gather_evidence(config).await;
    let report = AlgReport::from_evidence(&evidence);

    info!(
        "SIP ALG heuristic: local_ip={:?}, behind_nat={}, port_{}_bind_failed={} => {}",
        report.local_ip,
        report.behind_nat,
        config.sip_port,
        report.sip_port_bind_failed,
        report.verdict
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn evidence(behind_nat: bool, sip_port_bind_failed: bool) -> AlgEvidence {
        AlgEvidence { local_ip: None, behind_nat, sip_port_bind_failed }
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(&evidence(true, true)), AlgVerdict::Likely);
        assert_eq!(classify(&evidence(true, false)), AlgVerdict::Possible);
        assert_eq!(classify(&evidence(false, true)), AlgVerdict::Possible);
        assert_eq!(classify(&evidence(false, false)), AlgVerdict::Unlikely);
    }

    #[test]
    fn test_is_private_v4() {
        for ip in ["10.1.2.3", "172.16.0.1", "172.31.255.254", "192.168.1.100"] {
            assert!(is_private(ip.parse().unwrap()), "{} should be private", ip);
        }
        for ip in ["8.8.8.8", "172.32.0.1", "192.169.0.1", "1.1.1.1"] {
            assert!(!is_private(ip.parse().unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn test_is_private_shared_range() {
        assert!(is_private("100.64.0.1".parse().unwrap()));
        assert!(is_private("100.127.255.255".parse().unwrap()));
        assert!(!is_private("100.128.0.1".parse().unwrap()));
        assert!(!is_private("100.63.255.255".parse().unwrap()));
    }

    #[test]
    fn test_is_private_v6() {
        assert!(is_private("fd12:3456:789a::1".parse().unwrap()));
        assert!(!is_private("2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_verdict_display_and_serialization() {
        assert_eq!(AlgVerdict::Likely.to_string(), "LIKELY");
        assert_eq!(
            serde_json::to_string(&AlgVerdict::Unlikely).unwrap(),
            "\"UNLIKELY\""
        );
    }

    #[test]
    fn test_report_from_evidence() {
        let evidence = AlgEvidence {
            local_ip: Some("192.168.1.100".parse().unwrap()),
            behind_nat: true,
            sip_port_bind_failed: false,
        };

        let report = AlgReport::from_evidence(&evidence);

        assert_eq!(report.verdict, AlgVerdict::Possible);
        assert_eq!(report.local_ip, evidence.local_ip);
        assert!(report.recommendation.contains("SIP ALG"));
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let held = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = held.local_addr().unwrap().port();

        assert!(sip_port_bind_fails("127.0.0.1".parse().unwrap(), port).await);

        drop(held);
        assert!(!sip_port_bind_fails("127.0.0.1".parse().unwrap(), port).await);
    }

    #[tokio::test]
    async fn test_gather_evidence_with_override() {
        let held = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = AlgCheckConfig {
            local_ip: Some("127.0.0.1".parse().unwrap()),
            sip_port: held.local_addr().unwrap().port(),
            ..AlgCheckConfig::default()
        };

        let evidence = gather_evidence(&config).await;

        assert_eq!(evidence.local_ip, config.local_ip);
        assert!(!evidence.behind_nat);
        assert!(evidence.sip_port_bind_failed);
        assert_eq!(classify(&evidence), AlgVerdict::Possible);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: adding evidence never lowers the verdict.
        #[test]
        fn verdict_is_monotonic(nat in any::<bool>(), bind in any::<bool>()) {
            let base = classify(&evidence(nat, bind));
            prop_assert!(classify(&evidence(true, bind)) >= base);
            prop_assert!(classify(&evidence(nat, true)) >= base);
        }
    }
}
