//! TCP connect timing.
//!
//! Measures how long the three-way handshake takes. The connection is
//! closed as soon as it is established; no payload is sent.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use super::ProbeFailure;

/// Time a TCP handshake to `addr`, in milliseconds.
///
/// A refused or reset connection counts as a failure, as does a handshake
/// that has not completed within `timeout`.
pub async fn connect_latency(
    addr: SocketAddr,
    timeout: Duration,
) -> Result<f64, ProbeFailure> {
    let start = Instant::now();

    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProbeFailure::Timeout(timeout))??;
    let latency = start.elapsed();

    drop(stream);

    Ok(latency.as_secs_f64() * 1000.0)
}
