//! Detect likely SIP ALG interference and monitor the latency, jitter and
//! packet loss of the path to a VoIP target.

pub mod alg;
pub mod engine;
pub mod errors;
pub mod history;
pub mod monitor;
pub mod probe;
pub mod quality;
pub mod report;
pub mod snapshot;
pub mod stats;
pub mod tui;
