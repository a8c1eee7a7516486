//! Voice call quality grading.
//!
//! Estimates how a VoIP call would sound over the measured path using a
//! simplified ITU-T G.107 E-model: latency, jitter and loss become an
//! R-factor, which maps onto a Mean Opinion Score (MOS) between 1 and 4.5.

use serde::Serialize;

use crate::snapshot::Snapshot;
use crate::stats::round2;

/// Quality categories for a voice call.
///
/// Variants are ordered from worst to best for correct derived Ord behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityScore {
    /// Calls likely to be unusable or heavily degraded
    Poor,
    /// Noticeable degradation, still usable
    Average,
    /// Minor artefacts at most
    Good,
    /// Toll quality
    Great,
}

impl QualityScore {
    /// Returns a human-readable description of the quality score.
    pub fn description(&self) -> &'static str {
        match self {
            QualityScore::Great => "Excellent",
            QualityScore::Good => "Good",
            QualityScore::Average => "Average",
            QualityScore::Poor => "Poor",
        }
    }

    /// Categorise a MOS value.
    pub fn from_mos(mos: f64) -> Self {
        if mos >= MOS_GREAT {
            QualityScore::Great
        } else if mos >= MOS_GOOD {
            QualityScore::Good
        } else if mos >= MOS_AVERAGE {
            QualityScore::Average
        } else {
            QualityScore::Poor
        }
    }
}

const MOS_GREAT: f64 = 4.3;
const MOS_GOOD: f64 = 4.0;
const MOS_AVERAGE: f64 = 3.6;

/// Default R-factor for G.711 with no impairments.
const R_BASE: f64 = 93.2;
/// Codec processing delay added to the measured latency (ms).
const CODEC_DELAY_MS: f64 = 10.0;
/// Effective latency above which delay impairment grows faster (ms).
const DELAY_KNEE_MS: f64 = 160.0;
/// R-factor penalty per percent of packet loss.
const LOSS_PENALTY_PER_PERCENT: f64 = 2.5;

/// Estimated call quality for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CallQuality {
    pub score: QualityScore,
    /// Mean Opinion Score, 1.0 (bad) to 4.5 (best)
    pub mos: f64,
    /// E-model transmission rating, 0 to 100
    pub r_factor: f64,
}

/// Compute the R-factor from latency, jitter and loss.
///
/// Jitter counts double because a jitter buffer has to absorb it, adding
/// delay on top of the network latency.
pub fn r_factor(latency_ms: f64, jitter_ms: f64, loss_percent: f64) -> f64 {
    let effective_latency = latency_ms + 2.0 * jitter_ms + CODEC_DELAY_MS;

    let delay_impairment = if effective_latency < DELAY_KNEE_MS {
        effective_latency / 40.0
    } else {
        (effective_latency - 120.0) / 10.0
    };

    let r = R_BASE - delay_impairment - LOSS_PENALTY_PER_PERCENT * loss_percent;
    r.clamp(0.0, 100.0)
}

/// Convert an R-factor to MOS.
pub fn mos_from_r(r: f64) -> f64 {
    if r <= 0.0 {
        return 1.0;
    }
    if r >= 100.0 {
        return 4.5;
    }

    1.0 + 0.035 * r + 7.0e-6 * r * (r - 60.0) * (100.0 - r)
}

/// Grade the path described by `snapshot`.
///
/// A snapshot without any received probe is graded Poor.
pub fn grade(snapshot: &Snapshot) -> CallQuality {
    if !snapshot.has_samples() {
        return CallQuality { score: QualityScore::Poor, mos: 1.0, r_factor: 0.0 };
    }

    let r = r_factor(
        snapshot.avg_latency_ms,
        snapshot.jitter_ms,
        snapshot.packet_loss_percent,
    );
    let mos = mos_from_r(r).max(1.0);

    CallQuality {
        score: QualityScore::from_mos(mos),
        mos: round2(mos),
        r_factor: round2(r),
    }
}
