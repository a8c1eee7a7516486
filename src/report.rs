//! Combined result of a check run.
//!
//! A [`SessionReport`] bundles the ALG verdict, the final network snapshot
//! and the derived call quality into one serializable value for JSON output
//! and `--output` files.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::alg::AlgReport;
use crate::errors::CheckError;
use crate::quality::{grade, CallQuality};
use crate::snapshot::Snapshot;

/// Everything a run produced. Sections that were not run are omitted from
/// the JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// When the report was assembled
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<AlgReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<CallQuality>,
}

impl SessionReport {
    /// Build a report; call quality is graded from `network` when present.
    pub fn new(alg: Option<AlgReport>, network: Option<Snapshot>) -> Self {
        let quality = network.as_ref().map(grade);

        Self { timestamp: Utc::now(), alg, network, quality }
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, CheckError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CheckError::io("Failed to serialize report").with_source(e)
        })
    }

    /// Write the pretty JSON report to `path`, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<(), CheckError> {
        let json = self.to_json_pretty()?;

        fs::write(path, json + "\n").map_err(|e| {
            CheckError::io(format!(
                "Failed to write report to {}",
                path.display()
            ))
            .with_suggestion("Check that the directory exists and is writable.")
            .with_source(e)
        })?;

        info!("Report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::{AlgEvidence, AlgVerdict};
    use crate::errors::ErrorKind;
    use crate::snapshot::LatencyAggregates;
    use std::env;

    fn snapshot() -> Snapshot {
        Snapshot::new(
            "8.8.8.8",
            10,
            9,
            10.0,
            LatencyAggregates { avg_ms: 21.5, min_ms: 18.0, max_ms: 30.25 },
            3.5,
        )
    }

    fn alg_report() -> AlgReport {
        AlgReport::from_evidence(&AlgEvidence {
            local_ip: Some("192.168.1.20".parse().unwrap()),
            behind_nat: true,
            sip_port_bind_failed: true,
        })
    }

    #[test]
    fn test_quality_graded_from_network() {
        let report = SessionReport::new(None, Some(snapshot()));
        assert!(report.quality.is_some());

        let report = SessionReport::new(Some(alg_report()), None);
        assert!(report.quality.is_none());
    }

    #[test]
    fn test_json_contains_all_sections() {
        let report = SessionReport::new(Some(alg_report()), Some(snapshot()));
        let json = report.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["alg"]["verdict"], "LIKELY");
        assert_eq!(value["network"]["packets_sent"], 10);
        assert_eq!(value["network"]["jitter_ms"], 3.5);
        assert!(value["quality"]["score"].is_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_json_omits_missing_sections() {
        let report = SessionReport::new(Some(alg_report()), None);
        let value: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        assert!(value.get("network").is_none());
        assert!(value.get("quality").is_none());
        assert_eq!(
            report.alg.as_ref().map(|alg| alg.verdict),
            Some(AlgVerdict::Likely)
        );
    }

    #[test]
    fn test_write_to_file() {
        let path = env::temp_dir()
            .join(format!("sip-alg-check-report-{}.json", std::process::id()));
        let report = SessionReport::new(None, Some(snapshot()));

        report.write_to(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["network"]["target"], "8.8.8.8");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_to_missing_directory_is_io_error() {
        let path = env::temp_dir()
            .join("sip-alg-check-no-such-dir")
            .join("nested")
            .join("report.json");
        let report = SessionReport::new(None, Some(snapshot()));

        let err = report.write_to(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.source.is_some());
    }
}
