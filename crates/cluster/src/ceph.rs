//! Rook-Ceph health via the toolbox pod.
//!
//! There is no Ceph HTTP endpoint exposed in the cluster, so status comes
//! from `ceph status -f json` executed inside the rook-ceph-tools pod. The
//! full status document is kept in the report for when the rollup is not
//! enough.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::command::CommandRunner;
use crate::error::{ClusterError, Result};

/// Label selector for the toolbox deployment Rook ships.
pub const TOOLS_POD_SELECTOR: &str = "app=rook-ceph-tools";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CephHealth {
    #[serde(rename = "HEALTH_OK")]
    Ok,
    #[serde(rename = "HEALTH_WARN")]
    Warn,
    #[serde(rename = "HEALTH_ERR")]
    Err,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl CephHealth {
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "HEALTH_OK" => Self::Ok,
            "HEALTH_WARN" => Self::Warn,
            "HEALTH_ERR" => Self::Err,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CephHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "HEALTH_OK",
            Self::Warn => "HEALTH_WARN",
            Self::Err => "HEALTH_ERR",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OsdCounts {
    pub total: u64,
    pub up: u64,
    #[serde(rename = "in")]
    pub in_: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CephReport {
    pub health: CephHealth,
    /// Human-readable messages from `health.checks` (e.g. "1 osds down").
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<String>,
    pub mons: u64,
    pub osds: OsdCounts,
    pub pgs: u64,
    pub bytes_used: u64,
    pub bytes_total: u64,
    /// Unmodified `ceph status` document.
    pub raw: Value,
}

pub async fn ceph_status(runner: &CommandRunner, namespace: &str) -> Result<CephReport> {
    let pod = match runner.first_pod_by_label(namespace, TOOLS_POD_SELECTOR).await {
        Ok(pod) => pod,
        Err(ClusterError::NotFound(_)) => {
            return Err(ClusterError::NotFound(format!(
                "rook-ceph-tools pod not found in namespace {namespace} - is the toolbox deployed?"
            )));
        }
        Err(err) => return Err(err),
    };

    let status = runner
        .exec_json(namespace, &pod, &["ceph", "status", "-f", "json"])
        .await?;
    Ok(parse_ceph_status(&status))
}

/// Roll up a `ceph status -f json` document.
///
/// Handles both the flat osdmap layout (Octopus and later) and the older
/// nested `osdmap.osdmap` one.
#[must_use]
pub fn parse_ceph_status(status: &Value) -> CephReport {
    let health = CephHealth::from_status(
        status["health"]["status"].as_str().unwrap_or("UNKNOWN"),
    );

    let mut checks = Vec::new();
    if let Some(map) = status["health"]["checks"].as_object() {
        for check in map.values() {
            if let Some(message) = check["summary"]["message"].as_str() {
                checks.push(message.to_string());
            }
        }
    }

    let mons = status["monmap"]["num_mons"].as_u64().unwrap_or_else(|| {
        status["monmap"]["mons"]
            .as_array()
            .map_or(0, |mons| mons.len() as u64)
    });

    let osdmap = if status["osdmap"]["osdmap"].is_object() {
        &status["osdmap"]["osdmap"]
    } else {
        &status["osdmap"]
    };
    let osds = OsdCounts {
        total: osdmap["num_osds"].as_u64().unwrap_or(0),
        up: osdmap["num_up_osds"].as_u64().unwrap_or(0),
        in_: osdmap["num_in_osds"].as_u64().unwrap_or(0),
    };

    CephReport {
        health,
        checks,
        mons,
        osds,
        pgs: status["pgmap"]["num_pgs"].as_u64().unwrap_or(0),
        bytes_used: status["pgmap"]["bytes_used"].as_u64().unwrap_or(0),
        bytes_total: status["pgmap"]["bytes_total"].as_u64().unwrap_or(0),
        raw: status.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn healthy_status() -> Value {
        json!({
            "health": {"status": "HEALTH_OK", "checks": {}},
            "monmap": {"num_mons": 3},
            "osdmap": {"num_osds": 3, "num_up_osds": 3, "num_in_osds": 3},
            "pgmap": {
                "num_pgs": 97,
                "bytes_used": 412_316_860_416_u64,
                "bytes_total": 1_500_000_000_000_u64
            }
        })
    }

    #[test]
    fn parses_healthy_cluster() {
        let report = parse_ceph_status(&healthy_status());
        assert_eq!(report.health, CephHealth::Ok);
        assert!(report.checks.is_empty());
        assert_eq!(report.mons, 3);
        assert_eq!(report.osds.total, 3);
        assert_eq!(report.osds.up, 3);
        assert_eq!(report.osds.in_, 3);
        assert_eq!(report.pgs, 97);
        assert_eq!(report.bytes_used, 412_316_860_416);
    }

    #[test]
    fn collects_warning_check_messages() {
        let status = json!({
            "health": {
                "status": "HEALTH_WARN",
                "checks": {
                    "OSD_DOWN": {"severity": "HEALTH_WARN",
                                 "summary": {"message": "1 osds down"}},
                    "PG_DEGRADED": {"severity": "HEALTH_WARN",
                                    "summary": {"message": "Degraded data redundancy"}}
                }
            },
            "monmap": {"num_mons": 3},
            "osdmap": {"num_osds": 3, "num_up_osds": 2, "num_in_osds": 3},
            "pgmap": {"num_pgs": 97, "bytes_used": 1, "bytes_total": 2}
        });

        let report = parse_ceph_status(&status);
        assert_eq!(report.health, CephHealth::Warn);
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.contains(&"1 osds down".to_string()));
        assert_eq!(report.osds.up, 2);
    }

    #[test]
    fn handles_legacy_nested_osdmap() {
        let status = json!({
            "health": {"status": "HEALTH_OK"},
            "monmap": {"mons": [{"name": "a"}, {"name": "b"}, {"name": "c"}]},
            "osdmap": {"osdmap": {"num_osds": 4, "num_up_osds": 4, "num_in_osds": 4}},
            "pgmap": {"num_pgs": 128, "bytes_used": 10, "bytes_total": 100}
        });

        let report = parse_ceph_status(&status);
        assert_eq!(report.mons, 3);
        assert_eq!(report.osds.total, 4);
    }

    #[test]
    fn garbage_degrades_to_unknown() {
        let report = parse_ceph_status(&json!({"unexpected": true}));
        assert_eq!(report.health, CephHealth::Unknown);
        assert_eq!(report.mons, 0);
        assert_eq!(report.osds.total, 0);
        assert_eq!(report.pgs, 0);
    }

    #[test]
    fn raw_document_is_preserved() {
        let status = healthy_status();
        let report = parse_ceph_status(&status);
        assert_eq!(report.raw, status);
    }

    #[test]
    fn health_serializes_as_ceph_strings() {
        let value = serde_json::to_value(CephHealth::Warn).unwrap();
        assert_eq!(value, json!("HEALTH_WARN"));
    }
}
