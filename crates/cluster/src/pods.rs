//! Pod phase summary and problem detection.

use serde::Serialize;
use serde_json::Value;

use crate::command::CommandRunner;
use crate::error::Result;

/// Restart count at which an otherwise healthy pod is still flagged.
pub const RESTART_PROBLEM_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ProblemPod {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    /// Ready containers over total, kubectl-style ("1/2").
    pub ready: String,
    pub restarts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodSummary {
    pub total: usize,
    pub running: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
    pub problems: Vec<ProblemPod>,
}

/// List pods in one namespace, or across the cluster when `namespace` is
/// `None` or empty.
pub async fn list_pods(runner: &CommandRunner, namespace: Option<&str>) -> Result<PodSummary> {
    let listing = match namespace {
        Some(ns) if !ns.is_empty() => {
            runner
                .output_json(&["get", "pods", "-n", ns, "-o", "json"])
                .await?
        }
        _ => {
            runner
                .output_json(&["get", "pods", "--all-namespaces", "-o", "json"])
                .await?
        }
    };
    Ok(parse_pods(&listing))
}

/// A pod is a problem when its phase is neither Running nor Succeeded, when
/// it is Running with a container that never became ready, or when restarts
/// hit [`RESTART_PROBLEM_THRESHOLD`].
#[must_use]
pub fn parse_pods(listing: &Value) -> PodSummary {
    let mut summary = PodSummary {
        total: 0,
        running: 0,
        pending: 0,
        succeeded: 0,
        failed: 0,
        unknown: 0,
        problems: Vec::new(),
    };

    let Some(items) = listing["items"].as_array() else {
        return summary;
    };

    for item in items {
        summary.total += 1;
        let phase = item["status"]["phase"].as_str().unwrap_or("Unknown");

        match phase {
            "Running" => summary.running += 1,
            "Pending" => summary.pending += 1,
            "Succeeded" => summary.succeeded += 1,
            "Failed" => summary.failed += 1,
            _ => summary.unknown += 1,
        }

        let containers = container_rollup(item);
        let healthy_phase = phase == "Running" || phase == "Succeeded";
        let all_ready = containers.ready == containers.total;
        let problem = !healthy_phase
            || (phase == "Running" && !all_ready)
            || containers.restarts >= RESTART_PROBLEM_THRESHOLD;

        if problem {
            summary.problems.push(ProblemPod {
                name: item["metadata"]["name"].as_str().unwrap_or("").to_string(),
                namespace: item["metadata"]["namespace"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
                phase: phase.to_string(),
                ready: format!("{}/{}", containers.ready, containers.total),
                restarts: containers.restarts,
                reason: problem_reason(item, phase),
            });
        }
    }

    summary
}

struct ContainerRollup {
    ready: usize,
    total: usize,
    restarts: u64,
}

fn container_rollup(pod: &Value) -> ContainerRollup {
    if let Some(statuses) = pod["status"]["containerStatuses"].as_array() {
        return ContainerRollup {
            ready: statuses
                .iter()
                .filter(|status| status["ready"].as_bool() == Some(true))
                .count(),
            total: statuses.len(),
            restarts: statuses
                .iter()
                .filter_map(|status| status["restartCount"].as_u64())
                .sum(),
        };
    }

    // Unscheduled pods have no statuses yet; fall back to the spec.
    let total = pod["spec"]["containers"]
        .as_array()
        .map_or(0, Vec::len);
    ContainerRollup {
        ready: 0,
        total,
        restarts: 0,
    }
}

/// Best single-word explanation: a waiting container's reason
/// (CrashLoopBackOff, ImagePullBackOff, ...) beats the pod-level reason
/// (Evicted), which beats nothing.
fn problem_reason(pod: &Value, phase: &str) -> Option<String> {
    if let Some(statuses) = pod["status"]["containerStatuses"].as_array() {
        for status in statuses {
            if let Some(reason) = status["state"]["waiting"]["reason"].as_str() {
                return Some(reason.to_string());
            }
        }
    }

    if let Some(reason) = pod["status"]["reason"].as_str() {
        return Some(reason.to_string());
    }

    if phase == "Running" {
        None
    } else {
        Some(phase.to_string())
    }
}
