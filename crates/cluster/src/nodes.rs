//! Node inventory and readiness.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::command::CommandRunner;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeReadiness {
    Ready,
    NotReady,
    /// No `Ready` condition reported at all (kubelet unreachable).
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub ready: NodeReadiness,
    pub kubelet_version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub total: usize,
    pub ready: usize,
    pub not_ready: usize,
    pub nodes: Vec<NodeStatus>,
}

pub async fn list_nodes(runner: &CommandRunner) -> Result<NodeSummary> {
    let listing = runner.output_json(&["get", "nodes", "-o", "json"]).await?;
    Ok(parse_nodes(&listing))
}

/// Build the summary from a `kubectl get nodes -o json` listing.
///
/// Missing fields degrade rather than fail: a node without conditions is
/// `Unknown`, a node without nodeInfo reports version `unknown`.
#[must_use]
pub fn parse_nodes(listing: &Value) -> NodeSummary {
    let mut nodes = Vec::new();

    if let Some(items) = listing["items"].as_array() {
        for item in items {
            let name = item["metadata"]["name"].as_str().unwrap_or("").to_string();

            let mut ready = NodeReadiness::Unknown;
            if let Some(conditions) = item["status"]["conditions"].as_array() {
                for condition in conditions {
                    if condition["type"].as_str() == Some("Ready") {
                        ready = if condition["status"].as_str() == Some("True") {
                            NodeReadiness::Ready
                        } else {
                            NodeReadiness::NotReady
                        };
                    }
                }
            }

            let kubelet_version = item["status"]["nodeInfo"]["kubeletVersion"]
                .as_str()
                .unwrap_or("unknown")
                .to_string();

            let age_seconds = item["metadata"]["creationTimestamp"]
                .as_str()
                .and_then(age_seconds_since);

            nodes.push(NodeStatus {
                name,
                ready,
                kubelet_version,
                roles: node_roles(item),
                age_seconds,
            });
        }
    }

    let ready = nodes
        .iter()
        .filter(|node| node.ready == NodeReadiness::Ready)
        .count();

    NodeSummary {
        total: nodes.len(),
        ready,
        not_ready: nodes.len() - ready,
        nodes,
    }
}

/// Roles from `node-role.kubernetes.io/<role>` labels, sorted.
fn node_roles(node: &Value) -> Vec<String> {
    let mut roles: Vec<String> = node["metadata"]["labels"]
        .as_object()
        .map(|labels| {
            labels
                .keys()
                .filter_map(|key| key.strip_prefix("node-role.kubernetes.io/"))
                .filter(|role| !role.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    roles.sort();
    roles
}

fn age_seconds_since(timestamp: &str) -> Option<i64> {
    let created = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .with_timezone(&Utc);
    Some((Utc::now() - created).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str, ready_status: Option<&str>, version: &str, labels: Value) -> Value {
        let conditions = match ready_status {
            Some(status) => json!([
                {"type": "MemoryPressure", "status": "False"},
                {"type": "Ready", "status": status}
            ]),
            None => json!([]),
        };

        json!({
            "metadata": {
                "name": name,
                "labels": labels,
                "creationTimestamp": "2025-01-15T08:30:00Z"
            },
            "status": {
                "conditions": conditions,
                "nodeInfo": {"kubeletVersion": version}
            }
        })
    }

    #[test]
    fn counts_ready_and_not_ready() {
        let listing = json!({"items": [
            node("homelab-cp-01", Some("True"), "v1.31.4", json!({"node-role.kubernetes.io/control-plane": ""})),
            node("homelab-worker-01", Some("True"), "v1.31.4", json!({})),
            node("homelab-worker-02", Some("False"), "v1.31.4", json!({})),
        ]});

        let summary = parse_nodes(&listing);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.ready, 2);
        assert_eq!(summary.not_ready, 1);
        assert_eq!(summary.nodes[2].ready, NodeReadiness::NotReady);
    }

    #[test]
    fn missing_ready_condition_is_unknown() {
        let listing = json!({"items": [node("homelab-worker-01", None, "v1.31.4", json!({}))]});

        let summary = parse_nodes(&listing);
        assert_eq!(summary.nodes[0].ready, NodeReadiness::Unknown);
        assert_eq!(summary.ready, 0);
        assert_eq!(summary.not_ready, 1);
    }

    #[test]
    fn extracts_roles_from_labels() {
        let listing = json!({"items": [
            node("homelab-cp-01", Some("True"), "v1.31.4", json!({
                "node-role.kubernetes.io/control-plane": "",
                "node-role.kubernetes.io/etcd": "",
                "kubernetes.io/hostname": "homelab-cp-01"
            })),
        ]});

        let summary = parse_nodes(&listing);
        assert_eq!(summary.nodes[0].roles, vec!["control-plane", "etcd"]);
    }

    #[test]
    fn age_is_computed_from_creation_timestamp() {
        let listing = json!({"items": [node("homelab-cp-01", Some("True"), "v1.31.4", json!({}))]});

        let summary = parse_nodes(&listing);
        assert!(summary.nodes[0].age_seconds.unwrap() > 0);
    }

    #[test]
    fn empty_listing_is_empty_summary() {
        let summary = parse_nodes(&json!({"items": []}));
        assert_eq!(summary.total, 0);
        assert!(summary.nodes.is_empty());
    }

    #[test]
    fn tolerates_missing_node_info() {
        let listing = json!({"items": [{
            "metadata": {"name": "homelab-worker-01"},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }]});

        let summary = parse_nodes(&listing);
        assert_eq!(summary.nodes[0].kubelet_version, "unknown");
        assert_eq!(summary.nodes[0].ready, NodeReadiness::Ready);
    }
}
