//! Tool definitions exposed over `tools/list`.
//!
//! One schema function per tool keeps the JSON literal next to the name the
//! dispatcher matches on.

use serde_json::{json, Value};

pub fn get_tool_schemas() -> Value {
    json!({
        "tools": [
            get_k8s_nodes_schema(),
            get_k8s_pods_schema(),
            get_argocd_apps_schema(),
            get_ceph_status_schema(),
            get_prometheus_alerts_schema(),
            get_velero_backups_schema(),
            create_velero_backup_schema(),
        ]
    })
}

fn get_k8s_nodes_schema() -> Value {
    json!({
        "name": "get_k8s_nodes",
        "description": "Get status of all Kubernetes nodes in the homelab cluster",
        "inputSchema": {
            "type": "object",
            "properties": {},
            "required": []
        }
    })
}

fn get_k8s_pods_schema() -> Value {
    json!({
        "name": "get_k8s_pods",
        "description": "Get pod status across the cluster, optionally filtered by namespace. Reports phase counts and any pod that is crash-looping, stuck, or restarting heavily.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "namespace": {
                    "type": "string",
                    "description": "Namespace to inspect (default: all namespaces)"
                }
            },
            "required": []
        }
    })
}

fn get_argocd_apps_schema() -> Value {
    json!({
        "name": "get_argocd_apps",
        "description": "Get ArgoCD application sync and health status",
        "inputSchema": {
            "type": "object",
            "properties": {},
            "required": []
        }
    })
}

fn get_ceph_status_schema() -> Value {
    json!({
        "name": "get_ceph_status",
        "description": "Get Rook-Ceph storage cluster health: overall status, mon/OSD counts, placement groups, and capacity",
        "inputSchema": {
            "type": "object",
            "properties": {},
            "required": []
        }
    })
}

fn get_prometheus_alerts_schema() -> Value {
    json!({
        "name": "get_prometheus_alerts",
        "description": "Get active Prometheus alerts, optionally filtered by severity",
        "inputSchema": {
            "type": "object",
            "properties": {
                "severity": {
                    "type": "string",
                    "description": "Filter by severity label: critical, warning, info"
                }
            },
            "required": []
        }
    })
}

fn get_velero_backups_schema() -> Value {
    json!({
        "name": "get_velero_backups",
        "description": "Get Velero backup posture: recent backups, schedules, storage location availability, and whether the newest completed backup is fresh",
        "inputSchema": {
            "type": "object",
            "properties": {},
            "required": []
        }
    })
}

fn create_velero_backup_schema() -> Value {
    json!({
        "name": "create_velero_backup",
        "description": "Create a manual Velero backup. With no arguments, backs up the whole cluster under a generated manual-<timestamp> name with the default retention.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Backup name (lowercase DNS-1123, max 63 chars). Default: manual-<timestamp>",
                    "pattern": "^[a-z0-9-]+$"
                },
                "include_namespaces": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Namespaces to include (default: entire cluster)"
                },
                "ttl": {
                    "type": "string",
                    "description": "Retention as a Velero duration, e.g. 720h (default from config)"
                }
            },
            "required": []
        }
    })
}
