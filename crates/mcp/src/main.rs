//! Homelab MCP server.
//!
//! Speaks the Model Context Protocol over stdio: newline-delimited JSON-RPC
//! 2.0 requests on stdin, responses on stdout. stdout belongs to the
//! protocol, so every diagnostic goes to stderr.
//!
//! All tools are pass-throughs over the cluster's own interfaces (kubectl,
//! the Prometheus API, Velero custom resources); the server adds no state of
//! its own and can be restarted at any time.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Runtime;
use tokio::signal;
use tokio::time::{timeout, Duration};
use tracing::debug;

use cluster::prometheus::{PrometheusClient, PrometheusConfig};
use cluster::velero::BackupRequest;
use cluster::CommandRunner;
use homelab_config::HomelabConfig;

mod tools;

static CONFIG: OnceLock<HomelabConfig> = OnceLock::new();

// JSON-RPC 2.0 error codes
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// Alerts shown in a tool response; the count fields still cover everything.
const MAX_ALERTS_SHOWN: usize = 10;

const STDIN_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RpcSuccessResponse {
    jsonrpc: String,
    result: Value,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RpcErrorResponse {
    jsonrpc: String,
    error: RpcError,
    id: Option<Value>,
}

impl RpcError {
    fn method_not_found(message: impl Into<String>) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }
}

fn config() -> &'static HomelabConfig {
    CONFIG.get().expect("config is set before the RPC loop starts")
}

fn runner() -> CommandRunner {
    CommandRunner::new(config().command_timeout_secs)
}

fn prometheus_client() -> PrometheusClient {
    let settings = &config().prometheus;
    PrometheusClient::new(PrometheusConfig {
        base_url: settings.resolved_url(),
        timeout_secs: settings.timeout_secs,
    })
}

fn extract_params(params: Option<&Value>) -> HashMap<String, Value> {
    params
        .and_then(|p| p.as_object())
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn optional_str(arguments: &HashMap<String, Value>, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

async fn handle_method(method: &str, params: Option<&Value>) -> Option<Result<Value, RpcError>> {
    let params_map = extract_params(params);

    // MCP protocol methods first
    if let Some(result) = handle_mcp_methods(method) {
        return Some(result);
    }

    // Notifications get no response
    if method.starts_with("notifications/") {
        return None;
    }

    if method == "tools/call" {
        return Some(handle_tool_calls(&params_map).await);
    }

    Some(Err(RpcError::method_not_found(format!(
        "Unknown method: {method}"
    ))))
}

fn handle_mcp_methods(method: &str) -> Option<Result<Value, RpcError>> {
    match method {
        "initialize" => Some(Ok(json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {
                "tools": {
                    "listChanged": true
                }
            },
            "serverInfo": {
                "name": "homelab-mcp",
                "title": "Homelab Cluster MCP Server",
                "version": env!("CARGO_PKG_VERSION"),
                "buildTimestamp": env!("BUILD_TIMESTAMP")
            }
        }))),
        "tools/list" => Some(Ok(tools::get_tool_schemas())),
        _ => None,
    }
}

async fn handle_tool_calls(params_map: &HashMap<String, Value>) -> Result<Value, RpcError> {
    let Some(name) = params_map.get("name").and_then(Value::as_str) else {
        return Err(RpcError::invalid_params("Missing tool name"));
    };

    let arguments: HashMap<String, Value> = params_map
        .get("arguments")
        .and_then(|v| v.as_object())
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    debug!(tool = name, "tool call");
    let result = match name {
        "get_k8s_nodes" => handle_get_k8s_nodes().await,
        "get_k8s_pods" => handle_get_k8s_pods(&arguments).await,
        "get_argocd_apps" => handle_get_argocd_apps().await,
        "get_ceph_status" => handle_get_ceph_status().await,
        "get_prometheus_alerts" => handle_get_prometheus_alerts(&arguments).await,
        "get_velero_backups" => handle_get_velero_backups().await,
        "create_velero_backup" => handle_create_velero_backup(&arguments).await,
        _ => {
            return Err(RpcError::method_not_found(format!("Unknown tool: {name}")));
        }
    }?;

    Ok(wrap_tool_result(&result))
}

/// MCP tool results are a list of content blocks; ours is always one text
/// block holding pretty-printed JSON.
fn wrap_tool_result(result: &Value) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        }]
    })
}

async fn handle_get_k8s_nodes() -> Result<Value, RpcError> {
    let summary = cluster::nodes::list_nodes(&runner())
        .await
        .map_err(|e| RpcError::internal(format!("Error getting nodes: {e}")))?;

    Ok(json!({
        "summary": format!("{} nodes total, {} ready", summary.total, summary.ready),
        "nodes": summary.nodes,
    }))
}

async fn handle_get_k8s_pods(arguments: &HashMap<String, Value>) -> Result<Value, RpcError> {
    let namespace = optional_str(arguments, "namespace");
    let summary = cluster::pods::list_pods(&runner(), namespace.as_deref())
        .await
        .map_err(|e| RpcError::internal(format!("Error getting pods: {e}")))?;

    Ok(json!({
        "namespace": namespace.as_deref().unwrap_or("all"),
        "summary": {
            "total": summary.total,
            "running": summary.running,
            "pending": summary.pending,
            "succeeded": summary.succeeded,
            "failed": summary.failed,
            "unknown": summary.unknown,
        },
        "problems": summary.problems,
    }))
}

async fn handle_get_argocd_apps() -> Result<Value, RpcError> {
    let summary = cluster::argocd::list_apps(&runner(), &config().namespaces.argocd)
        .await
        .map_err(|e| RpcError::internal(format!("Error getting ArgoCD apps: {e}")))?;

    Ok(json!({
        "summary": {
            "total": summary.total,
            "synced": summary.synced,
            "out_of_sync": summary.out_of_sync,
            "healthy": summary.healthy,
            "degraded": summary.degraded,
            "progressing": summary.progressing,
        },
        "apps": summary.apps,
    }))
}

async fn handle_get_ceph_status() -> Result<Value, RpcError> {
    let report = cluster::ceph::ceph_status(&runner(), &config().namespaces.rook_ceph)
        .await
        .map_err(|e| RpcError::internal(format!("Error getting Ceph status: {e}")))?;

    Ok(json!(report))
}

async fn handle_get_prometheus_alerts(
    arguments: &HashMap<String, Value>,
) -> Result<Value, RpcError> {
    let severity = optional_str(arguments, "severity");
    let summary = prometheus_client()
        .get_alerts(severity.as_deref())
        .await
        .map_err(|e| RpcError::internal(format!("Error getting alerts: {e}")))?;

    let shown: Vec<_> = summary.alerts.iter().take(MAX_ALERTS_SHOWN).collect();
    Ok(json!({
        "total_alerts": summary.total,
        "active_alerts": summary.firing,
        "alerts": shown,
        "truncated": summary.firing > MAX_ALERTS_SHOWN,
    }))
}

async fn handle_get_velero_backups() -> Result<Value, RpcError> {
    let config = config();
    let report = cluster::velero::backup_report(
        &runner(),
        &config.namespaces.velero,
        config.velero.freshness_hours,
    )
    .await
    .map_err(|e| RpcError::internal(format!("Error getting Velero backups: {e}")))?;

    Ok(json!(report))
}

async fn handle_create_velero_backup(
    arguments: &HashMap<String, Value>,
) -> Result<Value, RpcError> {
    let request = backup_request_from(arguments)?;
    let config = config();

    let (name, manifest) = cluster::velero::prepare_backup(
        &request,
        &config.velero.default_ttl,
        &config.namespaces.velero,
    )
    .map_err(|e| RpcError::invalid_params(e.to_string()))?;

    runner()
        .create_manifest(&manifest)
        .await
        .map_err(|e| RpcError::internal(format!("Error creating backup: {e}")))?;

    Ok(json!({
        "status": "created",
        "backup": name,
        "namespace": config.namespaces.velero,
        "manifest": manifest,
        "note": "Velero processes the backup asynchronously; call get_velero_backups to track progress",
    }))
}

fn backup_request_from(arguments: &HashMap<String, Value>) -> Result<BackupRequest, RpcError> {
    let include_namespaces = match arguments.get("include_namespaces") {
        None => Vec::new(),
        Some(Value::Array(items)) => {
            let mut namespaces = Vec::new();
            for item in items {
                match item.as_str() {
                    Some(ns) if !ns.trim().is_empty() => namespaces.push(ns.trim().to_string()),
                    _ => {
                        return Err(RpcError::invalid_params(
                            "include_namespaces entries must be non-empty strings",
                        ));
                    }
                }
            }
            namespaces
        }
        // Tolerate a comma-separated string; some hosts flatten array args
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(_) => {
            return Err(RpcError::invalid_params(
                "include_namespaces must be an array of strings",
            ));
        }
    };

    Ok(BackupRequest {
        name: optional_str(arguments, "name"),
        include_namespaces,
        ttl: optional_str(arguments, "ttl"),
    })
}

async fn rpc_loop() -> Result<()> {
    eprintln!("Starting RPC loop");
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line_result = timeout(STDIN_TIMEOUT, lines.next_line()).await;

        let line = match line_result {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                eprintln!("Stdin closed, exiting RPC loop");
                break;
            }
            Ok(Err(e)) => {
                eprintln!("Error reading from stdin: {e}");
                break;
            }
            Err(_) => {
                // Host is idle; keep waiting
                continue;
            }
        };

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("Invalid JSON request: {e}");
                continue;
            }
        };
        debug!(method = %request.method, "request");

        let Some(method_result) = handle_method(&request.method, request.params.as_ref()).await
        else {
            continue;
        };

        let resp_json = match method_result {
            Ok(result) => serde_json::to_string(&RpcSuccessResponse {
                jsonrpc: "2.0".to_string(),
                result,
                id: request.id,
            })?,
            Err(error) => serde_json::to_string(&RpcErrorResponse {
                jsonrpc: "2.0".to_string(),
                error,
                id: request.id,
            })?,
        };

        // Timeouts on stdout keep a wedged host from hanging the server
        if timeout(WRITE_TIMEOUT, stdout.write_all((resp_json + "\n").as_bytes()))
            .await
            .is_err()
        {
            eprintln!("Timeout writing to stdout, exiting");
            break;
        }
        if timeout(WRITE_TIMEOUT, stdout.flush()).await.is_err() {
            eprintln!("Timeout flushing stdout, exiting");
            break;
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries the protocol; logs must go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("homelab_mcp=info,cluster=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    eprintln!(
        "🚀 Starting homelab MCP server... (built: {})",
        env!("BUILD_TIMESTAMP")
    );

    let config = HomelabConfig::load().context("Failed to load homelab configuration")?;
    eprintln!(
        "📋 Cluster `{}`: argocd={} rook-ceph={} monitoring={} velero={}",
        config.cluster.name,
        config.namespaces.argocd,
        config.namespaces.rook_ceph,
        config.namespaces.monitoring,
        config.namespaces.velero
    );

    CONFIG
        .set(config)
        .map_err(|_| anyhow!("Failed to set homelab config"))?;
    eprintln!("✅ Configuration loaded");

    let rt = Runtime::new()?;
    rt.block_on(async {
        tokio::select! {
            result = rpc_loop() => {
                eprintln!("RPC loop completed with result: {result:?}");
                result
            }
            _ = signal::ctrl_c() => {
                eprintln!("Received Ctrl+C, shutting down gracefully");
                Ok(())
            }
        }
    })?;

    eprintln!("MCP server shutdown complete");
    Ok(())
}
