//! Prometheus API client for alert queries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};

/// Configuration for connecting to Prometheus.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL for the Prometheus server.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("PROMETHEUS_URL").unwrap_or_else(|_| {
                "http://kube-prometheus-stack-prometheus.monitoring:9090".to_string()
            }),
            timeout_secs: 30,
        }
    }
}

/// Raw alert as returned by `/api/v1/alerts`.
#[derive(Debug, Clone, Deserialize)]
struct ApiAlert {
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    annotations: HashMap<String, String>,
    state: String,
    #[serde(rename = "activeAt")]
    active_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    status: String,
    #[serde(default)]
    data: AlertsData,
}

#[derive(Debug, Default, Deserialize)]
struct AlertsData {
    #[serde(default)]
    alerts: Vec<ApiAlert>,
}

/// A firing alert, reduced to what an operator acts on.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveAlert {
    pub name: String,
    pub severity: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_at: Option<String>,
    /// Full label set, so instance/namespace/pod survive the rollup.
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsSummary {
    /// Alerts matching the severity filter, in any state (incl. pending).
    pub total: usize,
    pub firing: usize,
    /// Only the firing alerts.
    pub alerts: Vec<ActiveAlert>,
}

/// Client for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    config: PrometheusConfig,
    client: reqwest::Client,
}

impl PrometheusClient {
    /// Create a new client with the given configuration.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(config: PrometheusConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Create a client with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(PrometheusConfig::default())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Fetch alerts, optionally filtered by the `severity` label, and reduce
    /// them to a firing-centric summary.
    pub async fn get_alerts(&self, severity: Option<&str>) -> Result<AlertsSummary> {
        let url = self.endpoint("/api/v1/alerts");
        debug!(url = %url, severity = ?severity, "querying prometheus alerts");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::Prometheus(format!(
                "alerts request returned {status}: {body}"
            )));
        }

        let parsed: AlertsResponse = response.json().await?;
        if parsed.status != "success" {
            return Err(ClusterError::Prometheus(format!(
                "unexpected response status: {}",
                parsed.status
            )));
        }

        Ok(summarize(parsed.data.alerts, severity))
    }

    /// Check whether Prometheus answers on `/-/healthy`. Connection errors
    /// count as unhealthy rather than failing the caller.
    pub async fn health_check(&self) -> Result<bool> {
        let url = self.endpoint("/-/healthy");

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Prometheus health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

fn summarize(mut alerts: Vec<ApiAlert>, severity: Option<&str>) -> AlertsSummary {
    if let Some(wanted) = severity {
        alerts.retain(|alert| alert.labels.get("severity").map(String::as_str) == Some(wanted));
    }

    let total = alerts.len();
    let firing: Vec<ActiveAlert> = alerts
        .into_iter()
        .filter(|alert| alert.state == "firing")
        .map(|alert| ActiveAlert {
            name: alert
                .labels
                .get("alertname")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            severity: alert
                .labels
                .get("severity")
                .cloned()
                .unwrap_or_else(|| "none".to_string()),
            state: alert.state,
            summary: alert
                .annotations
                .get("summary")
                .or_else(|| alert.annotations.get("message"))
                .or_else(|| alert.annotations.get("description"))
                .cloned(),
            active_at: alert.active_at,
            labels: alert.labels,
        })
        .collect();

    AlertsSummary {
        total,
        firing: firing.len(),
        alerts: firing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(name: &str, severity: &str, state: &str) -> ApiAlert {
        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), name.to_string());
        labels.insert("severity".to_string(), severity.to_string());

        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), format!("{name} is unhappy"));

        ApiAlert {
            labels,
            annotations,
            state: state.to_string(),
            active_at: Some("2025-06-01T10:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_config_default() {
        let config = PrometheusConfig::default();
        assert!(!config.base_url.is_empty());
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_client_creation() {
        let client = PrometheusClient::with_defaults();
        assert!(!client.config.base_url.is_empty());
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = PrometheusClient::new(PrometheusConfig {
            base_url: "http://localhost:9090/".to_string(),
            timeout_secs: 5,
        });
        assert_eq!(
            client.endpoint("/api/v1/alerts"),
            "http://localhost:9090/api/v1/alerts"
        );
    }

    #[test]
    fn summarize_keeps_only_firing() {
        let summary = summarize(
            vec![
                alert("CephOSDDown", "critical", "firing"),
                alert("NodeDiskPressure", "warning", "pending"),
            ],
            None,
        );

        assert_eq!(summary.total, 2);
        assert_eq!(summary.firing, 1);
        assert_eq!(summary.alerts[0].name, "CephOSDDown");
        assert_eq!(summary.alerts[0].summary.as_deref(), Some("CephOSDDown is unhappy"));
    }

    #[test]
    fn summarize_filters_by_severity() {
        let summary = summarize(
            vec![
                alert("CephOSDDown", "critical", "firing"),
                alert("HighMemory", "warning", "firing"),
                alert("Watchdog", "none", "firing"),
            ],
            Some("warning"),
        );

        assert_eq!(summary.total, 1);
        assert_eq!(summary.firing, 1);
        assert_eq!(summary.alerts[0].name, "HighMemory");
    }

    #[test]
    fn summarize_keeps_the_full_label_set() {
        let mut noisy = alert("KubePodCrashLooping", "warning", "firing");
        noisy
            .labels
            .insert("namespace".to_string(), "media".to_string());
        noisy
            .labels
            .insert("pod".to_string(), "media-indexer-7d9".to_string());

        let summary = summarize(vec![noisy], None);
        let labels = &summary.alerts[0].labels;
        assert_eq!(labels.get("namespace").map(String::as_str), Some("media"));
        assert_eq!(
            labels.get("pod").map(String::as_str),
            Some("media-indexer-7d9")
        );
        assert_eq!(
            labels.get("alertname").map(String::as_str),
            Some("KubePodCrashLooping")
        );
    }

    #[test]
    fn summary_falls_back_to_message_then_description() {
        let mut with_message = alert("NodeDown", "critical", "firing");
        with_message.annotations.remove("summary");
        with_message
            .annotations
            .insert("message".to_string(), "node is gone".to_string());

        let mut with_description = alert("DiskFull", "warning", "firing");
        with_description.annotations.remove("summary");
        with_description
            .annotations
            .insert("description".to_string(), "disk is full".to_string());

        let summary = summarize(vec![with_message, with_description], None);
        assert_eq!(summary.alerts[0].summary.as_deref(), Some("node is gone"));
        assert_eq!(summary.alerts[1].summary.as_deref(), Some("disk is full"));
    }

    #[test]
    fn summarize_defaults_missing_labels() {
        let bare = ApiAlert {
            labels: HashMap::new(),
            annotations: HashMap::new(),
            state: "firing".to_string(),
            active_at: None,
        };

        let summary = summarize(vec![bare], None);
        assert_eq!(summary.alerts[0].name, "unknown");
        assert_eq!(summary.alerts[0].severity, "none");
        assert!(summary.alerts[0].summary.is_none());
    }
}
