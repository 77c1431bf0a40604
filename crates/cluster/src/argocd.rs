//! ArgoCD application sync and health rollup.
//!
//! Read from the `applications.argoproj.io` custom resources directly rather
//! than the `argocd` CLI, so no API server login is needed.

use serde::Serialize;
use serde_json::Value;

use crate::command::CommandRunner;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub name: String,
    /// `Synced`, `OutOfSync`, or `Unknown`.
    pub sync: String,
    /// `Healthy`, `Progressing`, `Degraded`, `Suspended`, `Missing`, or `Unknown`.
    pub health: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppSummary {
    pub total: usize,
    pub synced: usize,
    pub out_of_sync: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub progressing: usize,
    pub apps: Vec<AppStatus>,
}

pub async fn list_apps(runner: &CommandRunner, namespace: &str) -> Result<AppSummary> {
    let listing = runner
        .output_json(&[
            "get",
            "applications.argoproj.io",
            "-n",
            namespace,
            "-o",
            "json",
        ])
        .await?;
    Ok(parse_apps(&listing))
}

/// Anything that is not literally `Synced` counts as out of sync, including
/// apps whose status has never been written.
#[must_use]
pub fn parse_apps(listing: &Value) -> AppSummary {
    let mut apps = Vec::new();
    let mut synced = 0;
    let mut healthy = 0;
    let mut degraded = 0;
    let mut progressing = 0;

    if let Some(items) = listing["items"].as_array() {
        for item in items {
            let sync = item["status"]["sync"]["status"]
                .as_str()
                .unwrap_or("Unknown")
                .to_string();
            let health = item["status"]["health"]["status"]
                .as_str()
                .unwrap_or("Unknown")
                .to_string();

            if sync == "Synced" {
                synced += 1;
            }
            match health.as_str() {
                "Healthy" => healthy += 1,
                "Degraded" => degraded += 1,
                "Progressing" => progressing += 1,
                _ => {}
            }

            apps.push(AppStatus {
                name: item["metadata"]["name"].as_str().unwrap_or("").to_string(),
                sync,
                health,
            });
        }
    }

    AppSummary {
        total: apps.len(),
        synced,
        out_of_sync: apps.len() - synced,
        healthy,
        degraded,
        progressing,
        apps,
    }
}
