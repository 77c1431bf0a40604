//! Timed kubectl invocations.
//!
//! Every query in this crate goes through [`CommandRunner`], which wraps
//! `tokio::process::Command` with a hard timeout and turns non-zero exits
//! into errors carrying kubectl's stderr. The kubectl binary is resolved
//! once at construction time.

use serde_json::Value;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ClusterError, Result};

/// Matches the timeout the cluster scripts have always used.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Locate a binary in the common installation directories, falling back to
/// PATH resolution. MCP hosts often launch servers with a minimal PATH, so
/// the usual Homebrew and system locations are probed explicitly.
#[must_use]
pub fn find_command(name: &str) -> String {
    let common_paths = [
        format!("/opt/homebrew/bin/{name}"), // Homebrew Apple Silicon
        format!("/usr/local/bin/{name}"),    // Homebrew Intel / standard Linux
        format!("/usr/bin/{name}"),          // System binaries
    ];

    for path in &common_paths {
        if std::path::Path::new(path).exists() {
            return path.clone();
        }
    }

    name.to_string()
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    binary: String,
    timeout_secs: u64,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl CommandRunner {
    #[must_use]
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            binary: find_command("kubectl"),
            timeout_secs,
        }
    }

    /// Run against an explicit binary instead of the resolved kubectl.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            binary: binary.into(),
            timeout_secs,
        }
    }

    fn render(&self, args: &[&str]) -> String {
        format!("kubectl {}", args.join(" "))
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let command = self.render(args);
        debug!(command = %command, "running");

        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.binary).args(args).output(),
        )
        .await
        .map_err(|_| ClusterError::CommandTimedOut {
            command: command.clone(),
            timeout_secs: self.timeout_secs,
        })?
        .map_err(|source| ClusterError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ClusterError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }

    /// Run kubectl and parse its stdout as JSON.
    pub async fn output_json(&self, args: &[&str]) -> Result<Value> {
        let output = self.run(args).await?;
        serde_json::from_slice(&output.stdout).map_err(|source| ClusterError::InvalidJson {
            command: self.render(args),
            source,
        })
    }

    /// Run kubectl and return trimmed stdout.
    pub async fn output_raw(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `kubectl exec` into a pod and parse the command's stdout as JSON.
    pub async fn exec_json(&self, namespace: &str, pod: &str, command: &[&str]) -> Result<Value> {
        let mut args = vec!["exec", "-n", namespace, pod, "--"];
        args.extend_from_slice(command);
        self.output_json(&args).await
    }

    /// Name of the first pod matching a label selector.
    pub async fn first_pod_by_label(&self, namespace: &str, selector: &str) -> Result<String> {
        let listing = self
            .output_json(&["get", "pod", "-n", namespace, "-l", selector, "-o", "json"])
            .await?;

        listing["items"]
            .as_array()
            .and_then(|items| items.first())
            .and_then(|pod| pod["metadata"]["name"].as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                ClusterError::NotFound(format!(
                    "no pod matching `{selector}` in namespace {namespace}"
                ))
            })
    }

    /// Write a manifest to a temp file and `kubectl create -f` it.
    /// Returns kubectl's confirmation line.
    pub async fn create_manifest(&self, manifest: &Value) -> Result<String> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(manifest.to_string().as_bytes())?;
        temp_file.flush()?;

        let path = temp_file.path().to_string_lossy().into_owned();
        self.output_raw(&["create", "-f", &path]).await
    }
}
