use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors surfaced by the cluster access layer.
///
/// Command failures keep the rendered command line and trimmed stderr so the
/// caller can show the operator exactly what kubectl said.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("`{command}` timed out after {timeout_secs}s")]
    CommandTimedOut { command: String, timeout_secs: u64 },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` produced invalid JSON: {source}")]
    InvalidJson {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("prometheus request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prometheus query failed: {0}")]
    Prometheus(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("failed to render manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
