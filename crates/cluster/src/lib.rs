//! Cluster access layer for the homelab toolkit.
//!
//! Everything here is a pass-through: Kubernetes state comes from `kubectl`
//! shell-outs, alerts from the Prometheus HTTP API, and backups from Velero
//! custom resources applied via `kubectl create -f`. No Kubernetes client
//! library is involved; the toolkit drives the same commands an operator
//! would type, so its view of the cluster always matches theirs.
//!
//! Each module pairs an async fetch function with a pure `parse_*` function
//! so response handling stays testable against canned JSON.

pub mod argocd;
pub mod ceph;
pub mod command;
pub mod nodes;
pub mod pods;
pub mod prometheus;
pub mod velero;

mod error;

pub use command::CommandRunner;
pub use error::{ClusterError, Result};
