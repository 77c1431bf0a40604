//! Homelab cluster diagnostics CLI.
//!
//! `doctor check` runs the sequential sweep the old cluster-health script
//! did: nodes, pods, ArgoCD apps, Ceph, Prometheus alerts, Velero backups.
//! Each section is also its own subcommand, and `backup`/`restore` drive
//! Velero without hand-writing manifests. Exit code is 1 when any section
//! fails, so the command works from cron and CI.

mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use cluster::prometheus::{PrometheusClient, PrometheusConfig};
use cluster::velero::BackupRequest;
use cluster::CommandRunner;
use homelab_config::HomelabConfig;
use report::HealthState;

#[derive(Parser)]
#[command(name = "doctor")]
#[command(about = "Homelab cluster diagnostics - checks nodes, workloads, storage, alerts, and backups")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Path to homelab-config.json
    #[arg(long, env = "HOMELAB_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check in sequence and report overall health
    Check,

    /// Node readiness and kubelet versions
    Nodes,

    /// Pod phases and problem pods
    Pods {
        /// Limit to one namespace (default: all namespaces)
        #[arg(long)]
        namespace: Option<String>,
    },

    /// ArgoCD application sync and health
    Apps,

    /// Rook-Ceph storage cluster health
    Ceph,

    /// Firing Prometheus alerts
    Alerts {
        /// Filter by severity label (critical, warning, info)
        #[arg(long)]
        severity: Option<String>,
    },

    /// Velero backups, schedules, and storage locations
    Backups,

    /// Create a manual Velero backup
    Backup {
        /// Backup name (default: manual-<timestamp>)
        #[arg(long)]
        name: Option<String>,

        /// Namespaces to include, comma separated (default: entire cluster)
        #[arg(long, value_delimiter = ',')]
        include_namespaces: Vec<String>,

        /// Retention as a Velero duration, e.g. 720h
        #[arg(long)]
        ttl: Option<String>,

        /// Print the manifest without creating anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a Velero restore from an existing backup
    Restore {
        /// Backup to restore from
        #[arg(long)]
        from_backup: String,

        /// Restore name (default: <backup>-<timestamp>)
        #[arg(long)]
        name: Option<String>,

        /// Actually create the restore; without this the command refuses
        #[arg(long)]
        force: bool,

        /// Print the manifest without creating anything
        #[arg(long)]
        dry_run: bool,
    },
}

struct SectionOutcome {
    name: &'static str,
    state: HealthState,
    data: Value,
    text: String,
}

/// Fold a probe result into a section: grade and render on success, a
/// failing section carrying the error otherwise. A broken probe must never
/// abort the remaining checks.
fn section<T: Serialize>(
    name: &'static str,
    result: cluster::Result<T>,
    grade: impl Fn(&T) -> HealthState,
    render: impl Fn(&T) -> String,
) -> SectionOutcome {
    match result {
        Ok(value) => SectionOutcome {
            name,
            state: grade(&value),
            text: render(&value),
            data: serde_json::to_value(&value).unwrap_or_default(),
        },
        Err(err) => SectionOutcome {
            name,
            state: HealthState::Fail,
            text: format!("check failed: {err}\n"),
            data: json!({"error": err.to_string()}),
        },
    }
}

fn prometheus_client(config: &HomelabConfig) -> PrometheusClient {
    PrometheusClient::new(PrometheusConfig {
        base_url: config.prometheus.resolved_url(),
        timeout_secs: config.prometheus.timeout_secs,
    })
}

async fn run_check(
    runner: &CommandRunner,
    config: &HomelabConfig,
    format: OutputFormat,
) -> Result<()> {
    let mut sections = Vec::new();

    sections.push(section(
        "nodes",
        cluster::nodes::list_nodes(runner).await,
        report::grade_nodes,
        report::render_nodes,
    ));
    sections.push(section(
        "pods",
        cluster::pods::list_pods(runner, None).await,
        report::grade_pods,
        report::render_pods,
    ));
    sections.push(section(
        "apps",
        cluster::argocd::list_apps(runner, &config.namespaces.argocd).await,
        report::grade_apps,
        report::render_apps,
    ));
    sections.push(section(
        "ceph",
        cluster::ceph::ceph_status(runner, &config.namespaces.rook_ceph).await,
        report::grade_ceph,
        report::render_ceph,
    ));
    sections.push(section(
        "alerts",
        prometheus_client(config).get_alerts(None).await,
        report::grade_alerts,
        report::render_alerts,
    ));
    sections.push(section(
        "backups",
        cluster::velero::backup_report(
            runner,
            &config.namespaces.velero,
            config.velero.freshness_hours,
        )
        .await,
        report::grade_backups,
        report::render_backups,
    ));

    let overall = report::overall(sections.iter().map(|section| section.state));

    match format {
        OutputFormat::Json => {
            let value = json!({
                "cluster": config.cluster.name,
                "overall": overall,
                "sections": sections
                    .iter()
                    .map(|section| json!({
                        "name": section.name,
                        "state": section.state,
                        "data": section.data.clone(),
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("=== Homelab Cluster Check: {} ===", config.cluster.name);
            for section in &sections {
                println!();
                println!("--- {} [{}] ---", section.name, section.state.label());
                print!("{}", section.text);
            }

            let ok = count_state(&sections, HealthState::Ok);
            let warn = count_state(&sections, HealthState::Warn);
            let fail = count_state(&sections, HealthState::Fail);
            println!();
            println!(
                "Overall: {} ({} checks: {ok} ok, {warn} warn, {fail} fail)",
                overall.label(),
                sections.len()
            );
        }
    }

    if overall == HealthState::Fail {
        std::process::exit(1);
    }
    Ok(())
}

fn count_state(sections: &[SectionOutcome], state: HealthState) -> usize {
    sections
        .iter()
        .filter(|section| section.state == state)
        .count()
}

/// Print a single section and exit non-zero when it fails.
fn finish<T: Serialize>(
    state: HealthState,
    payload: &T,
    body: String,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(payload)?;
            if let Value::Object(map) = &mut value {
                map.insert("state".to_string(), json!(state));
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Status: {}", state.label());
            print!("{body}");
        }
    }

    if state == HealthState::Fail {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_backup(
    runner: &CommandRunner,
    config: &HomelabConfig,
    request: &BackupRequest,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let (name, manifest) = cluster::velero::prepare_backup(
        request,
        &config.velero.default_ttl,
        &config.namespaces.velero,
    )?;

    if dry_run {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&manifest)?),
            OutputFormat::Text => print!("{}", cluster::velero::manifest_yaml(&manifest)?),
        }
        return Ok(());
    }

    runner.create_manifest(&manifest).await?;

    match format {
        OutputFormat::Json => {
            let value = json!({
                "status": "created",
                "backup": name,
                "namespace": config.namespaces.velero,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("{} backup {name}", "Created".green().bold());
            println!("Velero processes it asynchronously; run `doctor backups` to track progress.");
        }
    }
    Ok(())
}

async fn run_restore(
    runner: &CommandRunner,
    config: &HomelabConfig,
    from_backup: &str,
    name: Option<&str>,
    force: bool,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let (restore_name, manifest) =
        cluster::velero::prepare_restore(from_backup, name, &config.namespaces.velero)?;

    if dry_run {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&manifest)?),
            OutputFormat::Text => print!("{}", cluster::velero::manifest_yaml(&manifest)?),
        }
        return Ok(());
    }

    if !force {
        eprintln!(
            "{}",
            "Refusing to create a restore without --force.".yellow().bold()
        );
        eprintln!(
            "A restore overwrites live resources with the contents of backup `{from_backup}`."
        );
        eprintln!("Re-run with --force, or use --dry-run to inspect the manifest first.");
        std::process::exit(1);
    }

    runner.create_manifest(&manifest).await?;

    match format {
        OutputFormat::Json => {
            let value = json!({
                "status": "created",
                "restore": restore_name,
                "backup": from_backup,
                "namespace": config.namespaces.velero,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!(
                "{} restore {restore_name} from backup {from_backup}",
                "Created".green().bold()
            );
            println!("Watch progress with: kubectl get restores.velero.io -n {} -w", config.namespaces.velero);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("doctor=debug,cluster=debug"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match &cli.config {
        Some(path) => HomelabConfig::load_from(path),
        None => HomelabConfig::load(),
    }
    .context("Failed to load configuration")?;
    debug!(cluster = %config.cluster.name, "configuration loaded");

    let runner = CommandRunner::new(config.command_timeout_secs);

    match cli.command {
        Commands::Check => run_check(&runner, &config, cli.format).await,
        Commands::Nodes => {
            let summary = cluster::nodes::list_nodes(&runner).await?;
            finish(
                report::grade_nodes(&summary),
                &summary,
                report::render_nodes(&summary),
                cli.format,
            )
        }
        Commands::Pods { namespace } => {
            let summary = cluster::pods::list_pods(&runner, namespace.as_deref()).await?;
            finish(
                report::grade_pods(&summary),
                &summary,
                report::render_pods(&summary),
                cli.format,
            )
        }
        Commands::Apps => {
            let summary = cluster::argocd::list_apps(&runner, &config.namespaces.argocd).await?;
            finish(
                report::grade_apps(&summary),
                &summary,
                report::render_apps(&summary),
                cli.format,
            )
        }
        Commands::Ceph => {
            let report = cluster::ceph::ceph_status(&runner, &config.namespaces.rook_ceph).await?;
            finish(
                report::grade_ceph(&report),
                &report,
                report::render_ceph(&report),
                cli.format,
            )
        }
        Commands::Alerts { severity } => {
            let summary = prometheus_client(&config)
                .get_alerts(severity.as_deref())
                .await?;
            finish(
                report::grade_alerts(&summary),
                &summary,
                report::render_alerts(&summary),
                cli.format,
            )
        }
        Commands::Backups => {
            let report = cluster::velero::backup_report(
                &runner,
                &config.namespaces.velero,
                config.velero.freshness_hours,
            )
            .await?;
            finish(
                report::grade_backups(&report),
                &report,
                report::render_backups(&report),
                cli.format,
            )
        }
        Commands::Backup {
            name,
            include_namespaces,
            ttl,
            dry_run,
        } => {
            let request = BackupRequest {
                name,
                include_namespaces,
                ttl,
            };
            run_backup(&runner, &config, &request, dry_run, cli.format).await
        }
        Commands::Restore {
            from_backup,
            name,
            force,
            dry_run,
        } => {
            run_restore(
                &runner,
                &config,
                &from_backup,
                name.as_deref(),
                force,
                dry_run,
                cli.format,
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_bare_check() {
        let cli = Cli::try_parse_from(["doctor", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
        assert!(matches!(cli.format, OutputFormat::Text));
    }

    #[test]
    fn parses_global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["doctor", "nodes", "--format", "json"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn parses_pods_namespace() {
        let cli = Cli::try_parse_from(["doctor", "pods", "--namespace", "media"]).unwrap();
        match cli.command {
            Commands::Pods { namespace } => assert_eq!(namespace.as_deref(), Some("media")),
            _ => panic!("expected pods"),
        }
    }

    #[test]
    fn backup_namespaces_split_on_commas() {
        let cli = Cli::try_parse_from([
            "doctor",
            "backup",
            "--include-namespaces",
            "media,home",
            "--ttl",
            "240h",
        ])
        .unwrap();

        match cli.command {
            Commands::Backup {
                include_namespaces,
                ttl,
                dry_run,
                ..
            } => {
                assert_eq!(include_namespaces, vec!["media", "home"]);
                assert_eq!(ttl.as_deref(), Some("240h"));
                assert!(!dry_run);
            }
            _ => panic!("expected backup"),
        }
    }

    #[test]
    fn restore_requires_a_source_backup() {
        assert!(Cli::try_parse_from(["doctor", "restore"]).is_err());

        let cli = Cli::try_parse_from([
            "doctor",
            "restore",
            "--from-backup",
            "daily-20250601-020000",
        ])
        .unwrap();
        match cli.command {
            Commands::Restore { from_backup, force, .. } => {
                assert_eq!(from_backup, "daily-20250601-020000");
                assert!(!force);
            }
            _ => panic!("expected restore"),
        }
    }

    #[test]
    fn section_wraps_probe_errors_as_failures() {
        let result: cluster::Result<cluster::nodes::NodeSummary> =
            Err(cluster::ClusterError::NotFound("no such pod".to_string()));

        let outcome = section("nodes", result, report::grade_nodes, report::render_nodes);
        assert_eq!(outcome.state, HealthState::Fail);
        assert!(outcome.text.contains("no such pod"));
        assert_eq!(outcome.data["error"], "no such pod");
    }
}
