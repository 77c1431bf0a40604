//! Health grading and text rendering for the diagnostic sections.
//!
//! Graders are pure functions from a cluster summary to a [`HealthState`];
//! renderers produce the text bodies the CLI prints. Keeping both away from
//! the command plumbing makes the rules testable against canned summaries.

use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::fmt;

use cluster::argocd::AppSummary;
use cluster::ceph::{CephHealth, CephReport};
use cluster::nodes::{NodeReadiness, NodeSummary};
use cluster::pods::PodSummary;
use cluster::prometheus::AlertsSummary;
use cluster::velero::BackupReport;

/// Backups listed in text output; JSON always carries all of them.
const MAX_BACKUPS_SHOWN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Warn,
    Fail,
}

impl HealthState {
    #[must_use]
    pub fn label(self) -> ColoredString {
        match self {
            Self::Ok => "OK".green().bold(),
            Self::Warn => "WARN".yellow().bold(),
            Self::Fail => "FAIL".red().bold(),
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
        };
        write!(f, "{label}")
    }
}

/// Worst state wins.
pub fn overall<I: IntoIterator<Item = HealthState>>(states: I) -> HealthState {
    states.into_iter().max().unwrap_or(HealthState::Ok)
}

pub fn grade_nodes(summary: &NodeSummary) -> HealthState {
    if summary.total == 0 {
        return HealthState::Warn;
    }
    if summary.ready < summary.total {
        return HealthState::Fail;
    }
    HealthState::Ok
}

/// Only a Failed phase fails the section. A crash-looping pod is still
/// Running as far as the API is concerned, and the controller may recover
/// it; that is a warning, not a page.
pub fn grade_pods(summary: &PodSummary) -> HealthState {
    if summary.problems.iter().any(|pod| pod.phase == "Failed") {
        return HealthState::Fail;
    }
    if summary.problems.is_empty() {
        HealthState::Ok
    } else {
        HealthState::Warn
    }
}

pub fn grade_apps(summary: &AppSummary) -> HealthState {
    if summary.degraded > 0 {
        return HealthState::Fail;
    }
    if summary.out_of_sync > 0 || summary.progressing > 0 {
        return HealthState::Warn;
    }
    HealthState::Ok
}

pub fn grade_ceph(report: &CephReport) -> HealthState {
    match report.health {
        CephHealth::Ok => HealthState::Ok,
        // Unknown means the status document was unreadable, not that data
        // is at risk
        CephHealth::Warn | CephHealth::Unknown => HealthState::Warn,
        CephHealth::Err => HealthState::Fail,
    }
}

pub fn grade_alerts(summary: &AlertsSummary) -> HealthState {
    if summary
        .alerts
        .iter()
        .any(|alert| alert.severity == "critical")
    {
        return HealthState::Fail;
    }
    // The Watchdog heartbeat fires constantly with severity `none`
    if summary.alerts.iter().any(|alert| alert.severity != "none") {
        return HealthState::Warn;
    }
    HealthState::Ok
}

pub fn grade_backups(report: &BackupReport) -> HealthState {
    let unreachable = report
        .storage_locations
        .iter()
        .any(|location| location.phase == "Unavailable");
    if !report.freshness.fresh || unreachable {
        return HealthState::Fail;
    }

    let latest_degraded = report
        .backups
        .first()
        .is_some_and(|backup| backup.phase == "PartiallyFailed" || backup.phase == "Failed");
    let location_uncertain = report.storage_locations.is_empty()
        || report
            .storage_locations
            .iter()
            .any(|location| location.phase != "Available");
    let no_active_schedule =
        report.schedules.is_empty() || report.schedules.iter().all(|schedule| schedule.paused);

    if latest_degraded || location_uncertain || no_active_schedule {
        return HealthState::Warn;
    }
    HealthState::Ok
}

pub fn render_nodes(summary: &NodeSummary) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    writeln!(
        output,
        "{} nodes total | {} ready | {} not ready",
        summary.total, summary.ready, summary.not_ready
    )
    .unwrap();

    for node in &summary.nodes {
        let state = match node.ready {
            NodeReadiness::Ready => "Ready".green(),
            NodeReadiness::NotReady => "NotReady".red(),
            NodeReadiness::Unknown => "Unknown".yellow(),
        };
        let roles = if node.roles.is_empty() {
            String::new()
        } else {
            format!(", {}", node.roles.join("+"))
        };
        let age = node
            .age_seconds
            .map_or(String::new(), |secs| format!(", age {}", fmt_age_seconds(secs)));
        writeln!(
            output,
            "- {}: {} ({}{}{})",
            node.name, state, node.kubelet_version, roles, age
        )
        .unwrap();
    }

    output
}

pub fn render_pods(summary: &PodSummary) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    writeln!(
        output,
        "{} pods | running {} | pending {} | succeeded {} | failed {} | unknown {}",
        summary.total,
        summary.running,
        summary.pending,
        summary.succeeded,
        summary.failed,
        summary.unknown
    )
    .unwrap();

    if summary.problems.is_empty() {
        writeln!(output, "No problem pods.").unwrap();
    } else {
        writeln!(output, "Problems ({}):", summary.problems.len()).unwrap();
        for pod in &summary.problems {
            let reason = pod
                .reason
                .as_deref()
                .map_or(String::new(), |reason| format!(" ({reason})"));
            writeln!(
                output,
                "- {}/{}: {} {} ready, {} restarts{}",
                pod.namespace,
                pod.name,
                pod.phase.red(),
                pod.ready,
                pod.restarts,
                reason
            )
            .unwrap();
        }
    }

    output
}

pub fn render_apps(summary: &AppSummary) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    writeln!(
        output,
        "{} applications | synced {} | out of sync {} | healthy {} | degraded {} | progressing {}",
        summary.total,
        summary.synced,
        summary.out_of_sync,
        summary.healthy,
        summary.degraded,
        summary.progressing
    )
    .unwrap();

    for app in &summary.apps {
        let sync = if app.sync == "Synced" {
            app.sync.green()
        } else {
            app.sync.yellow()
        };
        let health = match app.health.as_str() {
            "Healthy" => app.health.green(),
            "Degraded" => app.health.red(),
            "Progressing" => app.health.yellow(),
            _ => app.health.normal(),
        };
        writeln!(output, "- {}: {} / {}", app.name, sync, health).unwrap();
    }

    output
}

pub fn render_ceph(report: &CephReport) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    let health = match report.health {
        CephHealth::Ok => report.health.to_string().green(),
        CephHealth::Warn | CephHealth::Unknown => report.health.to_string().yellow(),
        CephHealth::Err => report.health.to_string().red(),
    };
    writeln!(output, "Health: {health}").unwrap();

    for check in &report.checks {
        writeln!(output, "- {check}").unwrap();
    }

    writeln!(
        output,
        "mons {} | osds {} total / {} up / {} in | pgs {}",
        report.mons, report.osds.total, report.osds.up, report.osds.in_, report.pgs
    )
    .unwrap();

    if report.bytes_total > 0 {
        let percent = report.bytes_used as f64 / report.bytes_total as f64 * 100.0;
        writeln!(
            output,
            "usage: {} / {} ({percent:.1}%)",
            fmt_bytes(report.bytes_used),
            fmt_bytes(report.bytes_total)
        )
        .unwrap();
    }

    output
}

pub fn render_alerts(summary: &AlertsSummary) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    writeln!(output, "{} firing / {} total", summary.firing, summary.total).unwrap();

    for alert in &summary.alerts {
        let severity = match alert.severity.as_str() {
            "critical" => alert.severity.red().bold(),
            "warning" => alert.severity.yellow(),
            _ => alert.severity.normal(),
        };
        let detail = alert
            .summary
            .as_deref()
            .map_or(String::new(), |text| format!(": {text}"));
        writeln!(output, "- [{}] {}{}", severity, alert.name, detail).unwrap();
    }

    output
}

pub fn render_backups(report: &BackupReport) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    writeln!(output, "Backups ({}, newest first):", report.backups.len()).unwrap();
    for backup in report.backups.iter().take(MAX_BACKUPS_SHOWN) {
        let phase = match backup.phase.as_str() {
            "Completed" => backup.phase.green(),
            "InProgress" | "New" => backup.phase.yellow(),
            _ => backup.phase.red(),
        };
        let mut detail = Vec::new();
        if let Some(schedule) = &backup.schedule {
            detail.push(format!("schedule {schedule}"));
        }
        if let Some(completed) = &backup.completed {
            detail.push(format!("completed {completed}"));
        }
        if backup.errors > 0 || backup.warnings > 0 {
            detail.push(format!("{} errors, {} warnings", backup.errors, backup.warnings));
        }
        let detail = if detail.is_empty() {
            String::new()
        } else {
            format!(" ({})", detail.join(", "))
        };
        writeln!(output, "- {}: {}{}", backup.name, phase, detail).unwrap();
    }
    if report.backups.len() > MAX_BACKUPS_SHOWN {
        writeln!(output, "  (+{} more)", report.backups.len() - MAX_BACKUPS_SHOWN).unwrap();
    }

    writeln!(output, "Schedules:").unwrap();
    if report.schedules.is_empty() {
        writeln!(output, "- none").unwrap();
    }
    for schedule in &report.schedules {
        let paused = if schedule.paused { " [paused]" } else { "" };
        let last = schedule
            .last_backup
            .as_deref()
            .map_or(String::new(), |last| format!(" (last backup {last})"));
        writeln!(output, "- {}: {}{}{}", schedule.name, schedule.cron, paused, last).unwrap();
    }

    writeln!(output, "Storage locations:").unwrap();
    if report.storage_locations.is_empty() {
        writeln!(output, "- none").unwrap();
    }
    for location in &report.storage_locations {
        let phase = if location.phase == "Available" {
            location.phase.green()
        } else {
            location.phase.red()
        };
        let validated = location
            .last_validated
            .as_deref()
            .map_or(String::new(), |time| format!(" (validated {time})"));
        writeln!(output, "- {}: {}{}", location.name, phase, validated).unwrap();
    }

    let freshness = &report.freshness;
    match (&freshness.latest_backup, freshness.age_hours) {
        (Some(name), Some(age)) => {
            let line = format!(
                "Freshness: latest completed backup {name} is {age}h old (threshold {}h)",
                freshness.threshold_hours
            );
            if freshness.fresh {
                writeln!(output, "{}", line.green()).unwrap();
            } else {
                writeln!(output, "{}", line.red()).unwrap();
            }
        }
        _ => {
            writeln!(
                output,
                "{}",
                "Freshness: no completed backup found".red()
            )
            .unwrap();
        }
    }

    output
}

pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn fmt_age_seconds(seconds: i64) -> String {
    if seconds < 60 {
        "<1m".to_string()
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h", seconds / 3600)
    } else {
        format!("{}d", seconds / 86_400)
    }
}
