//! Velero backup state and backup/restore manifests.
//!
//! Velero is driven entirely through its custom resources: listings come
//! from `kubectl get` on the velero.io types, and new backups/restores are
//! `kubectl create`d from generated manifests. The Velero server in the
//! cluster does the actual work; nothing here talks to MinIO directly (the
//! BackupStorageLocation phase is the object-store reachability signal).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::command::CommandRunner;
use crate::error::{ClusterError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct BackupStatus {
    pub name: String,
    /// `Completed`, `PartiallyFailed`, `Failed`, `InProgress`, `New`, ...
    pub phase: String,
    /// Owning schedule, if the backup was created by one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    pub errors: u64,
    pub warnings: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub name: String,
    /// Cron expression from the schedule spec.
    pub cron: String,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageLocationStatus {
    pub name: String,
    /// `Available` means Velero can reach the object store.
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreshnessAssessment {
    pub fresh: bool,
    pub threshold_hours: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub backups: Vec<BackupStatus>,
    pub schedules: Vec<ScheduleStatus>,
    pub storage_locations: Vec<StorageLocationStatus>,
    pub freshness: FreshnessAssessment,
}

/// Parameters for a manual backup. All optional: an empty request becomes a
/// whole-cluster backup named `manual-<timestamp>` with the default TTL.
#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    pub name: Option<String>,
    pub include_namespaces: Vec<String>,
    pub ttl: Option<String>,
}

pub async fn list_backups(runner: &CommandRunner, namespace: &str) -> Result<Vec<BackupStatus>> {
    let listing = runner
        .output_json(&["get", "backups.velero.io", "-n", namespace, "-o", "json"])
        .await?;
    Ok(parse_backups(&listing))
}

pub async fn list_schedules(
    runner: &CommandRunner,
    namespace: &str,
) -> Result<Vec<ScheduleStatus>> {
    let listing = runner
        .output_json(&["get", "schedules.velero.io", "-n", namespace, "-o", "json"])
        .await?;
    Ok(parse_schedules(&listing))
}

pub async fn list_storage_locations(
    runner: &CommandRunner,
    namespace: &str,
) -> Result<Vec<StorageLocationStatus>> {
    let listing = runner
        .output_json(&[
            "get",
            "backupstoragelocations.velero.io",
            "-n",
            namespace,
            "-o",
            "json",
        ])
        .await?;
    Ok(parse_storage_locations(&listing))
}

/// Full backup posture: backups, schedules, storage locations, and whether
/// the newest completed backup is recent enough.
pub async fn backup_report(
    runner: &CommandRunner,
    namespace: &str,
    freshness_hours: i64,
) -> Result<BackupReport> {
    let (backups, schedules, storage_locations) = tokio::try_join!(
        list_backups(runner, namespace),
        list_schedules(runner, namespace),
        list_storage_locations(runner, namespace),
    )?;

    let freshness = assess_freshness(&backups, freshness_hours);
    Ok(BackupReport {
        backups,
        schedules,
        storage_locations,
        freshness,
    })
}

/// Backups from a `kubectl get backups.velero.io -o json` listing, newest
/// first. Backups that never started sort last.
#[must_use]
pub fn parse_backups(listing: &Value) -> Vec<BackupStatus> {
    let mut backups = Vec::new();

    if let Some(items) = listing["items"].as_array() {
        for item in items {
            backups.push(BackupStatus {
                name: item["metadata"]["name"].as_str().unwrap_or("").to_string(),
                phase: item["status"]["phase"]
                    .as_str()
                    .unwrap_or("Unknown")
                    .to_string(),
                schedule: item["metadata"]["labels"]["velero.io/schedule-name"]
                    .as_str()
                    .map(ToString::to_string),
                started: item["status"]["startTimestamp"]
                    .as_str()
                    .map(ToString::to_string),
                completed: item["status"]["completionTimestamp"]
                    .as_str()
                    .map(ToString::to_string),
                expires: item["status"]["expiration"]
                    .as_str()
                    .map(ToString::to_string),
                errors: item["status"]["errors"].as_u64().unwrap_or(0),
                warnings: item["status"]["warnings"].as_u64().unwrap_or(0),
                included_namespaces: string_list(&item["spec"]["includedNamespaces"]),
            });
        }
    }

    backups.sort_by(|a, b| {
        let a_started = a.started.as_deref().and_then(parse_rfc3339);
        let b_started = b.started.as_deref().and_then(parse_rfc3339);
        b_started.cmp(&a_started)
    });

    backups
}

#[must_use]
pub fn parse_schedules(listing: &Value) -> Vec<ScheduleStatus> {
    let mut schedules = Vec::new();

    if let Some(items) = listing["items"].as_array() {
        for item in items {
            schedules.push(ScheduleStatus {
                name: item["metadata"]["name"].as_str().unwrap_or("").to_string(),
                cron: item["spec"]["schedule"].as_str().unwrap_or("").to_string(),
                paused: item["spec"]["paused"].as_bool().unwrap_or(false),
                last_backup: item["status"]["lastBackup"]
                    .as_str()
                    .map(ToString::to_string),
            });
        }
    }

    schedules
}

#[must_use]
pub fn parse_storage_locations(listing: &Value) -> Vec<StorageLocationStatus> {
    let mut locations = Vec::new();

    if let Some(items) = listing["items"].as_array() {
        for item in items {
            locations.push(StorageLocationStatus {
                name: item["metadata"]["name"].as_str().unwrap_or("").to_string(),
                phase: item["status"]["phase"]
                    .as_str()
                    .unwrap_or("Unknown")
                    .to_string(),
                last_validated: item["status"]["lastValidationTime"]
                    .as_str()
                    .map(ToString::to_string),
            });
        }
    }

    locations
}

#[must_use]
pub fn assess_freshness(backups: &[BackupStatus], threshold_hours: i64) -> FreshnessAssessment {
    assess_freshness_at(backups, threshold_hours, Utc::now())
}

/// Freshness relative to an explicit `now`, against the newest *completed*
/// backup. A cluster with only failed backups is never fresh.
#[must_use]
pub fn assess_freshness_at(
    backups: &[BackupStatus],
    threshold_hours: i64,
    now: DateTime<Utc>,
) -> FreshnessAssessment {
    let latest = backups
        .iter()
        .filter(|backup| backup.phase == "Completed")
        .filter_map(|backup| {
            backup
                .completed
                .as_deref()
                .and_then(parse_rfc3339)
                .map(|completed| (backup, completed))
        })
        .max_by_key(|(_, completed)| *completed);

    match latest {
        Some((backup, completed)) => {
            let age_hours = (now - completed).num_hours();
            FreshnessAssessment {
                fresh: age_hours <= threshold_hours,
                threshold_hours,
                latest_backup: Some(backup.name.clone()),
                completed_at: backup.completed.clone(),
                age_hours: Some(age_hours),
            }
        }
        None => FreshnessAssessment {
            fresh: false,
            threshold_hours,
            latest_backup: None,
            completed_at: None,
            age_hours: None,
        },
    }
}

/// Resolve a backup request into a concrete name and Backup manifest.
///
/// Errors if the TTL is not a Velero duration or any name fails DNS-1123
/// validation (kubectl would reject it later with a worse message).
pub fn prepare_backup(
    request: &BackupRequest,
    default_ttl: &str,
    velero_namespace: &str,
) -> Result<(String, Value)> {
    let ttl = request.ttl.as_deref().unwrap_or(default_ttl);
    if !valid_ttl(ttl) {
        return Err(ClusterError::InvalidArgument {
            field: "ttl".to_string(),
            reason: format!("`{ttl}` is not a Velero duration (e.g. 720h or 24h30m)"),
        });
    }

    let name = match &request.name {
        Some(name) => name.clone(),
        None => format!("manual-{}", Utc::now().format("%Y%m%d-%H%M%S")),
    };
    if !valid_name(&name) {
        return Err(ClusterError::InvalidArgument {
            field: "name".to_string(),
            reason: format!("`{name}` is not a valid resource name (lowercase DNS-1123, max 63 chars)"),
        });
    }

    for namespace in &request.include_namespaces {
        if !valid_name(namespace) {
            return Err(ClusterError::InvalidArgument {
                field: "includeNamespaces".to_string(),
                reason: format!("`{namespace}` is not a valid namespace name"),
            });
        }
    }

    let mut spec = json!({
        "ttl": ttl,
        "storageLocation": "default",
    });
    if !request.include_namespaces.is_empty() {
        spec["includedNamespaces"] = json!(request.include_namespaces);
    }

    let manifest = json!({
        "apiVersion": "velero.io/v1",
        "kind": "Backup",
        "metadata": {
            "name": name,
            "namespace": velero_namespace,
        },
        "spec": spec,
    });

    Ok((name, manifest))
}

/// Create a manual backup and return its name.
pub async fn create_backup(
    runner: &CommandRunner,
    velero_namespace: &str,
    request: &BackupRequest,
    default_ttl: &str,
) -> Result<String> {
    let (name, manifest) = prepare_backup(request, default_ttl, velero_namespace)?;
    let confirmation = runner.create_manifest(&manifest).await?;
    debug!(backup = %name, %confirmation, "created velero backup");
    Ok(name)
}

/// Resolve a restore into a concrete name and Restore manifest. The default
/// name is `<backup>-<timestamp>`, truncated to fit the 63-char limit.
pub fn prepare_restore(
    backup: &str,
    restore_name: Option<&str>,
    velero_namespace: &str,
) -> Result<(String, Value)> {
    if !valid_name(backup) {
        return Err(ClusterError::InvalidArgument {
            field: "backup".to_string(),
            reason: format!("`{backup}` is not a valid backup name"),
        });
    }

    let name = match restore_name {
        Some(name) => name.to_string(),
        None => {
            let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
            let max_prefix = 63 - timestamp.len() - 1;
            let prefix: String = backup.chars().take(max_prefix).collect();
            format!("{}-{timestamp}", prefix.trim_end_matches('-'))
        }
    };
    if !valid_name(&name) {
        return Err(ClusterError::InvalidArgument {
            field: "name".to_string(),
            reason: format!("`{name}` is not a valid resource name"),
        });
    }

    let manifest = json!({
        "apiVersion": "velero.io/v1",
        "kind": "Restore",
        "metadata": {
            "name": name,
            "namespace": velero_namespace,
        },
        "spec": {
            "backupName": backup,
        },
    });

    Ok((name, manifest))
}

/// Create a restore from an existing backup and return the restore's name.
pub async fn create_restore(
    runner: &CommandRunner,
    velero_namespace: &str,
    backup: &str,
    restore_name: Option<&str>,
) -> Result<String> {
    let (name, manifest) = prepare_restore(backup, restore_name, velero_namespace)?;
    let confirmation = runner.create_manifest(&manifest).await?;
    debug!(restore = %name, %confirmation, "created velero restore");
    Ok(name)
}

/// Render a manifest as YAML for display (dry runs, tool output).
pub fn manifest_yaml(manifest: &Value) -> Result<String> {
    Ok(serde_yaml::to_string(manifest)?)
}

/// Velero TTLs are Go durations restricted to h/m/s, e.g. `720h` or `24h30m`.
#[must_use]
pub fn valid_ttl(ttl: &str) -> bool {
    let mut pending_digits = false;
    let mut segments = 0;

    for c in ttl.chars() {
        if c.is_ascii_digit() {
            pending_digits = true;
        } else if matches!(c, 'h' | 'm' | 's') {
            if !pending_digits {
                return false;
            }
            pending_digits = false;
            segments += 1;
        } else {
            return false;
        }
    }

    segments > 0 && !pending_digits
}

/// DNS-1123 label check, the same rule the API server applies to names.
#[must_use]
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_rfc3339(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn backup_listing() -> Value {
        json!({"items": [
            {
                "metadata": {
                    "name": "manual-20250530-010203",
                    "labels": {}
                },
                "spec": {"includedNamespaces": ["media"], "ttl": "240h"},
                "status": {
                    "phase": "PartiallyFailed",
                    "startTimestamp": "2025-05-30T01:02:03Z",
                    "completionTimestamp": "2025-05-30T01:20:00Z",
                    "expiration": "2025-06-09T01:02:03Z",
                    "errors": 2,
                    "warnings": 1
                }
            },
            {
                "metadata": {
                    "name": "daily-20250601-020000",
                    "labels": {"velero.io/schedule-name": "daily"}
                },
                "spec": {},
                "status": {
                    "phase": "Completed",
                    "startTimestamp": "2025-06-01T02:00:00Z",
                    "completionTimestamp": "2025-06-01T02:14:09Z",
                    "expiration": "2025-07-01T02:00:00Z"
                }
            },
            {
                "metadata": {"name": "stuck-backup"},
                "spec": {},
                "status": {"phase": "InProgress"}
            }
        ]})
    }

    #[test]
    fn parses_and_sorts_backups_newest_first() {
        let backups = parse_backups(&backup_listing());
        assert_eq!(backups.len(), 3);
        assert_eq!(backups[0].name, "daily-20250601-020000");
        assert_eq!(backups[1].name, "manual-20250530-010203");
        // Never-started backup sorts last
        assert_eq!(backups[2].name, "stuck-backup");
    }

    #[test]
    fn backup_fields_round_trip() {
        let backups = parse_backups(&backup_listing());
        let daily = &backups[0];
        assert_eq!(daily.phase, "Completed");
        assert_eq!(daily.schedule.as_deref(), Some("daily"));
        assert_eq!(daily.errors, 0);

        let manual = &backups[1];
        assert_eq!(manual.phase, "PartiallyFailed");
        assert!(manual.schedule.is_none());
        assert_eq!(manual.errors, 2);
        assert_eq!(manual.warnings, 1);
        assert_eq!(manual.included_namespaces, vec!["media"]);
    }

    #[test]
    fn parses_schedules() {
        let listing = json!({"items": [{
            "metadata": {"name": "daily"},
            "spec": {"schedule": "0 2 * * *", "paused": false},
            "status": {"lastBackup": "2025-06-01T02:00:00Z"}
        }, {
            "metadata": {"name": "weekly"},
            "spec": {"schedule": "0 3 * * 0", "paused": true},
            "status": {}
        }]});

        let schedules = parse_schedules(&listing);
        assert_eq!(schedules[0].cron, "0 2 * * *");
        assert!(!schedules[0].paused);
        assert_eq!(
            schedules[0].last_backup.as_deref(),
            Some("2025-06-01T02:00:00Z")
        );
        assert!(schedules[1].paused);
        assert!(schedules[1].last_backup.is_none());
    }

    #[test]
    fn parses_storage_locations() {
        let listing = json!({"items": [{
            "metadata": {"name": "default"},
            "status": {"phase": "Available", "lastValidationTime": "2025-06-01T02:30:00Z"}
        }, {
            "metadata": {"name": "offsite"},
            "status": {"phase": "Unavailable"}
        }]});

        let locations = parse_storage_locations(&listing);
        assert_eq!(locations[0].phase, "Available");
        assert_eq!(locations[1].phase, "Unavailable");
        assert!(locations[1].last_validated.is_none());
    }

    #[test]
    fn fresh_backup_within_threshold() {
        let backups = parse_backups(&backup_listing());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let freshness = assess_freshness_at(&backups, 26, now);
        assert!(freshness.fresh);
        assert_eq!(freshness.latest_backup.as_deref(), Some("daily-20250601-020000"));
        assert_eq!(freshness.age_hours, Some(9));
    }

    #[test]
    fn stale_backup_beyond_threshold() {
        let backups = parse_backups(&backup_listing());
        let now = Utc.with_ymd_and_hms(2025, 6, 3, 12, 0, 0).unwrap();

        let freshness = assess_freshness_at(&backups, 26, now);
        assert!(!freshness.fresh);
        assert_eq!(freshness.age_hours, Some(57));
    }

    #[test]
    fn failed_backups_are_never_fresh() {
        let listing = json!({"items": [{
            "metadata": {"name": "bad"},
            "spec": {},
            "status": {"phase": "Failed", "startTimestamp": "2025-06-01T02:00:00Z"}
        }]});
        let backups = parse_backups(&listing);

        let freshness = assess_freshness_at(&backups, 26, Utc::now());
        assert!(!freshness.fresh);
        assert!(freshness.latest_backup.is_none());
        assert!(freshness.age_hours.is_none());
    }

    #[test]
    fn ttl_validation() {
        assert!(valid_ttl("720h"));
        assert!(valid_ttl("24h30m"));
        assert!(valid_ttl("30m"));
        assert!(valid_ttl("90s"));
        assert!(!valid_ttl(""));
        assert!(!valid_ttl("90"));
        assert!(!valid_ttl("h"));
        assert!(!valid_ttl("12x"));
        assert!(!valid_ttl("1h30"));
    }

    #[test]
    fn name_validation() {
        assert!(valid_name("manual-20250601-020000"));
        assert!(valid_name("a"));
        assert!(!valid_name(""));
        assert!(!valid_name("My-Backup"));
        assert!(!valid_name("has_underscore"));
        assert!(!valid_name("-leading"));
        assert!(!valid_name("trailing-"));
        assert!(!valid_name(&"x".repeat(64)));
    }

    #[test]
    fn prepare_backup_builds_manifest() {
        let request = BackupRequest {
            name: Some("pre-upgrade".to_string()),
            include_namespaces: vec!["media".to_string(), "home".to_string()],
            ttl: Some("240h".to_string()),
        };

        let (name, manifest) = prepare_backup(&request, "720h", "velero").unwrap();
        assert_eq!(name, "pre-upgrade");
        assert_eq!(manifest["apiVersion"], "velero.io/v1");
        assert_eq!(manifest["kind"], "Backup");
        assert_eq!(manifest["metadata"]["namespace"], "velero");
        assert_eq!(manifest["spec"]["ttl"], "240h");
        assert_eq!(manifest["spec"]["includedNamespaces"], json!(["media", "home"]));
    }

    #[test]
    fn empty_request_backs_up_whole_cluster() {
        let (name, manifest) = prepare_backup(&BackupRequest::default(), "720h", "velero").unwrap();
        assert!(name.starts_with("manual-"));
        assert!(valid_name(&name));
        assert_eq!(manifest["spec"]["ttl"], "720h");
        assert!(manifest["spec"]["includedNamespaces"].is_null());
    }

    #[test]
    fn prepare_backup_rejects_bad_input() {
        let bad_ttl = BackupRequest {
            ttl: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            prepare_backup(&bad_ttl, "720h", "velero").unwrap_err(),
            ClusterError::InvalidArgument { field, .. } if field == "ttl"
        ));

        let bad_name = BackupRequest {
            name: Some("Bad Name".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            prepare_backup(&bad_name, "720h", "velero").unwrap_err(),
            ClusterError::InvalidArgument { field, .. } if field == "name"
        ));

        let bad_namespace = BackupRequest {
            include_namespaces: vec!["Bad_NS".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            prepare_backup(&bad_namespace, "720h", "velero").unwrap_err(),
            ClusterError::InvalidArgument { field, .. } if field == "includeNamespaces"
        ));
    }

    #[test]
    fn prepare_restore_defaults_name_from_backup() {
        let (name, manifest) =
            prepare_restore("daily-20250601-020000", None, "velero").unwrap();
        assert!(name.starts_with("daily-20250601-020000-"));
        assert!(name.len() <= 63);
        assert_eq!(manifest["kind"], "Restore");
        assert_eq!(manifest["spec"]["backupName"], "daily-20250601-020000");
    }

    #[test]
    fn prepare_restore_truncates_long_backup_names() {
        let long = "b".repeat(60);
        let (name, _) = prepare_restore(&long, None, "velero").unwrap();
        assert!(name.len() <= 63);
        assert!(valid_name(&name));
    }

    #[test]
    fn prepare_restore_rejects_invalid_backup() {
        assert!(matches!(
            prepare_restore("", None, "velero").unwrap_err(),
            ClusterError::InvalidArgument { field, .. } if field == "backup"
        ));
    }

    #[test]
    fn manifest_renders_as_yaml() {
        let (_, manifest) = prepare_restore("daily-20250601-020000", Some("rehearsal"), "velero").unwrap();
        let yaml = manifest_yaml(&manifest).unwrap();
        assert!(yaml.contains("kind: Restore"));
        assert!(yaml.contains("backupName: daily-20250601-020000"));
    }
}
