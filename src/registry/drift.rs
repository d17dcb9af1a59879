//! Stale-worker detection across roles.
//!
//! After a deploy declares a new expected SHA, every role should re-register
//! with that SHA. Roles still showing an older SHA are running a container
//! that was not recreated.

use serde::Serialize;

use super::record::VersionRecord;
use super::store::VersionStore;
use crate::config::GuardConfig;
use crate::error::RegistryError;

/// Classification of one role's registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoleStatus {
    /// Registered SHA equals the expectation.
    Matches,
    /// Registered SHA differs from the expectation.
    Drifted { expected: String, actual: String },
    /// Registered, but no expectation to compare against.
    Unchecked,
    /// No record, or it expired.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleReport {
    pub role: String,
    pub key: String,
    #[serde(flatten)]
    pub status: RoleStatus,
    pub record: Option<VersionRecord>,
}

impl RoleReport {
    /// Drifted and missing roles need an operator.
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, RoleStatus::Matches | RoleStatus::Unchecked)
    }
}

/// Reads each role's registration and compares it with `expected`.
///
/// # Errors
///
/// Returns the first store error; unlike registration this is an operator
/// query and an unreachable store is worth reporting.
pub async fn inspect_roles(
    store: &dyn VersionStore,
    config: &GuardConfig,
    roles: &[String],
    expected: Option<&str>,
) -> Result<Vec<RoleReport>, RegistryError> {
    let mut reports = Vec::with_capacity(roles.len());

    for role in roles {
        let key = config.registration_key_for(role);
        let record = store.get(&key).await?;

        let status = match (&record, expected) {
            (None, _) => RoleStatus::Missing,
            (Some(_), None) => RoleStatus::Unchecked,
            (Some(r), Some(exp)) if r.git_sha == exp => RoleStatus::Matches,
            (Some(r), Some(exp)) => RoleStatus::Drifted {
                expected: exp.to_string(),
                actual: r.git_sha.clone(),
            },
        };

        reports.push(RoleReport {
            role: role.clone(),
            key,
            status,
            record,
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::store::MemoryVersionStore;
    use std::time::Duration;

    fn record(sha: &str) -> VersionRecord {
        VersionRecord {
            git_sha: sha.to_string(),
            build_date: String::new(),
            started_at: "2026-10-17T08:30:12.000Z".to_string(),
            pid: 1,
        }
    }

    async fn seeded_store(config: &GuardConfig) -> MemoryVersionStore {
        let store = MemoryVersionStore::new();
        for (role, sha) in [("api", "abc123"), ("scheduler", "0ld5ha")] {
            store
                .put(
                    &config.registration_key_for(role),
                    &record(sha),
                    Duration::from_secs(60),
                )
                .await
                .expect("seed put");
        }
        store
    }

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_classifies_each_role() {
        let config = GuardConfig::default();
        let store = seeded_store(&config).await;

        let reports = inspect_roles(
            &store,
            &config,
            &roles(&["api", "scheduler", "ingest"]),
            Some("abc123"),
        )
        .await
        .expect("inspection should succeed");

        assert_eq!(reports[0].status, RoleStatus::Matches);
        assert_eq!(reports[0].key, "worker:api:version");
        assert_eq!(
            reports[1].status,
            RoleStatus::Drifted {
                expected: "abc123".to_string(),
                actual: "0ld5ha".to_string(),
            }
        );
        assert_eq!(reports[2].status, RoleStatus::Missing);
        assert!(reports[2].record.is_none());

        let healthy: Vec<bool> = reports.iter().map(RoleReport::is_healthy).collect();
        assert_eq!(healthy, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_without_expectation_roles_are_unchecked() {
        let config = GuardConfig::default();
        let store = seeded_store(&config).await;

        let reports = inspect_roles(&store, &config, &roles(&["api", "scheduler"]), None)
            .await
            .expect("inspection should succeed");

        assert!(reports.iter().all(|r| r.status == RoleStatus::Unchecked));
        assert!(reports.iter().all(RoleReport::is_healthy));
    }

    #[tokio::test]
    async fn test_report_json_shape() {
        let config = GuardConfig::default();
        let store = seeded_store(&config).await;

        let reports = inspect_roles(&store, &config, &roles(&["scheduler"]), Some("abc123"))
            .await
            .expect("inspection should succeed");
        let json = serde_json::to_value(&reports[0]).expect("report should serialize");

        assert_eq!(json["role"], "scheduler");
        assert_eq!(json["status"], "drifted");
        assert_eq!(json["actual"], "0ld5ha");
        assert_eq!(json["record"]["gitSha"], "0ld5ha");
    }
}
