use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::version::VersionInfo;

const FIELD_GIT_SHA: &str = "gitSha";
const FIELD_BUILD_DATE: &str = "buildDate";
const FIELD_STARTED_AT: &str = "startedAt";
const FIELD_PID: &str = "pid";

/// What a worker publishes about itself after passing the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub git_sha: String,
    /// Empty when the build carried no date.
    pub build_date: String,
    /// RFC 3339, UTC.
    pub started_at: String,
    pub pid: u32,
}

impl VersionRecord {
    /// Record for the current process, stamped now.
    pub fn for_current_process(info: &VersionInfo) -> Self {
        Self::at(info, Utc::now(), std::process::id())
    }

    pub fn at(info: &VersionInfo, started_at: DateTime<Utc>, pid: u32) -> Self {
        Self {
            git_sha: info.git_sha().to_string(),
            build_date: info.build_date().unwrap_or_default().to_string(),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            pid,
        }
    }

    /// Hash field/value pairs as stored in Redis.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (FIELD_GIT_SHA, self.git_sha.clone()),
            (FIELD_BUILD_DATE, self.build_date.clone()),
            (FIELD_STARTED_AT, self.started_at.clone()),
            (FIELD_PID, self.pid.to_string()),
        ]
    }

    /// Rebuilds a record from a hash read at `key`.
    ///
    /// An empty hash means the key is absent or expired and yields `None`.
    pub fn from_fields(
        key: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Option<Self>, RegistryError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::MalformedRecord {
                    key: key.to_string(),
                    reason: format!("missing field '{name}'"),
                })
        };

        let pid_raw = field(FIELD_PID)?;
        let pid = pid_raw
            .parse()
            .map_err(|_| RegistryError::MalformedRecord {
                key: key.to_string(),
                reason: format!("pid '{pid_raw}' is not a process id"),
            })?;

        Ok(Some(Self {
            git_sha: field(FIELD_GIT_SHA)?,
            build_date: fields.get(FIELD_BUILD_DATE).cloned().unwrap_or_default(),
            started_at: field(FIELD_STARTED_AT)?,
            pid,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::RuntimeMode;
    use chrono::TimeZone;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 12).unwrap()
    }

    #[test]
    fn test_record_from_snapshot() {
        let info = VersionInfo::new("abc123", RuntimeMode::Production)
            .with_build_date("2026-10-01T12:00:00Z");
        let record = VersionRecord::at(&info, started(), 4711);

        assert_eq!(record.git_sha, "abc123");
        assert_eq!(record.build_date, "2026-10-01T12:00:00Z");
        assert_eq!(record.started_at, "2026-10-17T08:30:12.000Z");
        assert_eq!(record.pid, 4711);
    }

    #[test]
    fn test_missing_build_date_is_empty() {
        let info = VersionInfo::new("abc123", RuntimeMode::NonProduction);
        let record = VersionRecord::at(&info, started(), 1);
        assert_eq!(record.build_date, "");
    }

    #[test]
    fn test_fields_use_wire_names() {
        let info = VersionInfo::new("abc123", RuntimeMode::Production);
        let fields = VersionRecord::at(&info, started(), 42).to_fields();
        let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["gitSha", "buildDate", "startedAt", "pid"]);
        assert_eq!(fields[3].1, "42");
    }

    #[test]
    fn test_empty_hash_is_absent() {
        let parsed = VersionRecord::from_fields("worker:api:version", &HashMap::new())
            .expect("empty hash is not an error");
        assert!(parsed.is_none());
    }

    #[test]
    fn test_malformed_hash_rejected() {
        let fields = HashMap::from([
            ("gitSha".to_string(), "abc123".to_string()),
            ("startedAt".to_string(), "2026-10-17T08:30:12.000Z".to_string()),
            ("pid".to_string(), "not-a-pid".to_string()),
        ]);
        let err = VersionRecord::from_fields("worker:api:version", &fields).unwrap_err();
        assert!(err.to_string().contains("not-a-pid"));

        let fields = HashMap::from([("pid".to_string(), "7".to_string())]);
        let err = VersionRecord::from_fields("worker:api:version", &fields).unwrap_err();
        assert!(err.to_string().contains("gitSha"));
    }

    #[test]
    fn test_json_uses_camel_case() {
        let info = VersionInfo::new("abc123", RuntimeMode::Production);
        let json = serde_json::to_value(VersionRecord::at(&info, started(), 9))
            .expect("record should serialize");
        assert_eq!(json["gitSha"], "abc123");
        assert_eq!(json["startedAt"], "2026-10-17T08:30:12.000Z");
        assert_eq!(json["pid"], 9);
    }
}
