use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GuardConfig;

use super::interpreter::invoked_via_interpreter;

/// Sentinel build identity meaning "no SHA was recorded for this artifact".
pub const UNKNOWN_SHA: &str = "unknown";

/// Indicator value that selects production mode.
const PRODUCTION_INDICATOR: &str = "production";

/// Whether the worker runs with production enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeMode {
    Production,
    NonProduction,
}

impl RuntimeMode {
    /// Derives the mode from the raw indicator value; only `production` counts.
    pub fn from_indicator(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case(PRODUCTION_INDICATOR) => Self::Production,
            _ => Self::NonProduction,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::NonProduction => write!(f, "non-production"),
        }
    }
}

/// Identity stamped into the binary by the build (e.g. a Docker `ARG` exported
/// before `cargo build`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStamp<'a> {
    pub git_sha: Option<&'a str>,
    pub build_date: Option<&'a str>,
}

impl BuildStamp<'static> {
    /// The values captured when this crate was compiled.
    pub fn baked() -> Self {
        Self {
            git_sha: option_env!("GIT_SHA"),
            build_date: option_env!("BUILD_DATE"),
        }
    }
}

/// Snapshot of everything the startup guard looks at.
///
/// Built once, never mutated. All accessors borrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    git_sha: String,
    build_date: Option<String>,
    expected_sha: Option<String>,
    runtime_mode: RuntimeMode,
    invoked_via_interpreter: bool,
}

impl VersionInfo {
    /// Creates a snapshot with no build date, no expectation and no shim.
    pub fn new(git_sha: impl Into<String>, runtime_mode: RuntimeMode) -> Self {
        Self {
            git_sha: git_sha.into(),
            build_date: None,
            expected_sha: None,
            runtime_mode,
            invoked_via_interpreter: false,
        }
    }

    pub fn with_build_date(mut self, build_date: impl Into<String>) -> Self {
        self.build_date = Some(build_date.into());
        self
    }

    pub fn with_expected_sha(mut self, expected_sha: impl Into<String>) -> Self {
        self.expected_sha = Some(expected_sha.into());
        self
    }

    pub fn with_interpreter(mut self, invoked_via_interpreter: bool) -> Self {
        self.invoked_via_interpreter = invoked_via_interpreter;
        self
    }

    /// Reads the live process arguments and environment exactly once.
    pub fn capture(config: &GuardConfig) -> Self {
        let args: Vec<String> = std::env::args_os()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        Self::from_sources(
            config,
            &args,
            |key| std::env::var(key).ok(),
            BuildStamp::baked(),
        )
    }

    /// Builds the snapshot from explicit inputs.
    ///
    /// The git SHA resolves runtime variable, then build stamp, then
    /// [`UNKNOWN_SHA`]. Blank values count as unset.
    pub fn from_sources<F>(
        config: &GuardConfig,
        args: &[String],
        lookup: F,
        stamp: BuildStamp<'_>,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| non_blank(lookup(key).as_deref());

        let git_sha = read(&config.sha_var)
            .or_else(|| non_blank(stamp.git_sha))
            .unwrap_or_else(|| UNKNOWN_SHA.to_string());
        let build_date =
            read(&config.build_date_var).or_else(|| non_blank(stamp.build_date));

        Self {
            git_sha,
            build_date,
            expected_sha: read(&config.expected_sha_var),
            runtime_mode: RuntimeMode::from_indicator(lookup(&config.mode_var).as_deref()),
            invoked_via_interpreter: invoked_via_interpreter(
                args,
                &config.interpreter_markers,
                &lookup,
            ),
        }
    }

    pub fn git_sha(&self) -> &str {
        &self.git_sha
    }

    pub fn build_date(&self) -> Option<&str> {
        self.build_date.as_deref()
    }

    pub fn expected_sha(&self) -> Option<&str> {
        self.expected_sha.as_deref()
    }

    pub fn runtime_mode(&self) -> RuntimeMode {
        self.runtime_mode
    }

    pub fn invoked_via_interpreter(&self) -> bool {
        self.invoked_via_interpreter
    }

    /// True unless the SHA is the [`UNKNOWN_SHA`] sentinel.
    pub fn has_known_identity(&self) -> bool {
        self.git_sha != UNKNOWN_SHA
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn capture_with(pairs: &[(&str, &str)], args: &[&str], stamp: BuildStamp<'_>) -> VersionInfo {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        VersionInfo::from_sources(
            &GuardConfig::default(),
            &args,
            |key| env.get(key).cloned(),
            stamp,
        )
    }

    #[test]
    fn test_runtime_mode_indicator() {
        assert_eq!(
            RuntimeMode::from_indicator(Some("production")),
            RuntimeMode::Production
        );
        assert_eq!(
            RuntimeMode::from_indicator(Some(" Production\n")),
            RuntimeMode::Production
        );
        assert_eq!(
            RuntimeMode::from_indicator(Some("staging")),
            RuntimeMode::NonProduction
        );
        assert_eq!(
            RuntimeMode::from_indicator(Some("prod")),
            RuntimeMode::NonProduction
        );
        assert_eq!(RuntimeMode::from_indicator(None), RuntimeMode::NonProduction);
    }

    #[test]
    fn test_empty_environment_yields_unknown_non_production() {
        let info = capture_with(&[], &["/app/worker"], BuildStamp::default());

        assert_eq!(info.git_sha(), UNKNOWN_SHA);
        assert!(!info.has_known_identity());
        assert_eq!(info.build_date(), None);
        assert_eq!(info.expected_sha(), None);
        assert_eq!(info.runtime_mode(), RuntimeMode::NonProduction);
        assert!(!info.invoked_via_interpreter());
    }

    #[test]
    fn test_runtime_sha_preferred_over_stamp() {
        let stamp = BuildStamp {
            git_sha: Some("baked00"),
            build_date: Some("2026-01-01T00:00:00Z"),
        };
        let info = capture_with(&[("GIT_SHA", "abc123")], &["/app/worker"], stamp);
        assert_eq!(info.git_sha(), "abc123");
        assert_eq!(info.build_date(), Some("2026-01-01T00:00:00Z"));

        let info = capture_with(&[("GIT_SHA", "  ")], &["/app/worker"], stamp);
        assert_eq!(info.git_sha(), "baked00");
    }

    #[test]
    fn test_blank_expectation_means_no_enforcement() {
        let info = capture_with(
            &[("GIT_SHA", "abc123"), ("EXPECTED_GIT_SHA", "")],
            &["/app/worker"],
            BuildStamp::default(),
        );
        assert_eq!(info.expected_sha(), None);

        let info = capture_with(
            &[("GIT_SHA", "abc123"), ("EXPECTED_GIT_SHA", " def456 ")],
            &["/app/worker"],
            BuildStamp::default(),
        );
        assert_eq!(info.expected_sha(), Some("def456"));
    }

    #[test]
    fn test_interpreter_flag_captured() {
        let info = capture_with(
            &[("APP_ENV", "production")],
            &["/usr/bin/rust-script", "worker.rs"],
            BuildStamp::default(),
        );
        assert!(info.invoked_via_interpreter());
        assert!(info.runtime_mode().is_production());
    }

    #[test]
    fn test_custom_variable_names() {
        let config = GuardConfig {
            mode_var: "NODE_ENV".to_string(),
            sha_var: "SOURCE_COMMIT".to_string(),
            ..GuardConfig::default()
        };
        let env: HashMap<&str, &str> =
            HashMap::from([("NODE_ENV", "production"), ("SOURCE_COMMIT", "feed42")]);
        let info = VersionInfo::from_sources(
            &config,
            &["/app/worker".to_string()],
            |key| env.get(key).map(|v| v.to_string()),
            BuildStamp::default(),
        );
        assert_eq!(info.git_sha(), "feed42");
        assert_eq!(info.runtime_mode(), RuntimeMode::Production);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let info = VersionInfo::new("abc123", RuntimeMode::Production).with_expected_sha("abc123");
        let json = serde_json::to_value(&info).expect("snapshot should serialize");
        assert_eq!(json["gitSha"], "abc123");
        assert_eq!(json["expectedSha"], "abc123");
        assert_eq!(json["runtimeMode"], "production");
        assert_eq!(json["invokedViaInterpreter"], false);
    }

    #[test]
    fn test_runtime_mode_json_matches_display() {
        for mode in [RuntimeMode::Production, RuntimeMode::NonProduction] {
            let json = serde_json::to_value(mode).expect("mode should serialize");
            assert_eq!(json, serde_json::Value::String(mode.to_string()));
        }
    }
}
