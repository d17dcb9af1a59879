//! Guard and registration configuration.
//!
//! Settings come from three layers, applied in order: built-in defaults, an
//! optional YAML file, then `WORKER_GUARD_*` environment variables. CLI flags
//! are applied last by the caller.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Registrations expire after 24 hours unless refreshed by a restart.
pub const DEFAULT_REGISTRATION_TTL_SECS: u64 = 86_400;

/// Shim executables that indicate a source-level run instead of a built artifact.
pub const DEFAULT_INTERPRETER_MARKERS: &[&str] =
    &["cargo", "cargo-watch", "rust-script", "cargo-script", "bacon"];

/// Configuration for the startup guard and the post-guard registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    // Registration settings
    /// Role identifier of this worker, used to scope the registration key.
    pub role: String,
    /// Redis connection URL of the shared backing store.
    pub redis_url: String,
    /// Leading segment of the registration key.
    pub key_namespace: String,
    /// Trailing segment of the registration key.
    pub key_suffix: String,
    /// Expiry applied to every registration.
    pub registration_ttl_secs: u64,
    /// Upper bound on how long a registration attempt may take.
    pub registration_timeout_secs: u64,

    // Snapshot inputs
    /// Variable whose value `production` selects production mode.
    pub mode_var: String,
    /// Variable carrying the artifact's own git SHA.
    pub sha_var: String,
    /// Variable carrying the artifact's build timestamp.
    pub build_date_var: String,
    /// Variable carrying the SHA the deployment expects.
    pub expected_sha_var: String,
    /// Executable names that mark an interpreter/shim invocation.
    pub interpreter_markers: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            role: "worker".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            key_namespace: "worker".to_string(),
            key_suffix: "version".to_string(),
            registration_ttl_secs: DEFAULT_REGISTRATION_TTL_SECS,
            registration_timeout_secs: 5,

            mode_var: "APP_ENV".to_string(),
            sha_var: "GIT_SHA".to_string(),
            build_date_var: "BUILD_DATE".to_string(),
            expected_sha_var: "EXPECTED_GIT_SHA".to_string(),
            interpreter_markers: DEFAULT_INTERPRETER_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl GuardConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from defaults plus environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WORKER_GUARD_ROLE`: Worker role (default: worker)
    /// - `WORKER_GUARD_REDIS_URL`: Redis URL, falling back to `REDIS_URL`
    /// - `WORKER_GUARD_KEY_NAMESPACE`: Key namespace (default: worker)
    /// - `WORKER_GUARD_KEY_SUFFIX`: Key suffix (default: version)
    /// - `WORKER_GUARD_TTL_SECS`: Registration expiry (default: 86400)
    /// - `WORKER_GUARD_REGISTRATION_TIMEOUT_SECS`: Registration timeout (default: 5)
    /// - `WORKER_GUARD_INTERPRETER_MARKERS`: Comma-separated shim names
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Loads a YAML configuration file, then applies environment overrides.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_file_with(path, |key| std::env::var(key).ok())
    }

    /// Loads a YAML configuration file, then applies overrides read through
    /// `lookup`.
    pub fn from_yaml_file_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)?.with_env_overrides(lookup)
    }

    /// Parses YAML; keys left out keep their defaults. Not validated yet.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Applies `WORKER_GUARD_*` overrides read through `lookup`, then validates.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("WORKER_GUARD_ROLE") {
            self.role = val;
        }

        if let Some(val) = lookup("WORKER_GUARD_REDIS_URL").or_else(|| lookup("REDIS_URL")) {
            self.redis_url = val;
        }

        if let Some(val) = lookup("WORKER_GUARD_KEY_NAMESPACE") {
            self.key_namespace = val;
        }

        if let Some(val) = lookup("WORKER_GUARD_KEY_SUFFIX") {
            self.key_suffix = val;
        }

        if let Some(val) = lookup("WORKER_GUARD_TTL_SECS") {
            self.registration_ttl_secs = parse_env_value(&val, "WORKER_GUARD_TTL_SECS")?;
        }

        if let Some(val) = lookup("WORKER_GUARD_REGISTRATION_TIMEOUT_SECS") {
            self.registration_timeout_secs =
                parse_env_value(&val, "WORKER_GUARD_REGISTRATION_TIMEOUT_SECS")?;
        }

        if let Some(val) = lookup("WORKER_GUARD_INTERPRETER_MARKERS") {
            self.interpreter_markers = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("role", &self.role),
            ("key_namespace", &self.key_namespace),
            ("key_suffix", &self.key_suffix),
        ] {
            validate_key_segment(name, value)?;
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.registration_ttl_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "registration_ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.registration_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "registration_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("mode_var", &self.mode_var),
            ("sha_var", &self.sha_var),
            ("build_date_var", &self.build_date_var),
            ("expected_sha_var", &self.expected_sha_var),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        Ok(())
    }

    /// Registration key for this worker's role.
    pub fn registration_key(&self) -> String {
        self.registration_key_for(&self.role)
    }

    /// Registration key for an arbitrary role, e.g. `worker:rule-engine:version`.
    pub fn registration_key_for(&self, role: &str) -> String {
        format!("{}:{}:{}", self.key_namespace, role, self.key_suffix)
    }

    /// Expiry applied to registrations.
    pub fn registration_ttl(&self) -> Duration {
        Duration::from_secs(self.registration_ttl_secs)
    }

    /// Bound on a single registration attempt.
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    /// Checks a role name supplied outside the config (e.g. `status --role`)
    /// with the same rules as `role`.
    pub fn validate_role(role: &str) -> Result<(), ConfigError> {
        validate_key_segment("role", role)
    }

    /// Builder method to set the worker role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Builder method to set the key namespace.
    pub fn with_key_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.key_namespace = namespace.into();
        self
    }

    /// Builder method to set the registration timeout.
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Builder method to set the interpreter markers.
    pub fn with_interpreter_markers(mut self, markers: Vec<String>) -> Self {
        self.interpreter_markers = markers;
        self
    }
}

fn validate_key_segment(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{name} cannot be empty"
        )));
    }
    if value.contains(':') {
        return Err(ConfigError::ValidationFailed(format!(
            "{name} cannot contain ':' (it is a key separator)"
        )));
    }
    Ok(())
}

/// Parses an environment value into the requested type.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
