//! Best-effort, fire-and-forget registration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::record::VersionRecord;
use super::store::VersionStore;
use crate::error::RegistryError;

/// How a registration attempt ended. None of these stop the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered { key: String },
    Failed { key: String, reason: String },
    TimedOut { key: String, after: Duration },
}

impl RegistrationOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationOutcome::Registered { .. })
    }

    pub fn key(&self) -> &str {
        match self {
            RegistrationOutcome::Registered { key }
            | RegistrationOutcome::Failed { key, .. }
            | RegistrationOutcome::TimedOut { key, .. } => key,
        }
    }
}

/// Writes `record` at `key`, bounded by `timeout`. Never returns an error:
/// failures are logged at `warn` and reported in the outcome.
pub async fn register_best_effort(
    store: &dyn VersionStore,
    key: &str,
    record: &VersionRecord,
    ttl: Duration,
    timeout: Duration,
) -> RegistrationOutcome {
    let attempt = tokio::time::timeout(timeout, store.put(key, record, ttl)).await;

    match attempt {
        Ok(Ok(())) => {
            info!(
                key,
                git_sha = %record.git_sha,
                pid = record.pid,
                ttl_secs = ttl.as_secs(),
                "Registered worker version"
            );
            RegistrationOutcome::Registered {
                key: key.to_string(),
            }
        }
        Ok(Err(e)) => {
            warn!(key, error = %e, "Version registration failed (non-fatal)");
            RegistrationOutcome::Failed {
                key: key.to_string(),
                reason: e.to_string(),
            }
        }
        Err(_) => {
            let e = RegistryError::Timeout(timeout);
            warn!(key, error = %e, "Version registration failed (non-fatal)");
            RegistrationOutcome::TimedOut {
                key: key.to_string(),
                after: timeout,
            }
        }
    }
}

/// Runs [`register_best_effort`] on its own task so the caller can start
/// processing jobs immediately.
pub fn spawn_registration(
    store: Arc<dyn VersionStore>,
    key: String,
    record: VersionRecord,
    ttl: Duration,
    timeout: Duration,
) -> JoinHandle<RegistrationOutcome> {
    tokio::spawn(async move {
        register_best_effort(store.as_ref(), &key, &record, ttl, timeout).await
    })
}
