//! Worker entry sequence: snapshot, guard, then registration.
//!
//! ```rust,ignore
//! use worker_guard::{config::GuardConfig, startup};
//!
//! let config = GuardConfig::from_env()?.with_role("rule-engine");
//! // Exits the process here if the build is wrong.
//! let started = startup::run_guarded(&config);
//! // Safe to connect to the queue and start consuming jobs.
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GuardConfig;
use crate::error::RegistryError;
use crate::guard;
use crate::registry::{
    register_best_effort, RedisVersionStore, RegistrationOutcome, VersionRecord, VersionStore,
};
use crate::version::VersionInfo;

/// A worker that passed the guard.
pub struct StartedWorker {
    pub info: VersionInfo,
    /// Background connect-and-register task. Never fails the worker.
    pub registration: JoinHandle<RegistrationOutcome>,
}

/// Captures the snapshot and enforces the guard (exiting on violation), then
/// returns at once. Connecting to Redis and writing the record both happen on
/// a spawned task.
///
/// Must be called from within a tokio runtime.
pub fn run_guarded(config: &GuardConfig) -> StartedWorker {
    let info = VersionInfo::capture(config);
    guard::enforce(&info);

    let redis_url = config.redis_url.clone();
    let registration = register_with(config, &info, move || connect_redis(redis_url));
    StartedWorker { info, registration }
}

/// Spawns registration of `info` under the configured role into an already
/// open store.
pub fn register_in_background(
    config: &GuardConfig,
    info: &VersionInfo,
    store: Arc<dyn VersionStore>,
) -> JoinHandle<RegistrationOutcome> {
    register_with(config, info, move || async move { Ok(store) })
}

/// Spawns a task that opens a store through `connect` and registers `info`.
///
/// The connect and the write are each bounded by the registration timeout. A
/// failed or slow connect is logged and reported as the task's outcome.
pub fn register_with<C, Fut>(
    config: &GuardConfig,
    info: &VersionInfo,
    connect: C,
) -> JoinHandle<RegistrationOutcome>
where
    C: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn VersionStore>, RegistryError>> + Send + 'static,
{
    let key = config.registration_key();
    let record = VersionRecord::for_current_process(info);
    let ttl = config.registration_ttl();
    let timeout = config.registration_timeout();

    info!(
        role = %config.role,
        key = %key,
        git_sha = info.git_sha(),
        "Registering worker version"
    );

    tokio::spawn(async move {
        let store = match tokio::time::timeout(timeout, connect()).await {
            Ok(Ok(store)) => store,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Skipping version registration (non-fatal)");
                return RegistrationOutcome::Failed {
                    key,
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    key = %key,
                    ?timeout,
                    "Skipping version registration: Redis connect timed out (non-fatal)"
                );
                return RegistrationOutcome::TimedOut {
                    key,
                    after: timeout,
                };
            }
        };

        register_best_effort(store.as_ref(), &key, &record, ttl, timeout).await
    })
}

async fn connect_redis(redis_url: String) -> Result<Arc<dyn VersionStore>, RegistryError> {
    let store = RedisVersionStore::connect(&redis_url).await?;
    Ok(Arc::new(store) as Arc<dyn VersionStore>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryVersionStore;
    use crate::version::RuntimeMode;
    use std::time::Duration;

    fn passing_info() -> VersionInfo {
        VersionInfo::new("abc123", RuntimeMode::Production).with_expected_sha("abc123")
    }

    #[tokio::test]
    async fn test_background_registration_uses_role_key() {
        let config = GuardConfig::new().with_role("rule-engine");
        let info = passing_info();
        assert!(guard::check(&info).is_ok());

        let store = Arc::new(MemoryVersionStore::new());
        let outcome = register_in_background(&config, &info, store.clone())
            .await
            .expect("registration task should not panic");

        assert_eq!(outcome.key(), "worker:rule-engine:version");
        let record = store
            .get("worker:rule-engine:version")
            .await
            .expect("get")
            .expect("record should exist");
        assert_eq!(record.git_sha, "abc123");
        assert_eq!(record.pid, std::process::id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_connect_does_not_block_caller() {
        let config = GuardConfig::new()
            .with_role("rule-engine")
            .with_registration_timeout(Duration::from_secs(5));

        let handle = register_with(&config, &passing_info(), || {
            std::future::pending::<Result<Arc<dyn VersionStore>, RegistryError>>()
        });
        // The caller already has control while the connect is still pending.
        assert!(!handle.is_finished());

        let outcome = handle.await.expect("registration task should not panic");
        assert_eq!(
            outcome,
            RegistrationOutcome::TimedOut {
                key: "worker:rule-engine:version".to_string(),
                after: Duration::from_secs(5),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_reported_not_fatal() {
        // Port 1 on localhost refuses connections.
        let config = GuardConfig::new()
            .with_role("api")
            .with_redis_url("redis://127.0.0.1:1");
        let redis_url = config.redis_url.clone();

        let outcome = register_with(&config, &passing_info(), move || connect_redis(redis_url))
            .await
            .expect("registration task should not panic");

        assert!(!outcome.is_registered());
        assert_eq!(outcome.key(), "worker:api:version");
    }
}
