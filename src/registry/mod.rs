//! Version registration in the shared backing store.
//!
//! Once the startup guard has passed, each worker records which build it is
//! running under a role-scoped key:
//!
//! ```text
//! worker:{role}:version  (hash, EXPIRE 86400)
//!   gitSha     abc123...
//!   buildDate  2026-10-01T12:00:00Z
//!   startedAt  2026-10-17T08:30:12.114Z
//!   pid        4711
//! ```
//!
//! Registration is monitoring-only. Enforcement already happened in the
//! guard, so a store outage is logged and otherwise ignored. The records feed
//! [`inspect_roles`], which reports workers still running a stale build after
//! a deploy.

pub mod drift;
pub mod record;
pub mod register;
pub mod store;

pub use drift::{inspect_roles, RoleReport, RoleStatus};
pub use record::VersionRecord;
pub use register::{register_best_effort, spawn_registration, RegistrationOutcome};
pub use store::{MemoryVersionStore, RedisVersionStore, VersionStore};
