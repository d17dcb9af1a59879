//! worker-guard: startup version-integrity guard for queue workers.
//!
//! A worker calls into this crate before opening any connection. The guard
//! takes one immutable snapshot of arguments and environment, then refuses to
//! continue (by exiting the process) when a production worker is running
//! through a source runner, carries no build SHA, or carries a SHA other than
//! the one the deployment expects. Workers that pass register their version in
//! Redis so stale containers can be spotted after a deploy.

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod registry;
pub mod startup;
pub mod version;

pub use error::{ConfigError, GuardViolation, RegistryError};
