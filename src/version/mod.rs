//! Immutable version snapshot taken once at process start.
//!
//! Everything the startup guard decides on is gathered here in a single step:
//! the argument list, the runtime-mode indicator, the artifact's own build
//! identity and the identity the deployment expects. After
//! [`VersionInfo::capture`] returns, nothing else reads the environment.

pub mod info;
pub mod interpreter;

pub use info::{RuntimeMode, VersionInfo, UNKNOWN_SHA};
pub use interpreter::invoked_via_interpreter;
