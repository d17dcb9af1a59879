//! Startup version guard.
//!
//! Three checks run in a fixed order against a [`VersionInfo`] snapshot:
//!
//! ```text
//! START ─▶ CheckInterpreter ─▶ CheckUnknownIdentity ─▶ CheckMismatch ─▶ READY
//!                │                     │                     │
//!                └─────────────────────┴─────────────────────┴─────▶ TERMINATED
//! ```
//!
//! Evaluation stops at the first failing check. The checks are pure, so
//! [`evaluate`] and [`check`] can be called freely; [`enforce`] is the one
//! place that turns a violation into a diagnostic on stderr and a process
//! exit. It must run before the worker opens any connection.

use std::fmt;
use std::io::{self, Write};

use tracing::debug;

use crate::error::GuardViolation;
use crate::version::VersionInfo;

/// Prefix on every diagnostic line written by [`enforce`].
pub const DIAGNOSTIC_TAG: &str = "[version-guard]";

/// Exit status used for every guard failure.
pub const EXIT_CODE: i32 = 1;

/// One check in the guard sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardStage {
    CheckInterpreter,
    CheckUnknownIdentity,
    CheckMismatch,
}

impl GuardStage {
    /// Stages in evaluation order.
    pub const ORDER: [GuardStage; 3] = [
        GuardStage::CheckInterpreter,
        GuardStage::CheckUnknownIdentity,
        GuardStage::CheckMismatch,
    ];

    fn run(self, info: &VersionInfo) -> Result<(), GuardViolation> {
        // Outside production nothing is enforced.
        if !info.runtime_mode().is_production() {
            return Ok(());
        }

        match self {
            GuardStage::CheckInterpreter => {
                if info.invoked_via_interpreter() {
                    return Err(GuardViolation::InterpreterInvocationInProduction);
                }
            }
            GuardStage::CheckUnknownIdentity => {
                if !info.has_known_identity() {
                    return Err(GuardViolation::UnknownVersionInProduction);
                }
            }
            GuardStage::CheckMismatch => {
                if let Some(expected) = info.expected_sha() {
                    if expected != info.git_sha() {
                        return Err(GuardViolation::VersionMismatch {
                            expected: expected.to_string(),
                            actual: info.git_sha().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for GuardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardStage::CheckInterpreter => "interpreter-execution",
            GuardStage::CheckUnknownIdentity => "unknown-identity",
            GuardStage::CheckMismatch => "version-mismatch",
        };
        f.write_str(name)
    }
}

/// Terminal state of a guard run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Ready,
    Terminated(GuardViolation),
}

/// Which stages ran and how the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardReport {
    pub evaluated: Vec<GuardStage>,
    pub outcome: GuardOutcome,
}

impl GuardReport {
    pub fn is_ready(&self) -> bool {
        self.outcome == GuardOutcome::Ready
    }

    pub fn violation(&self) -> Option<&GuardViolation> {
        match &self.outcome {
            GuardOutcome::Ready => None,
            GuardOutcome::Terminated(v) => Some(v),
        }
    }
}

/// Runs the stages in order, stopping at the first violation.
pub fn evaluate(info: &VersionInfo) -> GuardReport {
    let mut evaluated = Vec::with_capacity(GuardStage::ORDER.len());
    for stage in GuardStage::ORDER {
        evaluated.push(stage);
        if let Err(violation) = stage.run(info) {
            return GuardReport {
                evaluated,
                outcome: GuardOutcome::Terminated(violation),
            };
        }
    }
    GuardReport {
        evaluated,
        outcome: GuardOutcome::Ready,
    }
}

/// Returns the first violation, if any.
pub fn check(info: &VersionInfo) -> Result<(), GuardViolation> {
    match evaluate(info).outcome {
        GuardOutcome::Ready => Ok(()),
        GuardOutcome::Terminated(violation) => Err(violation),
    }
}

/// Fail-fast entry point. Returns only if every check passed; otherwise
/// writes the diagnostic to stderr and exits with [`EXIT_CODE`].
pub fn enforce(info: &VersionInfo) {
    if let Err(violation) = check(info) {
        terminate(&violation);
    }
    debug!(
        git_sha = info.git_sha(),
        mode = %info.runtime_mode(),
        "Version guard passed"
    );
}

fn terminate(violation: &GuardViolation) -> ! {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    // Nothing useful can be done if stderr is gone; exit regardless.
    let _ = write_diagnostic(&mut handle, violation);
    let _ = handle.flush();
    std::process::exit(EXIT_CODE)
}

/// Writes the tagged diagnostic lines for `violation`.
pub fn write_diagnostic<W: Write>(out: &mut W, violation: &GuardViolation) -> io::Result<()> {
    for line in violation.diagnostic_lines() {
        writeln!(out, "{DIAGNOSTIC_TAG} {line}")?;
    }
    Ok(())
}

impl GuardViolation {
    /// The stage that raises this violation.
    pub fn stage(&self) -> GuardStage {
        match self {
            GuardViolation::InterpreterInvocationInProduction => GuardStage::CheckInterpreter,
            GuardViolation::UnknownVersionInProduction => GuardStage::CheckUnknownIdentity,
            GuardViolation::VersionMismatch { .. } => GuardStage::CheckMismatch,
        }
    }

    /// Untagged diagnostic lines: the failing condition, then remediation.
    pub fn diagnostic_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("FATAL ({}): {}", self.stage(), self)];
        match self {
            GuardViolation::InterpreterInvocationInProduction => {
                lines.push(
                    "The process was started through a source runner instead of the built binary."
                        .to_string(),
                );
                lines.push(
                    "Fix: run the compiled release artifact directly (no cargo run, watchers or script runners)."
                        .to_string(),
                );
            }
            GuardViolation::UnknownVersionInProduction => {
                lines.push("This artifact was built without a GIT_SHA.".to_string());
                lines.push(
                    "Fix: rebuild with GIT_SHA set (e.g. --build-arg GIT_SHA=$(git rev-parse HEAD))."
                        .to_string(),
                );
            }
            GuardViolation::VersionMismatch { expected, actual } => {
                lines.push(format!("Expected SHA: {expected}"));
                lines.push(format!("Running SHA:  {actual}"));
                lines.push(
                    "The container is running a stale build. Fix: rebuild the image and recreate the container (do not reuse it)."
                        .to_string(),
                );
            }
        }
        lines
    }
}
