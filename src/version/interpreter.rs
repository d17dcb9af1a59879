//! Detection of source-level execution shims.
//!
//! A production worker must run the artifact that was built and reviewed. When
//! it is started through `cargo run`, a watcher, or a script runner, the code
//! being executed is whatever sits in the working tree.

use std::path::Path;

/// Variables `cargo run` exports into the child process.
const CARGO_RUN_SIGNATURE: &[&str] = &["CARGO", "CARGO_MANIFEST_DIR"];

/// Returns true if the process looks like it was launched through a shim.
///
/// Two signals are checked: argv[0] naming one of `markers`, and the
/// environment `cargo run` leaves behind. Later arguments are option values
/// and never count, so `--role cargo` is not a shim.
pub fn invoked_via_interpreter<F>(args: &[String], markers: &[String], lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    args.first().is_some_and(|program| is_marker(program, markers))
        || CARGO_RUN_SIGNATURE
            .iter()
            .all(|var| lookup(var).is_some_and(|v| !v.is_empty()))
}

fn is_marker(arg: &str, markers: &[String]) -> bool {
    let Some(name) = Path::new(arg).file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.strip_suffix(".exe").unwrap_or(name);
    markers.iter().any(|m| m == name)
}
