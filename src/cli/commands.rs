//! CLI command definitions for worker-guard.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::GuardConfig;
use crate::guard;
use crate::registry::{
    inspect_roles, RedisVersionStore, RegistrationOutcome, RoleReport, RoleStatus,
};
use crate::startup;
use crate::version::VersionInfo;

/// Startup version-integrity guard for queue workers.
#[derive(Parser, Debug)]
#[command(name = "worker-guard")]
#[command(about = "Fail fast when a worker runs a stale or unidentified build")]
#[command(version)]
#[command(
    long_about = "worker-guard checks, before a worker connects to anything, that it runs a compiled artifact with a known git SHA matching the SHA the deployment expects.\n\nExample usage:\n  APP_ENV=production GIT_SHA=abc123 EXPECTED_GIT_SHA=abc123 worker-guard register --role rule-engine"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file (environment variables still override it).
    #[arg(short, long, global = true, env = "WORKER_GUARD_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the startup guard and print the version snapshot.
    Check(CheckArgs),

    /// Run the startup guard, then register this build under a role.
    Register(RegisterArgs),

    /// Report which roles are registered with a build other than the expected one.
    Status(StatusArgs),
}

/// Arguments for `worker-guard check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Print the snapshot as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `worker-guard register`.
#[derive(Parser, Debug)]
pub struct RegisterArgs {
    /// Worker role used in the registration key.
    #[arg(short, long)]
    pub role: Option<String>,

    /// Redis connection URL.
    #[arg(long)]
    pub redis_url: Option<String>,
}

/// Arguments for `worker-guard status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Roles to inspect (repeatable).
    #[arg(short, long = "role", required = true)]
    pub roles: Vec<String>,

    /// SHA every role should be running.
    #[arg(long, env = "EXPECTED_GIT_SHA")]
    pub expected: Option<String>,

    /// Redis connection URL.
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check(args) => run_check_command(&config, args),
        Commands::Register(args) => run_register_command(config, args).await,
        Commands::Status(args) => run_status_command(config, args).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<GuardConfig> {
    match path {
        Some(path) => GuardConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => GuardConfig::from_env().context("Invalid WORKER_GUARD_* environment"),
    }
}

fn run_check_command(config: &GuardConfig, args: CheckArgs) -> anyhow::Result<()> {
    let info = VersionInfo::capture(config);
    guard::enforce(&info);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_snapshot(&info);
    }
    Ok(())
}

async fn run_register_command(mut config: GuardConfig, args: RegisterArgs) -> anyhow::Result<()> {
    if let Some(role) = args.role {
        config.role = role;
    }
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }
    config.validate()?;

    let started = startup::run_guarded(&config);
    print_snapshot(&started.info);

    let outcome = started
        .registration
        .await
        .context("Registration task panicked")?;

    match outcome {
        RegistrationOutcome::Registered { key } => {
            println!("Registered:     {key}");
        }
        RegistrationOutcome::Failed { key, reason } => {
            println!("Not registered: {key} ({reason})");
        }
        RegistrationOutcome::TimedOut { key, after } => {
            println!("Not registered: {key} (timed out after {after:?})");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    expected: Option<&'a str>,
    healthy: bool,
    roles: &'a [RoleReport],
}

async fn run_status_command(mut config: GuardConfig, args: StatusArgs) -> anyhow::Result<()> {
    for role in &args.roles {
        GuardConfig::validate_role(role)?;
    }
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }
    let expected = args
        .expected
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let store = RedisVersionStore::connect(&config.redis_url)
        .await
        .with_context(|| format!("Cannot reach {}", config.redis_url))?;
    let reports = inspect_roles(&store, &config, &args.roles, expected).await?;
    let unhealthy = reports.iter().filter(|r| !r.is_healthy()).count();

    if args.json {
        let output = StatusOutput {
            expected,
            healthy: unhealthy == 0,
            roles: &reports,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("\n=== Worker Versions ===");
        println!("Expected SHA: {}", expected.unwrap_or("(none declared)"));
        println!();
        for report in &reports {
            let detail = match &report.status {
                RoleStatus::Matches => "ok".to_string(),
                RoleStatus::Unchecked => "registered".to_string(),
                RoleStatus::Missing => "MISSING (not registered or expired)".to_string(),
                RoleStatus::Drifted { actual, .. } => format!("STALE (running {actual})"),
            };
            let started = report
                .record
                .as_ref()
                .map(|r| format!(" since {} pid={}", r.started_at, r.pid))
                .unwrap_or_default();
            println!("  {:<20} {}{}", report.role, detail, started);
        }
    }

    if unhealthy > 0 {
        warn!(unhealthy, "Roles need a rebuild or container recreate");
        anyhow::bail!("{unhealthy} role(s) stale or missing");
    }
    info!(roles = reports.len(), "All inspected roles healthy");
    Ok(())
}

fn print_snapshot(info: &VersionInfo) {
    println!("Git SHA:        {}", info.git_sha());
    println!("Build date:     {}", info.build_date().unwrap_or("(unknown)"));
    println!(
        "Expected SHA:   {}",
        info.expected_sha().unwrap_or("(not enforced)")
    );
    println!("Runtime mode:   {}", info.runtime_mode());
    println!("Guard:          passed");
}
