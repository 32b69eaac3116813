//! runguard CLI: run external commands under policy guardrails.
//!
//! Command-line interface for initializing a workspace, executing supervised
//! runs, and inspecting recorded run history.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use runguard::errors::{GuardError, GuardResult};
use runguard::model::RunRecord;
use runguard::policy::load_policy;
use runguard::supervisor::{CancelToken, ExecRequest, OutputSinks, Supervisor};
use runguard::workspace::{CheckStatus, Workspace};
use std::io;
use std::path::PathBuf;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(name = "runguard", version, about = "Guarded command-execution supervisor")]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute one command under policy control, e.g. `runguard run -- git status`
    Run {
        #[arg(long)]
        json: bool,
        #[arg(long, help = "Working directory for the child (absolute path)")]
        cwd: Option<PathBuf>,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Initialize the workspace in the current directory
    Init {
        #[arg(long)]
        json: bool,
    },
    /// Check workspace health
    Doctor {
        #[arg(long)]
        json: bool,
    },
    /// List recorded runs, newest first
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                // Diagnostics go to stderr
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env("RUNGUARD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_colors(cli.color);
    init_tracing();
    match cli.command {
        Commands::Run { json, cwd, command } => cmd_run(json, cwd, command),
        Commands::Init { json } => cmd_init(json),
        Commands::Doctor { json } => cmd_doctor(json),
        Commands::Status { json } => cmd_status(json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Handle the run command.
fn cmd_run(json: bool, cwd: Option<PathBuf>, command: Vec<String>) -> Result<()> {
    let (cmd, args) = match split_command(command) {
        Ok(split) => split,
        Err(err) => return emit_error(json, &err),
    };
    if let Some(dir) = cwd.as_ref() {
        if !dir.is_absolute() {
            return emit_error(
                json,
                &GuardError::cli_invalid_arg("--cwd must be an absolute path"),
            );
        }
    }
    let root = std::env::current_dir().into_diagnostic()?;
    let workspace = Workspace::resolve(&root);
    emit_result(json, run_supervised(&workspace, cwd, cmd, args))
}

fn run_supervised(
    workspace: &Workspace,
    cwd: Option<PathBuf>,
    command: String,
    args: Vec<String>,
) -> GuardResult<RunRecord> {
    workspace.load_config()?;
    let policy = load_policy(&workspace.policies_dir)?;
    tracing::debug!(command = %command, args = ?args, "dispatching supervised run");
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel("SIGINT")).map_err(|e| {
        GuardError::internal("E_INTERNAL", format!("failed to install signal handler: {e}"))
    })?;
    Supervisor::execute(ExecRequest {
        command,
        args,
        cwd,
        policy,
        runs_dir: workspace.runs_dir.clone(),
        cancel,
        sinks: OutputSinks::console(),
    })
}

/// Handle the init command.
fn cmd_init(json: bool) -> Result<()> {
    let root = std::env::current_dir().into_diagnostic()?;
    let workspace = Workspace::resolve(&root);
    match workspace.init() {
        Ok(report) => {
            if json {
                let payload = serde_json::to_string(&report).into_diagnostic()?;
                println!("{payload}");
            } else {
                for item in &report.created {
                    println!("created {item}");
                }
                for item in &report.existing {
                    println!("exists {item}");
                }
            }
            Ok(())
        }
        Err(err) => emit_error(json, &err),
    }
}

/// Handle the doctor command.
fn cmd_doctor(json: bool) -> Result<()> {
    let root = std::env::current_dir().into_diagnostic()?;
    let workspace = Workspace::resolve(&root);
    let report = workspace.doctor();
    if json {
        let payload = serde_json::to_string(&report).into_diagnostic()?;
        println!("{payload}");
    } else {
        for check in &report.checks {
            let status = match check.status {
                CheckStatus::Ok => "OK",
                CheckStatus::Missing => "MISSING",
                CheckStatus::Fail => "FAIL",
            };
            println!("{}: {} ({})", check.name, status, check.detail);
        }
    }
    if report.passed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

/// Handle the status command.
fn cmd_status(json: bool) -> Result<()> {
    let root = std::env::current_dir().into_diagnostic()?;
    let workspace = Workspace::resolve(&root);
    let runs = match list_runs(&workspace) {
        Ok(runs) => runs,
        Err(err) => return emit_error(json, &err),
    };
    if json {
        let payload = serde_json::to_string(&runs).into_diagnostic()?;
        println!("{payload}");
        return Ok(());
    }
    if runs.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for record in &runs {
        println!(
            "{}  {}  exit: {}",
            record.id,
            record.command,
            describe_outcome(record)
        );
    }
    Ok(())
}

fn list_runs(workspace: &Workspace) -> GuardResult<Vec<RunRecord>> {
    workspace.load_config()?;
    workspace.list_runs()
}

fn describe_outcome(record: &RunRecord) -> String {
    match (&record.exit_code, &record.signal) {
        (Some(code), _) => code.to_string(),
        (None, Some(signal)) => signal.clone(),
        (None, None) if !record.is_finalized() => "running".to_string(),
        // Finalized with neither code nor signal: a spawn failure or similar
        // recorded error; show its code rather than a bare "unknown".
        (None, None) => record
            .error
            .as_ref()
            .map_or_else(|| "unknown".to_string(), |err| err.code.clone()),
    }
}

/// Handle the completions command.
fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn split_command(mut command: Vec<String>) -> Result<(String, Vec<String>), GuardError> {
    if command.is_empty() {
        return Err(GuardError::cli_invalid_arg("missing command"));
    }
    let cmd = command.remove(0);
    Ok((cmd, command))
}

fn emit_result(json: bool, result: GuardResult<RunRecord>) -> Result<()> {
    match result {
        Ok(record) => {
            if json {
                let payload = serde_json::to_string(&record).into_diagnostic()?;
                println!("{payload}");
            } else if let Some(err) = record.error.as_ref() {
                eprintln!("run {}: {}: {}", record.id, err.code, err.message);
            }
            match record.exit_disposition() {
                0 => Ok(()),
                code => std::process::exit(code),
            }
        }
        Err(err) => emit_error(json, &err),
    }
}

fn emit_error(json: bool, err: &GuardError) -> Result<()> {
    if json {
        let payload = serde_json::to_string(&err.to_error_info()).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("error: {err}");
    }
    std::process::exit(err.exit_code());
}
