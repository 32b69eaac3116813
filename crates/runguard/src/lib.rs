//! runguard: a command-execution supervisor with guardrails.
//!
//! This crate launches a single external command, mirrors its stdout and
//! stderr to the caller while persisting them to per-run log files, and
//! enforces a small policy set before and during execution: command
//! allow/deny lists, call and log-size budgets, and secret redaction that is
//! correct across I/O chunk boundaries. Every run leaves an auditable
//! `run.json` record behind.

#![forbid(unsafe_code)]
// Library documentation is in progress. Public API types have docs;
// internal types will be documented in future releases.
#![allow(missing_docs)]

pub mod budget;
pub mod errors;
pub mod model;
pub mod policy;
pub mod redact;
pub mod supervisor;
pub mod workspace;

pub use crate::model::*;

pub mod run {
    use std::path::PathBuf;

    use super::errors::GuardResult;
    use super::supervisor::{CancelToken, ExecRequest, OutputSinks, Supervisor};
    use super::{Policy, RunRecord};

    /// Execute one supervised command with console sinks and a fresh
    /// cancellation token.
    pub fn run_exec(
        command: String,
        args: Vec<String>,
        cwd: Option<PathBuf>,
        policy: Policy,
        runs_dir: PathBuf,
    ) -> GuardResult<RunRecord> {
        Supervisor::execute(ExecRequest {
            command,
            args,
            cwd,
            policy,
            runs_dir,
            cancel: CancelToken::new(),
            sinks: OutputSinks::console(),
        })
    }
}
