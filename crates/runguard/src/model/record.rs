use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ErrorInfo, RunId};

/// Current run-record format version.
pub const RUN_RECORD_VERSION: u32 = 1;

/// Host platform captured into every run record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub runtime: String,
}

impl PlatformInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            runtime: format!("runguard {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Completion fields added to a [`RunRecord`] exactly once, at finalize.
#[derive(Clone, Debug)]
pub struct Completion {
    pub ended_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub log_bytes: u64,
    pub budget_exceeded: bool,
    pub error: Option<ErrorInfo>,
}

/// Metadata document for one supervised run.
///
/// The record is persisted immediately after the child process is spawned
/// (so a crash mid-run still leaves a "started" entry), then rewritten
/// exactly once at finalize with the completion fields filled in. A missing
/// `ended_at` therefore marks a run that never finalized.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub record_version: u32,
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub cwd: String,
    /// Command as invoked, with secret tokens already redacted.
    pub command: String,
    /// Arguments as invoked, with secret tokens already redacted.
    pub args: Vec<String>,
    pub platform: PlatformInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default)]
    pub log_bytes: u64,
    #[serde(default)]
    pub budget_exceeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl RunRecord {
    /// Build the "started" record written right after spawn.
    #[must_use]
    pub fn started(id: RunId, cwd: String, command: String, args: Vec<String>) -> Self {
        Self {
            record_version: RUN_RECORD_VERSION,
            id,
            started_at: Utc::now(),
            cwd,
            command,
            args,
            platform: PlatformInfo::current(),
            ended_at: None,
            exit_code: None,
            signal: None,
            log_bytes: 0,
            budget_exceeded: false,
            error: None,
        }
    }

    /// Apply completion fields. Start fields are preserved untouched.
    pub fn finalize(&mut self, completion: Completion) {
        self.ended_at = Some(completion.ended_at);
        self.exit_code = completion.exit_code;
        self.signal = completion.signal;
        self.log_bytes = completion.log_bytes;
        self.budget_exceeded = completion.budget_exceeded;
        self.error = completion.error;
    }

    /// True once completion fields have been written.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Exit code the invoking shell should observe for this run.
    ///
    /// Success requires a zero child exit and no budget breach; a clean exit
    /// forced by truncation or a signal is reported as the generic error
    /// status because "success" after a forced kill is misleading.
    #[must_use]
    pub fn exit_disposition(&self) -> i32 {
        if self.budget_exceeded || self.signal.is_some() {
            return 1;
        }
        match self.exit_code {
            Some(code) if code != 0 => code,
            Some(_) => 0,
            // No exit code and no signal: spawn failure or lost status.
            None => 1,
        }
    }
}
