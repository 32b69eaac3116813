use serde::{Deserialize, Serialize};

/// Environment variables whose values are treated as secret tokens when no
/// redaction policy document is present. Variable names (not values) are
/// stored in policy files; values are resolved at run time.
pub const DEFAULT_REDACTED_ENV: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "GITHUB_TOKEN",
    "GITLAB_TOKEN",
    "NPM_TOKEN",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
];

/// Command allow/deny policy.
///
/// Deny entries are evaluated before allow entries; an empty allowlist (both
/// sets) means "allow everything not denied". Entries match either the
/// normalized executable name or the normalized absolute path.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandPolicy {
    #[serde(default)]
    pub allow_names: Vec<String>,
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub deny_names: Vec<String>,
    #[serde(default)]
    pub deny_paths: Vec<String>,
}

impl CommandPolicy {
    /// True when no allow entries are configured, meaning any command not
    /// denied is permitted.
    #[must_use]
    pub fn allowlist_is_empty(&self) -> bool {
        self.allow_names.is_empty() && self.allow_paths.is_empty()
    }
}

/// Resource budgets for a single run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Budgets {
    /// Gate on whether any call may run at all. Checked as a nonnegative
    /// gate (< 1 denies); not decremented across runs.
    #[serde(default = "default_max_calls_per_run")]
    pub max_calls_per_run: i64,
    /// Ceiling on persisted log bytes per run, in KB. Absent or
    /// non-positive means unbounded.
    #[serde(default = "default_max_run_log_kb")]
    pub max_run_log_kb: i64,
}

fn default_max_calls_per_run() -> i64 {
    1000
}

fn default_max_run_log_kb() -> i64 {
    4096
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_calls_per_run: default_max_calls_per_run(),
            max_run_log_kb: default_max_run_log_kb(),
        }
    }
}

impl Budgets {
    /// The log ceiling in bytes, or `None` for unbounded.
    #[must_use]
    pub fn log_limit_bytes(&self) -> Option<u64> {
        u64::try_from(self.max_run_log_kb)
            .ok()
            .filter(|kb| *kb > 0)
            .map(|kb| kb * 1024)
    }
}

/// Secret redaction policy: environment variable names whose current values
/// are secret, plus literal string patterns.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionPolicy {
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            env: DEFAULT_REDACTED_ENV.iter().map(|s| (*s).to_string()).collect(),
            patterns: Vec::new(),
        }
    }
}

/// The three policy documents, loaded once per invocation and immutable for
/// the run's duration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    #[serde(default)]
    pub commands: CommandPolicy,
    #[serde(default)]
    pub budgets: Budgets,
    #[serde(default)]
    pub redactions: RedactionPolicy,
}
