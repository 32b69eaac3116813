//! Policy documents on disk and the command gate that enforces them.

pub mod gate;

use std::path::Path;

use crate::errors::{GuardError, GuardResult};
use crate::model::{Budgets, CommandPolicy, Policy, RedactionPolicy};

pub const COMMANDS_FILE: &str = "commands.json";
pub const BUDGETS_FILE: &str = "budgets.json";
pub const REDACTIONS_FILE: &str = "redactions.json";

/// Load the three policy documents from `policies_dir`.
///
/// A missing file yields that document's defaults; a present but malformed
/// file is a configuration error, never silently ignored.
pub fn load_policy(policies_dir: &Path) -> GuardResult<Policy> {
    let commands: CommandPolicy = load_document(&policies_dir.join(COMMANDS_FILE))?;
    let budgets: Budgets = load_document(&policies_dir.join(BUDGETS_FILE))?;
    let redactions: RedactionPolicy = load_document(&policies_dir.join(REDACTIONS_FILE))?;
    Ok(Policy {
        commands,
        budgets,
        redactions,
    })
}

fn load_document<T>(path: &Path) -> GuardResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GuardError::io(
            "E_CONFIG",
            format!("failed to read policy file {}", path.display()),
            e,
        )
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        GuardError::config(
            "E_CONFIG",
            format!("malformed policy file {}", path.display()),
            serde_json::json!({ "source": e.to_string() }),
        )
    })
}

/// Seed `policies_dir` with default policy documents. Existing files are
/// left untouched so re-running init never clobbers local edits.
pub fn write_default_policies(policies_dir: &Path) -> GuardResult<Vec<String>> {
    let mut created = Vec::new();
    write_if_absent(
        policies_dir,
        COMMANDS_FILE,
        &CommandPolicy::default(),
        &mut created,
    )?;
    write_if_absent(policies_dir, BUDGETS_FILE, &Budgets::default(), &mut created)?;
    write_if_absent(
        policies_dir,
        REDACTIONS_FILE,
        &RedactionPolicy::default(),
        &mut created,
    )?;
    Ok(created)
}

fn write_if_absent<T: serde::Serialize>(
    dir: &Path,
    name: &str,
    value: &T,
    created: &mut Vec<String>,
) -> GuardResult<()> {
    let path = dir.join(name);
    if path.exists() {
        return Ok(());
    }
    let body = serde_json::to_string_pretty(value).map_err(|e| {
        GuardError::internal("E_INTERNAL", format!("failed to serialize {name}: {e}"))
    })?;
    std::fs::write(&path, body + "\n").map_err(|e| {
        GuardError::io(
            "E_IO",
            format!("failed to write policy file {}", path.display()),
            e,
        )
    })?;
    created.push(name.to_string());
    Ok(())
}

/// Resolve the redaction policy into the concrete secret tokens for this
/// invocation: current values of the listed environment variables, then the
/// literal patterns. Order is preserved, blanks are dropped, duplicates keep
/// their first position.
#[must_use]
pub fn collect_tokens(redactions: &RedactionPolicy) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut push = |raw: String| {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && !tokens.iter().any(|t| t == trimmed) {
            tokens.push(trimmed.to_string());
        }
    };
    for name in &redactions.env {
        if let Ok(value) = std::env::var(name) {
            push(value);
        }
    }
    for pattern in &redactions.patterns {
        push(pattern.clone());
    }
    tokens
}
