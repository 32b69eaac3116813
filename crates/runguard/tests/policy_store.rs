// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use std::fs;

use runguard::model::policy::DEFAULT_REDACTED_ENV;
use runguard::policy::{load_policy, write_default_policies};

#[test]
fn missing_policy_files_yield_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let policy = load_policy(tmp.path()).unwrap();
    assert!(policy.commands.allowlist_is_empty());
    assert_eq!(policy.budgets.max_calls_per_run, 1000);
    assert_eq!(policy.budgets.max_run_log_kb, 4096);
    assert_eq!(policy.redactions.env.len(), DEFAULT_REDACTED_ENV.len());
}

#[test]
fn partial_budgets_document_keeps_other_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("budgets.json"), r#"{"max_run_log_kb": 16}"#).unwrap();
    let policy = load_policy(tmp.path()).unwrap();
    assert_eq!(policy.budgets.max_run_log_kb, 16);
    assert_eq!(policy.budgets.max_calls_per_run, 1000);
    assert_eq!(policy.budgets.log_limit_bytes(), Some(16 * 1024));
}

#[test]
fn nonpositive_log_budget_means_unbounded() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("budgets.json"), r#"{"max_run_log_kb": 0}"#).unwrap();
    let policy = load_policy(tmp.path()).unwrap();
    assert_eq!(policy.budgets.log_limit_bytes(), None);
}

#[test]
fn malformed_policy_file_is_a_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("commands.json"), "{not json").unwrap();
    let err = load_policy(tmp.path()).expect_err("malformed file must not be ignored");
    assert_eq!(err.code, "E_CONFIG");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn command_lists_round_trip_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("commands.json"),
        r#"{"allow_names": ["git", "cargo"], "deny_names": ["curl"]}"#,
    )
    .unwrap();
    let policy = load_policy(tmp.path()).unwrap();
    assert_eq!(policy.commands.allow_names, vec!["git", "cargo"]);
    assert_eq!(policy.commands.deny_names, vec!["curl"]);
    assert!(policy.commands.allow_paths.is_empty());
}

#[test]
fn write_default_policies_seeds_all_three_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let created = write_default_policies(tmp.path()).unwrap();
    assert_eq!(created, vec!["commands.json", "budgets.json", "redactions.json"]);
    // All seeded documents load back cleanly.
    load_policy(tmp.path()).unwrap();
}

#[test]
fn write_default_policies_never_overwrites_edits() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("budgets.json"),
        r#"{"max_run_log_kb": 2, "max_calls_per_run": 3}"#,
    )
    .unwrap();
    let created = write_default_policies(tmp.path()).unwrap();
    assert_eq!(created, vec!["commands.json", "redactions.json"]);
    let policy = load_policy(tmp.path()).unwrap();
    assert_eq!(policy.budgets.max_run_log_kb, 2);
    assert_eq!(policy.budgets.max_calls_per_run, 3);
}
