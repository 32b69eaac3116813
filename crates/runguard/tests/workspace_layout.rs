// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

use std::fs;

use runguard::model::{Policy, RunRecord};
use runguard::supervisor::{CancelToken, ExecRequest, OutputSinks, Supervisor};
use runguard::workspace::{CheckStatus, Workspace, CONFIG_FILE};

#[test]
fn init_creates_config_and_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());
    assert!(!ws.is_initialized());

    let report = ws.init().unwrap();
    assert!(report.created.contains(&CONFIG_FILE.to_string()));
    assert!(ws.is_initialized());
    assert!(ws.policies_dir.join("commands.json").exists());
    assert!(ws.policies_dir.join("budgets.json").exists());
    assert!(ws.policies_dir.join("redactions.json").exists());
    assert!(ws.runs_dir.is_dir());

    let config = ws.load_config().unwrap();
    assert_eq!(config.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn init_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());
    ws.init().unwrap();
    let first = ws.load_config().unwrap();

    let report = ws.init().unwrap();
    assert!(report.created.is_empty());
    assert!(report.existing.contains(&CONFIG_FILE.to_string()));
    assert_eq!(ws.load_config().unwrap(), first);
}

#[test]
fn load_config_without_init_is_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());
    let err = ws.load_config().expect_err("uninitialized workspace");
    assert_eq!(err.code, "E_CONFIG");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn doctor_reports_missing_pieces_then_passes() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());

    let before = ws.doctor();
    assert!(!before.passed());
    assert!(before
        .checks
        .iter()
        .any(|c| c.name == "config" && c.status == CheckStatus::Missing));

    ws.init().unwrap();
    let after = ws.doctor();
    assert!(after.passed(), "doctor should pass after init: {:?}", after.checks);
}

#[test]
fn doctor_flags_malformed_policy_document() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());
    ws.init().unwrap();
    fs::write(ws.policies_dir.join("commands.json"), "{broken").unwrap();

    let report = ws.doctor();
    assert!(!report.passed());
    assert!(report
        .checks
        .iter()
        .any(|c| c.name == "policies" && c.status == CheckStatus::Fail));
}

#[test]
fn list_runs_returns_newest_first_and_skips_garbage() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());
    ws.init().unwrap();

    for args in [["first"], ["second"]] {
        Supervisor::execute(ExecRequest {
            command: "/bin/echo".to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            cwd: None,
            policy: Policy::default(),
            runs_dir: ws.runs_dir.clone(),
            cancel: CancelToken::new(),
            sinks: OutputSinks::null(),
        })
        .unwrap();
        // Ids carry millisecond timestamps; keep the two runs in distinct ticks.
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    // A stray directory without run.json and a corrupt record are skipped.
    fs::create_dir_all(ws.runs_dir.join("not-a-run")).unwrap();
    let corrupt = ws.runs_dir.join("00000000000000000-corrupt");
    fs::create_dir_all(&corrupt).unwrap();
    fs::write(corrupt.join("run.json"), "{broken").unwrap();

    let runs: Vec<RunRecord> = ws.list_runs().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].id > runs[1].id, "expected newest first");
    assert_eq!(runs[1].args, vec!["first"]);
    assert_eq!(runs[0].args, vec!["second"]);
}

#[test]
fn list_runs_on_empty_workspace_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::resolve(tmp.path());
    ws.init().unwrap();
    assert!(ws.list_runs().unwrap().is_empty());
}
