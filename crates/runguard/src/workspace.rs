//! Workspace layout on disk: root config, policy documents, run records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{GuardError, GuardResult};
use crate::model::RunRecord;
use crate::policy;
use crate::supervisor::RUN_RECORD_FILE;

pub const CONFIG_FILE: &str = ".runguard.json";
pub const DATA_DIR: &str = ".runguard";
pub const POLICIES_DIR: &str = "policies";
pub const RUNS_DIR: &str = "runs";

/// Root config document written by `init`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootConfig {
    pub name: String,
    pub version: String,
    pub created: DateTime<Utc>,
}

/// Resolved workspace paths for one root directory.
#[derive(Clone, Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub policies_dir: PathBuf,
    pub runs_dir: PathBuf,
}

/// What `init` created versus what was already there.
#[derive(Clone, Debug, Default, Serialize)]
pub struct InitReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Missing,
    Fail,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Ok)
    }
}

impl Workspace {
    /// Resolve workspace paths under `root`. Nothing is touched on disk.
    #[must_use]
    pub fn resolve(root: &Path) -> Self {
        let data_dir = root.join(DATA_DIR);
        Self {
            root: root.to_path_buf(),
            config_path: root.join(CONFIG_FILE),
            policies_dir: data_dir.join(POLICIES_DIR),
            runs_dir: data_dir.join(RUNS_DIR),
            data_dir,
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.config_path.exists()
    }

    /// Create the workspace skeleton: root config, data directory, default
    /// policy documents, runs directory. Idempotent; existing files are
    /// reported, never overwritten.
    pub fn init(&self) -> GuardResult<InitReport> {
        let mut report = InitReport::default();
        if self.config_path.exists() {
            report.existing.push(CONFIG_FILE.to_string());
        } else {
            let config = RootConfig {
                name: self
                    .root
                    .file_name()
                    .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                created: Utc::now(),
            };
            let body = serde_json::to_string_pretty(&config).map_err(|e| {
                GuardError::internal("E_INTERNAL", format!("failed to serialize config: {e}"))
            })?;
            std::fs::write(&self.config_path, body + "\n").map_err(|e| {
                GuardError::io(
                    "E_IO",
                    format!("failed to write {}", self.config_path.display()),
                    e,
                )
            })?;
            report.created.push(CONFIG_FILE.to_string());
        }

        for dir in [&self.data_dir, &self.policies_dir, &self.runs_dir] {
            if dir.exists() {
                report.existing.push(relative_label(&self.root, dir));
            } else {
                std::fs::create_dir_all(dir).map_err(|e| {
                    GuardError::io("E_IO", format!("failed to create {}", dir.display()), e)
                })?;
                report.created.push(relative_label(&self.root, dir));
            }
        }

        for name in policy::write_default_policies(&self.policies_dir)? {
            report
                .created
                .push(format!("{DATA_DIR}/{POLICIES_DIR}/{name}"));
        }
        Ok(report)
    }

    /// Load the root config; missing or malformed config is `E_CONFIG`.
    pub fn load_config(&self) -> GuardResult<RootConfig> {
        let raw = std::fs::read_to_string(&self.config_path).map_err(|e| {
            GuardError::config(
                "E_CONFIG",
                format!("workspace is not initialized ({CONFIG_FILE} not found)"),
                serde_json::json!({
                    "path": self.config_path.display().to_string(),
                    "source": e.to_string(),
                    "fix": "Run 'runguard init' first",
                }),
            )
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            GuardError::config(
                "E_CONFIG",
                format!("malformed config {}", self.config_path.display()),
                serde_json::json!({ "source": e.to_string() }),
            )
        })
    }

    /// Health checks for the workspace. Never errors; every problem becomes
    /// a failing check in the report.
    #[must_use]
    pub fn doctor(&self) -> DoctorReport {
        let mut checks = Vec::new();
        checks.push(match self.load_config() {
            Ok(config) => check(
                "config",
                CheckStatus::Ok,
                format!("{} ({})", self.config_path.display(), config.name),
            ),
            Err(_) if !self.config_path.exists() => check(
                "config",
                CheckStatus::Missing,
                format!("{} not found, run 'runguard init'", self.config_path.display()),
            ),
            Err(err) => check("config", CheckStatus::Fail, err.message),
        });
        for (name, dir) in [
            ("data dir", &self.data_dir),
            ("policies dir", &self.policies_dir),
            ("runs dir", &self.runs_dir),
        ] {
            checks.push(if dir.is_dir() {
                check(name, CheckStatus::Ok, dir.display().to_string())
            } else {
                check(
                    name,
                    CheckStatus::Missing,
                    format!("{} not found", dir.display()),
                )
            });
        }
        checks.push(match policy::load_policy(&self.policies_dir) {
            Ok(_) => check("policies", CheckStatus::Ok, "policy documents load cleanly".to_string()),
            Err(err) => check("policies", CheckStatus::Fail, err.message),
        });
        DoctorReport { checks }
    }

    /// All run records, newest first. Entries that cannot be read or parsed
    /// are skipped with a warning so one corrupt record never hides the rest.
    pub fn list_runs(&self) -> GuardResult<Vec<RunRecord>> {
        if !self.runs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.runs_dir).map_err(|e| {
            GuardError::io(
                "E_IO",
                format!("failed to read {}", self.runs_dir.display()),
                e,
            )
        })?;
        let mut runs = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let record_path = entry.path().join(RUN_RECORD_FILE);
            match read_record(&record_path) {
                Ok(Some(record)) => runs.push(record),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %record_path.display(), %err, "skipping unreadable run record");
                }
            }
        }
        runs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(runs)
    }
}

fn check(name: &str, status: CheckStatus, detail: String) -> DoctorCheck {
    DoctorCheck {
        name: name.to_string(),
        status,
        detail,
    }
}

fn relative_label(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .map_or_else(|_| dir.display().to_string(), |p| p.display().to_string())
}

fn read_record(path: &Path) -> GuardResult<Option<RunRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GuardError::io("E_IO", format!("failed to read {}", path.display()), e)
    })?;
    let record = serde_json::from_str(&raw).map_err(|e| {
        GuardError::config(
            "E_CONFIG",
            format!("malformed run record {}", path.display()),
            serde_json::json!({ "source": e.to_string() }),
        )
    })?;
    Ok(Some(record))
}
