//! Pre-spawn command gate: allow/deny matching and the call budget check.

use std::path::{Component, Path, PathBuf};

use crate::errors::{GuardError, GuardResult};
use crate::model::{Budgets, CommandPolicy};

/// A command normalized for policy matching.
///
/// The name is the basename with any Windows executable extension stripped,
/// lowercased on Windows. The path is present only when the invocation
/// contained a path separator; it is absolutized against the working
/// directory and lexically normalized, never resolved through the
/// filesystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub raw: String,
    pub name: String,
    pub path: Option<PathBuf>,
}

const WINDOWS_EXTENSIONS: &[&str] = &["exe", "bat", "cmd", "com"];

impl CommandSpec {
    #[must_use]
    pub fn parse(raw: &str, cwd: &Path) -> Self {
        let has_separator = raw.contains('/') || (cfg!(windows) && raw.contains('\\'));
        let raw_path = Path::new(raw);
        let base = raw_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(raw);
        let name = normalize_name(base);
        let path = has_separator.then(|| {
            let absolute = if raw_path.is_absolute() {
                raw_path.to_path_buf()
            } else {
                cwd.join(raw_path)
            };
            normalize_lexically(&absolute)
        });
        Self {
            raw: raw.to_string(),
            name,
            path,
        }
    }

    fn matches_name(&self, entry: &str) -> bool {
        normalize_name(entry) == self.name
    }

    fn matches_path(&self, entry: &str, cwd: &Path) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let entry_path = Path::new(entry);
        let absolute = if entry_path.is_absolute() {
            entry_path.to_path_buf()
        } else {
            cwd.join(entry_path)
        };
        normalize_lexically(&absolute) == *path
    }
}

fn normalize_name(base: &str) -> String {
    let stripped = WINDOWS_EXTENSIONS
        .iter()
        .find_map(|ext| {
            let suffix_len = ext.len() + 1;
            if base.len() > suffix_len && base.is_char_boundary(base.len() - suffix_len) {
                let (head, tail) = base.split_at(base.len() - suffix_len);
                let matches = tail
                    .strip_prefix('.')
                    .is_some_and(|t| t.eq_ignore_ascii_case(ext));
                matches.then(|| head.to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| base.to_string());
    if cfg!(windows) {
        stripped.to_lowercase()
    } else {
        stripped
    }
}

/// Removes `.` and resolves `..` components without touching the filesystem.
/// `..` at the root is ignored.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    normalized.pop();
                    depth -= 1;
                }
            }
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        PathBuf::from("/")
    } else {
        normalized
    }
}

/// Evaluate the gate for one invocation. Denial happens before any run
/// directory or record exists, so a denied command leaves no trace on disk.
///
/// Order: call budget, then denylist, then allowlist. An empty allowlist
/// permits everything not denied.
pub fn evaluate(
    commands: &CommandPolicy,
    budgets: &Budgets,
    spec: &CommandSpec,
    cwd: &Path,
) -> GuardResult<()> {
    if budgets.max_calls_per_run < 1 {
        return Err(GuardError::policy_denied(
            "E_POLICY_DENIED",
            "call budget is exhausted",
            serde_json::json!({
                "requested": spec.raw,
                "max_calls_per_run": budgets.max_calls_per_run,
                "fix": "Raise budgets.max_calls_per_run above zero"
            }),
        ));
    }

    let denied_by_name = commands.deny_names.iter().any(|e| spec.matches_name(e));
    let denied_by_path = commands.deny_paths.iter().any(|e| spec.matches_path(e, cwd));
    if denied_by_name || denied_by_path {
        return Err(GuardError::policy_denied(
            "E_POLICY_DENIED",
            "command is denylisted",
            serde_json::json!({
                "requested": spec.raw,
                "matched": if denied_by_name { "name" } else { "path" },
                "fix": "Remove the entry from commands.deny_names or deny_paths"
            }),
        ));
    }

    if commands.allowlist_is_empty() {
        return Ok(());
    }
    let allowed = commands.allow_names.iter().any(|e| spec.matches_name(e))
        || commands.allow_paths.iter().any(|e| spec.matches_path(e, cwd));
    if allowed {
        Ok(())
    } else {
        Err(GuardError::policy_denied(
            "E_POLICY_DENIED",
            "command is not in the allowlist",
            serde_json::json!({
                "requested": spec.raw,
                "allow_names": commands.allow_names,
                "allow_paths": commands.allow_paths,
                "fix": "Add the command to commands.allow_names or allow_paths"
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd() -> PathBuf {
        PathBuf::from("/work")
    }

    #[test]
    fn parse_bare_name_has_no_path() {
        let spec = CommandSpec::parse("git", &cwd());
        assert_eq!(spec.name, "git");
        assert!(spec.path.is_none());
    }

    #[test]
    fn parse_relative_path_absolutizes_against_cwd() {
        let spec = CommandSpec::parse("./bin/tool", &cwd());
        assert_eq!(spec.name, "tool");
        assert_eq!(spec.path, Some(PathBuf::from("/work/bin/tool")));
    }

    #[test]
    fn parse_normalizes_dotdot_segments() {
        let spec = CommandSpec::parse("/usr/local/../bin/git", &cwd());
        assert_eq!(spec.path, Some(PathBuf::from("/usr/bin/git")));
    }

    #[test]
    fn name_matching_strips_windows_extensions() {
        let spec = CommandSpec::parse("git", &cwd());
        assert!(spec.matches_name("git.exe"));
        assert!(spec.matches_name("git.EXE"));
        assert!(!spec.matches_name("gitx"));
    }

    #[test]
    fn empty_allowlist_permits_everything_not_denied() {
        let commands = CommandPolicy::default();
        let spec = CommandSpec::parse("anything", &cwd());
        assert!(evaluate(&commands, &Budgets::default(), &spec, &cwd()).is_ok());
    }

    #[test]
    fn deny_wins_over_allow() {
        let commands = CommandPolicy {
            allow_names: vec!["rm".to_string()],
            deny_names: vec!["rm".to_string()],
            ..CommandPolicy::default()
        };
        let spec = CommandSpec::parse("rm", &cwd());
        let err = evaluate(&commands, &Budgets::default(), &spec, &cwd())
            .err()
            .map(|e| e.message);
        assert_eq!(err.as_deref(), Some("command is denylisted"));
    }

    #[test]
    fn nonempty_allowlist_rejects_unlisted_command() {
        let commands = CommandPolicy {
            allow_names: vec!["git".to_string()],
            ..CommandPolicy::default()
        };
        let git = CommandSpec::parse("git", &cwd());
        let curl = CommandSpec::parse("curl", &cwd());
        assert!(evaluate(&commands, &Budgets::default(), &git, &cwd()).is_ok());
        let err = evaluate(&commands, &Budgets::default(), &curl, &cwd())
            .err()
            .map(|e| e.code);
        assert_eq!(err.as_deref(), Some("E_POLICY_DENIED"));
    }

    #[test]
    fn path_entry_matches_normalized_invocation() {
        let commands = CommandPolicy {
            deny_paths: vec!["/opt/tools/evil".to_string()],
            ..CommandPolicy::default()
        };
        let spec = CommandSpec::parse("/opt/tools/../tools/evil", &cwd());
        assert!(evaluate(&commands, &Budgets::default(), &spec, &cwd()).is_err());
    }

    #[test]
    fn zero_call_budget_denies_before_list_checks() {
        let budgets = Budgets {
            max_calls_per_run: 0,
            ..Budgets::default()
        };
        let spec = CommandSpec::parse("git", &cwd());
        let err = evaluate(&CommandPolicy::default(), &budgets, &spec, &cwd())
            .err()
            .map(|e| e.message);
        assert_eq!(err.as_deref(), Some("call budget is exhausted"));
    }
}
