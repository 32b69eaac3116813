//! Child process supervision: spawn, mirror, persist, enforce, record.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::budget::{Admission, BudgetGuard, KillSwitch};
use crate::errors::{GuardError, GuardResult};
use crate::model::{Completion, ErrorInfo, Policy, RunId, RunRecord};
use crate::policy::gate::{self, CommandSpec};
use crate::redact::{redact_text, StreamRedactor};

pub const RUN_RECORD_FILE: &str = "run.json";
pub const STDOUT_LOG_FILE: &str = "stdout.log";
pub const STDERR_LOG_FILE: &str = "stderr.log";

const READ_BUF_SIZE: usize = 8192;

/// Cooperative cancellation handle, safe to share with a signal handler.
///
/// The first `cancel` records which signal to forward; forwarding happens at
/// most once, as soon as both a cancellation and a child pid are known.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    forwarded: AtomicBool,
    pid: AtomicI32,
    signal: Mutex<Option<String>>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation, forwarding `signal` (e.g. "SIGINT") to the
    /// child once a pid is bound.
    pub fn cancel(&self, signal: &str) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            if let Ok(mut slot) = self.inner.signal.lock() {
                *slot = Some(signal.to_string());
            }
        }
        self.forward();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The signal name recorded by the first `cancel`, if any.
    #[must_use]
    pub fn recorded_signal(&self) -> Option<String> {
        self.inner.signal.lock().ok().and_then(|slot| slot.clone())
    }

    fn bind_pid(&self, pid: i32) {
        self.inner.pid.store(pid, Ordering::SeqCst);
        if self.is_cancelled() {
            self.forward();
        }
    }

    fn forward(&self) {
        if !self.is_cancelled() {
            return;
        }
        let pid = self.inner.pid.load(Ordering::SeqCst);
        if pid <= 0 || self.inner.forwarded.swap(true, Ordering::SeqCst) {
            return;
        }
        let name = self
            .recorded_signal()
            .unwrap_or_else(|| "SIGTERM".to_string());
        forward_signal(pid, &name);
    }
}

#[cfg(unix)]
fn forward_signal(pid: i32, name: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::str::FromStr;

    let signal = Signal::from_str(name).unwrap_or(Signal::SIGTERM);
    match kill(Pid::from_raw(pid), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => tracing::warn!(pid, signal = name, %err, "failed to forward signal"),
    }
}

#[cfg(not(unix))]
fn forward_signal(pid: i32, name: &str) {
    tracing::warn!(pid, signal = name, "signal forwarding is not supported on this platform");
}

/// Where mirrored child output goes. The console pair writes through to the
/// caller's own stdout and stderr.
pub struct OutputSinks {
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
}

impl OutputSinks {
    #[must_use]
    pub fn console() -> Self {
        Self {
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
        }
    }

    #[must_use]
    pub fn null() -> Self {
        Self {
            stdout: Box::new(std::io::sink()),
            stderr: Box::new(std::io::sink()),
        }
    }
}

/// Everything needed to execute one supervised run.
pub struct ExecRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub policy: Policy,
    pub runs_dir: PathBuf,
    pub cancel: CancelToken,
    pub sinks: OutputSinks,
}

pub struct Supervisor;

impl Supervisor {
    /// Execute one supervised run.
    ///
    /// Policy denial returns an error before anything touches disk. Once the
    /// gate passes, failures are recorded in the run's `run.json` and
    /// surfaced through the returned record rather than as an `Err`, so the
    /// audit trail survives a failed spawn.
    pub fn execute(req: ExecRequest) -> GuardResult<RunRecord> {
        let cwd = match &req.cwd {
            Some(path) => path.clone(),
            None => std::env::current_dir().map_err(|e| {
                GuardError::io("E_IO", "failed to resolve working directory", e)
            })?,
        };
        let spec = CommandSpec::parse(&req.command, &cwd);
        gate::evaluate(&req.policy.commands, &req.policy.budgets, &spec, &cwd)?;

        let tokens = crate::policy::collect_tokens(&req.policy.redactions);
        let id = RunId::new();
        let run_dir = req.runs_dir.join(id.as_str());
        std::fs::create_dir_all(&run_dir).map_err(|e| {
            GuardError::io(
                "E_IO",
                format!("failed to create run directory {}", run_dir.display()),
                e,
            )
        })?;
        let record = RunRecord::started(
            id,
            cwd.display().to_string(),
            redact_text(&req.command, &tokens),
            req.args.iter().map(|a| redact_text(a, &tokens)).collect(),
        );
        run_child(req, record, &run_dir, &cwd, tokens)
    }
}

fn run_child(
    req: ExecRequest,
    mut record: RunRecord,
    run_dir: &Path,
    cwd: &Path,
    tokens: Vec<String>,
) -> GuardResult<RunRecord> {
    tracing::info!(id = %record.id, command = %record.command, "starting run");
    let stdout_log = create_log(run_dir, STDOUT_LOG_FILE)?;
    let stderr_log = create_log(run_dir, STDERR_LOG_FILE)?;

    let mut child = match Command::new(&req.command)
        .args(&req.args)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            let spawn_err =
                GuardError::spawn(format!("failed to spawn {}", record.command), err);
            tracing::warn!(id = %record.id, error = %spawn_err, "spawn failed");
            record.finalize(Completion {
                ended_at: Utc::now(),
                exit_code: None,
                signal: None,
                log_bytes: 0,
                budget_exceeded: false,
                error: Some(spawn_err.to_error_info()),
            });
            write_record(run_dir, &record)?;
            return Ok(record);
        }
    };

    let pid = i32::try_from(child.id()).unwrap_or(0);
    let kill = Arc::new(KillSwitch::new());
    kill.arm(pid);
    req.cancel.bind_pid(pid);
    if let Err(err) = write_record(run_dir, &record) {
        tracing::warn!(id = %record.id, %err, "failed to persist started record");
    }

    let guard = BudgetGuard::new(req.policy.budgets.log_limit_bytes(), kill);
    let OutputSinks {
        stdout: out_sink,
        stderr: err_sink,
    } = req.sinks;
    pump_streams(&mut child, &tokens, &guard, out_sink, err_sink, stdout_log, stderr_log)?;

    let status = child.wait().map_err(|e| {
        GuardError::io("E_IO", "failed to collect child exit status", e)
    })?;
    finish(record, run_dir, &status, &guard, &req.cancel, &req.policy)
}

fn create_log(run_dir: &Path, name: &str) -> GuardResult<File> {
    File::create(run_dir.join(name)).map_err(|e| {
        GuardError::io(
            "E_IO",
            format!("failed to create log file {}", run_dir.join(name).display()),
            e,
        )
    })
}

fn pump_streams(
    child: &mut Child,
    tokens: &[String],
    guard: &BudgetGuard,
    mut out_sink: Box<dyn Write + Send>,
    mut err_sink: Box<dyn Write + Send>,
    mut stdout_log: File,
    mut stderr_log: File,
) -> GuardResult<()> {
    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| GuardError::internal("E_INTERNAL", "child stdout pipe missing"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| GuardError::internal("E_INTERNAL", "child stderr pipe missing"))?;
    std::thread::scope(|s| {
        s.spawn(|| {
            pump(
                stdout_pipe,
                StreamRedactor::new(tokens.to_vec()),
                guard,
                out_sink.as_mut(),
                &mut stdout_log,
                "stdout",
            );
        });
        s.spawn(|| {
            pump(
                stderr_pipe,
                StreamRedactor::new(tokens.to_vec()),
                guard,
                err_sink.as_mut(),
                &mut stderr_log,
                "stderr",
            );
        });
    });
    Ok(())
}

fn pump(
    mut reader: impl Read,
    mut redactor: StreamRedactor,
    guard: &BudgetGuard,
    sink: &mut (dyn Write + Send),
    log: &mut File,
    stream: &'static str,
) {
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(stream, %e, "stream read failed");
                break;
            }
        };
        let text = redactor.feed(&buf[..n]);
        emit(guard, &mut *sink, log, stream, &text);
    }
    let tail = redactor.flush();
    emit(guard, &mut *sink, log, stream, &tail);
}

/// Push redacted text through the budget, then tee whatever was admitted to
/// the caller's sink and the run log. Truncation lands on a char boundary;
/// any bytes the boundary shaves off are refunded so the guard's total stays
/// equal to what reaches the log file.
fn emit(guard: &BudgetGuard, sink: &mut dyn Write, log: &mut File, stream: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    let len = u64::try_from(text.len()).unwrap_or(u64::MAX);
    let cut = match guard.admit(len) {
        Admission::Full => text.len(),
        Admission::Partial(admitted) => {
            let at = usize::try_from(admitted).unwrap_or(text.len());
            let cut = floor_char_boundary(text, at);
            let slack = admitted.saturating_sub(u64::try_from(cut).unwrap_or(admitted));
            if slack > 0 {
                guard.refund(slack);
            }
            cut
        }
        Admission::Rejected => return,
    };
    let bytes = &text.as_bytes()[..cut];
    if let Err(err) = sink.write_all(bytes).and_then(|()| sink.flush()) {
        tracing::warn!(stream, %err, "failed to mirror output");
    }
    if let Err(err) = log.write_all(bytes) {
        tracing::warn!(stream, %err, "failed to persist output");
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn finish(
    mut record: RunRecord,
    run_dir: &Path,
    status: &ExitStatus,
    guard: &BudgetGuard,
    cancel: &CancelToken,
    policy: &Policy,
) -> GuardResult<RunRecord> {
    let exit_code = status.code();
    let signal = status_signal(status).or_else(|| {
        if exit_code.is_none() {
            cancel.recorded_signal()
        } else {
            None
        }
    });
    let budget_exceeded = guard.exceeded();
    let error = if budget_exceeded {
        Some(ErrorInfo {
            code: "E_BUDGET_EXCEEDED".to_string(),
            message: "run log budget exceeded".to_string(),
            context: Some(serde_json::json!({
                "max_run_log_kb": policy.budgets.max_run_log_kb,
                "log_bytes": guard.total(),
            })),
        })
    } else if cancel.is_cancelled() && !status.success() {
        Some(ErrorInfo {
            code: "E_CANCELED".to_string(),
            message: "run canceled by caller".to_string(),
            context: cancel
                .recorded_signal()
                .map(|s| serde_json::json!({ "signal": s })),
        })
    } else {
        None
    };
    record.finalize(Completion {
        ended_at: Utc::now(),
        exit_code,
        signal,
        log_bytes: guard.total(),
        budget_exceeded,
        error,
    });
    write_record(run_dir, &record)?;
    tracing::info!(
        id = %record.id,
        exit_code = ?record.exit_code,
        signal = ?record.signal,
        log_bytes = record.log_bytes,
        "run finished"
    );
    Ok(record)
}

#[cfg(unix)]
fn status_signal(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(signal_name)
}

#[cfg(not(unix))]
fn status_signal(_status: &ExitStatus) -> Option<String> {
    None
}

#[cfg(unix)]
fn signal_name(sig: i32) -> String {
    nix::sys::signal::Signal::try_from(sig)
        .map_or_else(|_| format!("signal {sig}"), |s| s.as_str().to_string())
}

/// Serialize the run record to `run.json` in the run directory.
pub fn write_record(run_dir: &Path, record: &RunRecord) -> GuardResult<()> {
    let body = serde_json::to_string_pretty(record).map_err(|e| {
        GuardError::internal("E_INTERNAL", format!("failed to serialize run record: {e}"))
    })?;
    std::fs::write(run_dir.join(RUN_RECORD_FILE), body + "\n").map_err(|e| {
        GuardError::io(
            "E_IO",
            format!("failed to write {}", run_dir.join(RUN_RECORD_FILE).display()),
            e,
        )
    })
}
