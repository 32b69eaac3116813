//! Log-size budget accounting and the kill switch it triggers.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

/// Delivers SIGKILL to the supervised child exactly once.
///
/// Firing before a pid is armed is a no-op; the budget can only be breached
/// by stream output, which starts after the child exists.
#[derive(Debug, Default)]
pub struct KillSwitch {
    pid: AtomicI32,
    fired: AtomicBool,
}

impl KillSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, pid: i32) {
        self.pid.store(pid, Ordering::SeqCst);
    }

    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let pid = self.pid.load(Ordering::SeqCst);
        if pid > 0 {
            deliver_kill(pid);
        }
    }

    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
fn deliver_kill(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGKILL) {
        // Already-gone children are fine.
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => tracing::warn!(pid, %err, "failed to deliver SIGKILL"),
    }
}

#[cfg(not(unix))]
fn deliver_kill(pid: i32) {
    tracing::warn!(pid, "kill switch is not supported on this platform");
}

/// How much of a write the budget admits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The whole write fits.
    Full,
    /// Only a prefix of this many bytes fits; the budget is now exhausted.
    Partial(u64),
    /// Nothing fits.
    Rejected,
}

/// Tracks bytes admitted to the run log against an optional byte ceiling.
///
/// Shared by both stream pumps; admission is atomic so concurrent stdout and
/// stderr writes never jointly overshoot the limit. The first breach fires
/// the kill switch.
#[derive(Debug)]
pub struct BudgetGuard {
    limit: Option<u64>,
    written: AtomicU64,
    exceeded: AtomicBool,
    kill: Arc<KillSwitch>,
}

impl BudgetGuard {
    #[must_use]
    pub fn new(limit: Option<u64>, kill: Arc<KillSwitch>) -> Self {
        Self {
            limit,
            written: AtomicU64::new(0),
            exceeded: AtomicBool::new(false),
            kill,
        }
    }

    /// Reserve space for `len` bytes, returning how much was admitted.
    pub fn admit(&self, len: u64) -> Admission {
        let Some(limit) = self.limit else {
            self.written.fetch_add(len, Ordering::Relaxed);
            return Admission::Full;
        };
        // A breach is final; refunds never reopen the budget.
        if self.exceeded.load(Ordering::SeqCst) {
            return Admission::Rejected;
        }
        let mut current = self.written.load(Ordering::SeqCst);
        loop {
            if current >= limit {
                self.breach();
                return Admission::Rejected;
            }
            let admitted = len.min(limit - current);
            match self.written.compare_exchange(
                current,
                current + admitted,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    if admitted < len {
                        self.breach();
                        return Admission::Partial(admitted);
                    }
                    return Admission::Full;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn breach(&self) {
        if !self.exceeded.swap(true, Ordering::SeqCst) {
            self.kill.fire();
        }
    }

    /// Return reserved space that was not actually written, e.g. when a
    /// partial write is shortened to land on a char boundary. Keeps the
    /// running total equal to the bytes on disk.
    pub fn refund(&self, len: u64) {
        self.written.fetch_sub(len, Ordering::SeqCst);
    }

    /// Total bytes admitted so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn exceeded(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(limit: Option<u64>) -> BudgetGuard {
        BudgetGuard::new(limit, Arc::new(KillSwitch::new()))
    }

    #[test]
    fn unbounded_guard_admits_everything() {
        let g = guard(None);
        assert_eq!(g.admit(1_000_000), Admission::Full);
        assert_eq!(g.total(), 1_000_000);
        assert!(!g.exceeded());
    }

    #[test]
    fn writes_within_limit_are_full() {
        let g = guard(Some(10));
        assert_eq!(g.admit(4), Admission::Full);
        assert_eq!(g.admit(6), Admission::Full);
        assert_eq!(g.total(), 10);
        assert!(!g.exceeded());
    }

    #[test]
    fn overshooting_write_is_truncated_to_remaining_space() {
        let g = guard(Some(10));
        assert_eq!(g.admit(15), Admission::Partial(10));
        assert_eq!(g.total(), 10);
        assert!(g.exceeded());
    }

    #[test]
    fn writes_after_exhaustion_are_rejected() {
        let g = guard(Some(5));
        assert_eq!(g.admit(5), Admission::Full);
        assert_eq!(g.admit(1), Admission::Rejected);
        assert_eq!(g.total(), 5);
        assert!(g.exceeded());
    }

    #[test]
    fn refund_adjusts_total_without_reopening_the_budget() {
        let g = guard(Some(10));
        assert_eq!(g.admit(12), Admission::Partial(10));
        g.refund(3);
        assert_eq!(g.total(), 7);
        assert_eq!(g.admit(5), Admission::Rejected);
        assert_eq!(g.total(), 7);
    }

    #[test]
    fn breach_fires_kill_switch_once() {
        let kill = Arc::new(KillSwitch::new());
        let g = BudgetGuard::new(Some(1), Arc::clone(&kill));
        assert_eq!(g.admit(2), Admission::Partial(1));
        assert!(kill.fired());
    }
}
