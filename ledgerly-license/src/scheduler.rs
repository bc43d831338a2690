//! Self-rescheduling expiry checks.
//!
//! There is at most one pending check. Scheduling a new one aborts the
//! previous one, so the delay can change with the license state without two
//! chains ever running side by side.

use crate::config::LicenseConfig;
use crate::warning::WarningLevel;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay before the next local check for the given state.
///
/// Grace period → grace interval (20 s), `HOURS` warning → hours interval
/// (1 min), otherwise the normal interval (5 min).
#[must_use]
pub fn check_interval(config: &LicenseConfig, level: WarningLevel, in_grace: bool) -> Duration {
    if in_grace {
        config.grace_check_interval()
    } else if level == WarningLevel::Hours {
        config.hours_check_interval()
    } else {
        config.check_interval()
    }
}

struct PendingCheck {
    handle: JoinHandle<()>,
    delay: Duration,
}

/// Owns the single pending one-shot check.
#[derive(Default)]
pub(crate) struct CheckScheduler {
    pending: Mutex<Option<PendingCheck>>,
}

impl CheckScheduler {
    /// Runs `task` after `delay`, replacing any pending check.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn schedule<F, Fut>(&self, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(PendingCheck { handle, delay });

        // When called from the firing task itself this aborts a task that
        // finishes without yielding again, which is harmless.
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    /// Cancels the pending check, if any.
    pub(crate) fn cancel(&self) {
        if let Some(pending) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pending.handle.abort();
        }
    }

    /// Delay of the pending check, if one is scheduled and not yet finished.
    pub(crate) fn pending_delay(&self) -> Option<Duration> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|p| !p.handle.is_finished())
            .map(|p| p.delay)
    }
}

impl Drop for CheckScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
