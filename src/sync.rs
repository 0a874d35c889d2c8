//! Wake-up and cooperative interruption primitives.
//!
//! [`WakeSignal`] is an auto-reset event with a timed wait. [`Interrupt`] is
//! the flag other tasks or threads use to abort a session's blocked I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Auto-reset, single-slot wake-up notification.
///
/// A `wake()` issued while nobody sleeps is remembered: the next `sleep()`
/// returns immediately and consumes it. Multiple wakes before a sleep collapse
/// into one.
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for up to `duration`.
    ///
    /// Returns `true` if the full duration elapsed, `false` if woken.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.notify.notified() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Wait until woken, without a deadline.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Wake the sleeper, or arm the next sleep if there is none.
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

/// Cooperative interruption flag.
///
/// `interrupt()` sets the flag and wakes any I/O waiting on it. The I/O call
/// observing it fails with [`Error::Interrupted`] and clears the flag.
#[derive(Debug, Default)]
pub struct Interrupt {
    requested: AtomicBool,
    signal: WakeSignal,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption.
    pub fn interrupt(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.signal.wake();
    }

    pub fn is_interrupted(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear a pending request without reporting it.
    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// Fail with [`Error::Interrupted`] if interruption was requested, clearing the flag.
    pub fn check(&self) -> Result<()> {
        if self
            .requested
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Interruptible sleep: `Ok(())` after `duration`, `Err(Interrupted)` if interrupted first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        if !self.signal.sleep(duration).await {
            self.check()?;
        }
        Ok(())
    }

    /// Resolves once interruption has been requested.
    pub(crate) async fn requested(&self) {
        loop {
            if self.is_interrupted() {
                return;
            }
            // Stale wake-ups (flag already cleared by check) loop back to waiting.
            self.signal.wait().await;
        }
    }
}
