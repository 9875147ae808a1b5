//! Failure-streak tracking for the polling loop.
//!
//! Every failed cycle extends the streak and doubles the wait before the next
//! attempt, up to a cap. A successful cycle resets it. The loop itself never
//! gives up; past the alert threshold each failure is logged at error level.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ivspread_core::BackoffConfig;

#[derive(Debug)]
pub struct FailureStreak {
    config: BackoffConfig,
    consecutive_failures: AtomicU32,
}

impl FailureStreak {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Current number of consecutive failed cycles.
    pub fn streak(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if previous > 0 {
            tracing::info!(previous_streak = previous, "Cycle succeeded, failure streak reset");
        }
    }

    /// Records a failed cycle and returns the new streak length.
    pub fn record_failure(&self) -> u32 {
        let streak = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.is_alerting() {
            tracing::error!(
                streak,
                threshold = self.config.alert_after_failures,
                "ALERT: polling cycle keeps failing"
            );
        } else {
            tracing::warn!(streak, "Polling cycle failed");
        }
        streak
    }

    /// True once the streak has reached the alert threshold.
    pub fn is_alerting(&self) -> bool {
        self.config.alert_after_failures > 0 && self.streak() >= self.config.alert_after_failures
    }

    /// `poll · 2^min(streak, max_exponent)`, capped at `max_backoff_secs`.
    pub fn delay(&self, poll_interval: Duration) -> Duration {
        let exponent = self.streak().min(self.config.max_exponent).min(31);
        let scaled = poll_interval.saturating_mul(1u32 << exponent);
        scaled.min(Duration::from_secs(self.config.max_backoff_secs))
    }
}
