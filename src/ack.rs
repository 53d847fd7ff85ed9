use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::temperatures_match;
use crate::types::Mode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingAck {
    pub sent_at: Instant,
    pub expected_mode: Option<Mode>,
    pub expected_target: Option<f64>,
}

/// Tracks whether the last command showed up in the device's reported state.
/// At most one expectation is outstanding; a new one replaces the old.
#[derive(Debug)]
pub(crate) struct AckTracker {
    timeout: Duration,
    pending: Option<PendingAck>,
}

impl AckTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    /// Returns the instant at which the expectation expires.
    pub fn start(
        &mut self,
        expected_mode: Option<Mode>,
        expected_target: Option<f64>,
        now: Instant,
    ) -> Instant {
        self.pending = Some(PendingAck {
            sent_at: now,
            expected_mode,
            expected_target,
        });
        now + self.timeout
    }

    /// Clears the expectation if both expected fields match. Returns true if it
    /// was cleared by this call.
    pub fn check(&mut self, reported_mode: Mode, reported_target: f64) -> bool {
        let Some(pending) = self.pending else {
            return false;
        };
        let mode_ok = pending.expected_mode.is_none_or(|m| m == reported_mode);
        let target_ok = pending
            .expected_target
            .is_none_or(|t| temperatures_match(t, reported_target));
        if mode_ok && target_ok {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Called when the timeout fires; hands back the unmet expectation.
    pub fn expire(&mut self) -> Option<PendingAck> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&PendingAck> {
        self.pending.as_ref()
    }
}
