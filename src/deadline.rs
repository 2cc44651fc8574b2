//! Cooperative cancellation for blocking calls
//!
//! A [`Deadline`] is handed to every registry, provider and cluster call. Calls
//! check it before starting and cap their HTTP timeouts to the time remaining,
//! so an expired run returns promptly instead of waiting on the network.

use std::time::{Duration, Instant};

use crate::error::{Result, transport};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(timeout),
        }
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Fails with `Cancelled` once the deadline has passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            return Err(transport::cancelled(operation));
        }
        Ok(())
    }

    /// Caps a per-request timeout to the time remaining.
    pub fn cap(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(left) => timeout.min(left.max(Duration::from_millis(1))),
            None => timeout,
        }
    }
}
