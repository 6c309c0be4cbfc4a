//! Cancellation for retry calls
//!
//! A `CancelSignal` fires when its token is cancelled or its deadline
//! passes, whichever comes first.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-supplied cancellation token and/or deadline
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that fires only when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. a child of an application-wide token
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now
    ///
    /// A timeout too large to represent leaves the deadline unset.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the token is cancelled or the deadline passes
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Sleep for `delay` unless the signal fires first
///
/// Returns `false` if the sleep was cut short.
pub(crate) async fn sleep_or_cancel(delay: Duration, signal: &CancelSignal) -> bool {
    if signal.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }

    tokio::select! {
        biased;
        () = signal.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
