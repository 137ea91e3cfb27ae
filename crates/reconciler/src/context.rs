//! Cancellation and deadline carried through a reconciliation pass.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Interrupted;

/// Per-pass context handed to every store and registry call.
///
/// Cloning shares the cancellation token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct ReconcileContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ReconcileContext {
    /// Context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an externally owned token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
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
        self.token.is_cancelled()
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns the interruption converted into the caller's error type.
    pub fn check<E: From<Interrupted>>(&self) -> Result<(), E> {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled.into());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(Interrupted::DeadlineExceeded.into())
            }
            _ => Ok(()),
        }
    }

    /// Drive `operation` to completion unless the context is cancelled or expires first.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error, or the interruption converted into it.
    pub async fn run<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<Interrupted>,
        F: Future<Output = Result<T, E>>,
    {
        self.check()?;

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Interrupted::Cancelled.into()),
            () = expired => Err(Interrupted::DeadlineExceeded.into()),
            result = operation => result,
        }
    }
}
