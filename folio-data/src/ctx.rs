use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cancellation or deadline failure surfaced by [`Ctx::check`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CtxError {
    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cooperative cancellation handle threaded through every long-running
/// operation.
///
/// Long operations call [`Ctx::check`] at each suspension point and surface
/// the error without writing partial state. Cloning is cheap; clones observe
/// the same cancel flag.
#[derive(Debug, Clone, Default)]
pub struct Ctx {
    cancelled: Arc<AtomicBool>,
    deadline: Option<DateTime<Utc>>,
}

impl Ctx {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable context plus the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancelled: Arc::clone(&cancelled),
                deadline: None,
            },
            CancelHandle { cancelled },
        )
    }

    /// Attach a deadline; the earlier of an existing and the new deadline wins.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// True iff the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Surface `Cancelled` or `DeadlineExceeded`, else `Ok`.
    pub fn check(&self) -> Result<(), CtxError> {
        if self.is_cancelled() {
            return Err(CtxError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Utc::now() > deadline
        {
            return Err(CtxError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Cancels the [`Ctx`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_fails() {
        assert!(Ctx::background().check().is_ok());
    }

    #[test]
    fn test_cancel_propagates_to_clones() {
        let (ctx, handle) = Ctx::with_cancel();
        let clone = ctx.clone();

        assert!(clone.check().is_ok());
        handle.cancel();
        assert_eq!(clone.check(), Err(CtxError::Cancelled));
        assert_eq!(ctx.check(), Err(CtxError::Cancelled));
    }

    #[test]
    fn test_elapsed_deadline_is_exceeded() {
        let ctx = Ctx::background().with_deadline(Utc::now() - chrono::TimeDelta::seconds(1));
        assert_eq!(ctx.check(), Err(CtxError::DeadlineExceeded));
    }
}
