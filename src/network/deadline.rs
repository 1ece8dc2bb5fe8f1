//! Shared deadline and cancellation signal
//!
//! A [`Deadline`] is threaded through every network operation and every concurrent
//! fan-out. It combines an optional expiry instant with a cancellation flag. Children
//! created with [`Deadline::child`] observe their own flag plus every ancestor's flag and
//! inherit the tightest expiry, so a narrow "first match found" cancellation composes
//! with the run-wide timeout without either one knowing about the other.

use crate::error::{AuditError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable handle to a cancellable deadline
#[derive(Debug, Clone)]
pub struct Deadline {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    expires_at: Option<Instant>,
    cancelled: watch::Sender<bool>,
    parent: Option<Deadline>,
}

impl Deadline {
    /// A deadline that never expires (it can still be cancelled)
    pub fn unbounded() -> Self {
        Self::build(None, None)
    }

    /// A deadline that expires `timeout` from now; a timeout past the clock's range is unbounded
    pub fn after(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout), None)
    }

    /// A child sharing this deadline's expiry; cancelling the child leaves the parent alone
    pub fn child(&self) -> Self {
        Self::build(self.inner.expires_at, Some(self.clone()))
    }

    /// A child whose expiry is the earlier of this deadline's and `timeout` from now
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let expires_at = match (self.inner.expires_at, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self::build(expires_at, Some(self.clone()))
    }

    fn build(expires_at: Option<Instant>, parent: Option<Deadline>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                expires_at,
                cancelled,
                parent,
            }),
        }
    }

    /// Cancel this deadline and every child derived from it
    pub fn cancel(&self) {
        self.inner.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain().any(|d| *d.inner.cancelled.borrow())
    }

    pub fn is_expired(&self) -> bool {
        self.inner
            .expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }

    /// Time left before expiry, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn chain(&self) -> impl Iterator<Item = &Deadline> {
        std::iter::successors(Some(self), |d| d.inner.parent.as_ref())
    }

    /// Resolves once this deadline or any ancestor is cancelled
    pub async fn cancelled(&self) {
        let receivers: Vec<_> = self
            .chain()
            .map(|d| Box::pin(wait_for_cancel(d.inner.cancelled.subscribe())))
            .collect();
        futures_util::future::select_all(receivers).await;
    }

    /// Resolves once the expiry instant passes; never resolves when unbounded
    pub async fn expired(&self) {
        match self.inner.expires_at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Drive `operation` to completion unless the deadline is cancelled or expires first.
    ///
    /// Cancellation is checked before expiry, and both before the operation's own result,
    /// so an abandoned call is always reported as `Canceled` or `TimedOut`, never as
    /// whatever error the interrupted operation would have produced.
    pub async fn run<T, F>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(AuditError::canceled(format!("{} canceled before start", label)));
        }
        if self.is_expired() {
            return Err(AuditError::timed_out(format!("{} deadline already elapsed", label)));
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AuditError::canceled(format!(
                "{} canceled by user interruption or a competing result", label
            ))),
            _ = self.expired() => Err(AuditError::timed_out(format!(
                "{} timed out, consider increasing the timeout", label
            ))),
            result = operation => result,
        }
    }
}

async fn wait_for_cancel(mut receiver: watch::Receiver<bool>) {
    loop {
        let cancelled = *receiver.borrow_and_update();
        if cancelled {
            return;
        }
        if receiver.changed().await.is_err() {
            // Sender gone: nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}
