// src/context.rs

//! Cancellation and deadlines for commands built with
//! [`Factory::command_context`](crate::exec::Factory::command_context).
//!
//! A [`Context`] ends either when its [`CancelHandle`] is used (or a parent's
//! is), or when its deadline passes. Children inherit the parent's
//! cancellation and never outlive the parent's deadline.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context ended.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    deadline: Option<Instant>,
    reason: OnceLock<ContextError>,
    parent: Option<Context>,
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A context that never ends on its own.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                deadline: None,
                reason: OnceLock::new(),
                parent: None,
            }),
        }
    }

    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        self.child(self.inner.deadline)
    }

    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context ending at `deadline`, or earlier if this context ends
    /// first.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        let deadline = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.child(Some(deadline))
    }

    fn child(&self, deadline: Option<Instant>) -> (Context, CancelHandle) {
        let ctx = Context {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                deadline,
                reason: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        };
        let handle = CancelHandle { ctx: ctx.clone() };
        (ctx, handle)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// `None` while the context is live. The first reason observed is kept,
    /// so a context never changes its answer once it has ended.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(reason) = self.inner.reason.get() {
            return Some(*reason);
        }
        let observed = self
            .inner
            .parent
            .as_ref()
            .and_then(Context::err)
            .or_else(|| self.deadline_passed().then_some(ContextError::DeadlineExceeded))?;
        Some(*self.inner.reason.get_or_init(|| observed))
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context has ended, yielding the reason.
    pub async fn done(&self) -> ContextError {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.inner.token.cancelled().await,
        }
        self.err().unwrap_or(ContextError::Canceled)
    }

    fn deadline_passed(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// Ends the context it was created with (and all of that context's
/// children).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    ctx: Context,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let reason = if self.ctx.deadline_passed() {
            ContextError::DeadlineExceeded
        } else {
            ContextError::Canceled
        };
        // The first reason wins; a later cancel does not rewrite history.
        let _ = self.ctx.inner.reason.set(reason);
        self.ctx.inner.token.cancel();
    }
}
