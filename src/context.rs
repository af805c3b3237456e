//! Cancellation and deadlines for a single agent run.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};

/// Cooperative cancellation handle threaded through model calls, tool calls and memory access.
///
/// Cloning shares the same token, so cancelling any clone cancels them all.
#[derive(Clone, Debug)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context cancelled together with `self` that can also be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The context's error if it is already done.
    pub fn err(&self) -> Option<AgentError> {
        if self.token.is_cancelled() {
            return Some(AgentError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(AgentError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> AgentError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => AgentError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => AgentError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                AgentError::Cancelled
            }
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => out,
        }
    }
}
