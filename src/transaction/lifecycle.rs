//! Connect / begin / run / commit-or-rollback / release protocol for one scope.

use super::logger::TransactionLogger;
use crate::core::{IsolationLevel, Result};
use crate::interface::ConnectionHandle;
use std::future::Future;
use std::sync::Arc;

/// Who releases the handle once the scope settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The scope acquired the handle: connect it, and release it when done.
    Owner,
    /// Savepoint on a handle owned by an enclosing scope: never released here.
    Savepoint,
}

impl Ownership {
    pub fn releases(&self) -> bool {
        matches!(self, Ownership::Owner)
    }
}

/// Run `target` inside a transaction (or savepoint) on `handle`.
///
/// Success commits. Failure rolls back, unless the failure carries the
/// rollback signal, in which case this scope's work is committed and the
/// signal is consumed. The target's error is returned either way; a failing
/// commit or rollback on that path is only logged. Owner scopes release the
/// handle last, whatever happened before.
pub(crate) async fn run_scope<T, F, Fut>(
    handle: Arc<dyn ConnectionHandle>,
    isolation: IsolationLevel,
    ownership: Ownership,
    logger: &TransactionLogger,
    target: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Err(err) = open(handle.as_ref(), isolation, ownership).await {
        if ownership.releases() {
            release_quietly(handle.as_ref(), logger).await;
        }
        return Err(err);
    }

    let settled = match target().await {
        Ok(value) => handle.commit().await.map(|_| value),
        Err(err) if err.is_rollback_suppressed() => {
            if let Err(commit_err) = handle.commit().await {
                logger.cleanup_failed(handle.as_ref(), "commit", &commit_err);
            }
            Err(err.into_unsuppressed())
        }
        Err(err) => {
            if let Err(rollback_err) = handle.rollback().await {
                logger.cleanup_failed(handle.as_ref(), "rollback", &rollback_err);
            }
            Err(err)
        }
    };

    if ownership.releases() {
        release_quietly(handle.as_ref(), logger).await;
    }

    settled
}

async fn open(
    handle: &dyn ConnectionHandle,
    isolation: IsolationLevel,
    ownership: Ownership,
) -> Result<()> {
    if ownership.releases() {
        handle.connect().await?;
    }
    handle.begin(isolation).await
}

/// Release without a transaction around the handle (NEVER, SUPPORTS).
pub(crate) async fn run_detached<T, F, Fut>(
    handle: Arc<dyn ConnectionHandle>,
    logger: &TransactionLogger,
    target: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = target().await;
    release_quietly(handle.as_ref(), logger).await;
    outcome
}

pub(crate) async fn release_quietly(handle: &dyn ConnectionHandle, logger: &TransactionLogger) {
    if let Err(err) = handle.release().await {
        logger.cleanup_failed(handle, "release", &err);
    }
}
