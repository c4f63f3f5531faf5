//! Task-scoped carrier for the ambient [`ExecutionContext`].
//!
//! The context set by [`run_with`] is visible to the whole continuation of the
//! given future and to nothing else: tasks spawned elsewhere, or sibling
//! futures polled concurrently by the runtime, keep their own context.

use super::ExecutionContext;
use std::future::Future;

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

/// The ambient context of the running call tree, if an entrypoint established one.
pub fn current() -> Option<ExecutionContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}

/// Run `fut` with `ctx` as its ambient context.
pub async fn run_with<F>(ctx: ExecutionContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// Entrypoint contract: run `fut` inside a fresh root context.
///
/// Call this once per request or job before any transactional method runs.
pub async fn enter<F>(fut: F) -> F::Output
where
    F: Future,
{
    run_with(ExecutionContext::root(), fut).await
}
