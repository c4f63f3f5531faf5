use crate::core::{IsolationLevel, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// One physical connection/transaction resource.
///
/// Implement this trait to put any database driver behind the propagation engine.
/// A second `begin` on a handle whose transaction is already active must open a
/// savepoint; `commit`/`rollback` then settle only the innermost savepoint.
///
/// Lifecycle: created → connected → transaction active → committed/rolled back → released.
/// A released handle is never used again.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Identifier unique within the owning engine.
    fn id(&self) -> u64;

    /// Name of the connection this handle was produced for.
    fn connection_name(&self) -> &str;

    /// Whether a transaction (or savepoint) is currently open on this handle.
    fn is_active(&self) -> bool;

    async fn connect(&self) -> Result<()>;

    /// Begin a transaction, or a savepoint when one is already active.
    async fn begin(&self, isolation: IsolationLevel) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// Return the underlying connection to its engine.
    async fn release(&self) -> Result<()>;

    /// Query executor used by data-access code against this handle.
    fn executor(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Producer of connection handles for one named connection.
pub trait ConnectionEngine: Send + Sync {
    fn name(&self) -> &str;

    fn create_handle(&self) -> Result<Arc<dyn ConnectionHandle>>;
}
