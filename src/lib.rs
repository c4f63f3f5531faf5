// ============================================================================
// txboundary Library
// ============================================================================
//
// Declarative transaction boundaries for async call trees: wrap a method with
// a propagation kind and the engine decides, from the ambient execution
// context, whether it joins, opens, nests inside, or refuses a transaction.
//
// ============================================================================

pub mod config;
pub mod connection;
pub mod context;
pub mod core;
pub mod interface;
pub mod prelude;
pub mod repository;
pub mod transaction;

// Re-export main types for convenience
pub use config::{LoggingMode, TransactionConfig};
pub use connection::{ConnectionRegistry, EngineStats, MemoryDatabase, MemoryEngine, MemoryHandle};
pub use context::{ExecutionContext, ParentFlag};
pub use crate::core::{DeclaredOptions, IsolationLevel, Propagation, Result, TransactionOptions, TxError};
pub use interface::{ConnectionEngine, ConnectionHandle};
pub use repository::{DataAccessHandle, TableRepository};
pub use transaction::{Engine, Ownership, TransactionLogger, Transactional};

/// Build an [`Engine`] over a single in-memory connection.
///
/// The connection is registered under the configured default name.
///
/// # Examples
///
/// ```
/// use txboundary::{context, Propagation, TableRepository, TransactionConfig, TransactionOptions};
///
/// # #[tokio::main]
/// # async fn main() -> txboundary::Result<()> {
/// let (engine, memory) = txboundary::in_memory(TransactionConfig::default())?;
/// let users = TableRepository::new("users");
///
/// let create = engine.wrap(TransactionOptions::new(), "UserService::create", |name: &'static str| {
///     let users = users.clone();
///     async move { users.insert(name, &serde_json::json!({ "name": name })) }
/// });
///
/// context::enter(create.call("alice")).await?;
///
/// assert_eq!(memory.database().keys("users")?, vec!["alice"]);
/// # Ok(())
/// # }
/// ```
pub fn in_memory(
    config: TransactionConfig,
) -> Result<(Engine, std::sync::Arc<MemoryEngine>)> {
    let memory = std::sync::Arc::new(MemoryEngine::new(config.default_connection_name.clone()));
    let registry = config.registry().register(memory.clone());
    let engine = Engine::new(config, registry)?;
    Ok((engine, memory))
}
