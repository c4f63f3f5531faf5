// ============================================================================
// Transaction Boundary Module
// ============================================================================
//
// Declarative transaction boundaries over async call trees.
//
// - engine:    propagation decisions (join, new, savepoint, reject, detached)
// - lifecycle: connect/begin/commit-or-rollback/release for one scope
// - logger:    tracing events gated by the configured logging mode
//
// ============================================================================

pub mod engine;
pub mod lifecycle;
pub mod logger;

pub use engine::{Engine, Transactional};
pub use lifecycle::Ownership;
pub use logger::TransactionLogger;
