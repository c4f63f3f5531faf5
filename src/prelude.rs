//! Recommended imports grouped by abstraction level.
//!
//! The root of the prelude is enough for application code declaring
//! transactional methods. `advanced` exposes the seams needed to plug in a
//! connection engine of your own.

pub use crate::config::{LoggingMode, TransactionConfig};
pub use crate::context::{self, ExecutionContext};
pub use crate::core::{IsolationLevel, Propagation, Result, TransactionOptions, TxError};
pub use crate::repository::{DataAccessHandle, TableRepository};
pub use crate::transaction::{Engine, Transactional};

pub mod advanced {
    //! Escape hatch for connection engine authors.
    //!
    //! Application code should normally stay on the prelude root.
    pub use crate::connection::{ConnectionRegistry, EngineStats, MemoryEngine, MemoryHandle};
    pub use crate::context::{ParentFlag, current, run_with};
    pub use crate::core::DeclaredOptions;
    pub use crate::interface::{ConnectionEngine, ConnectionHandle};
    pub use crate::transaction::{Ownership, TransactionLogger};
}
