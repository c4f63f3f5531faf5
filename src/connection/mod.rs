pub mod memory;
pub mod registry;

pub use crate::interface::{ConnectionEngine, ConnectionHandle};
pub use memory::{EngineStats, MemoryDatabase, MemoryEngine, MemoryHandle};
pub use registry::ConnectionRegistry;
