use crate::core::{Result, TxError};
use crate::interface::ConnectionEngine;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps connection names to the engines producing their handles.
///
/// Lookups without a name resolve to the default connection name.
#[derive(Clone)]
pub struct ConnectionRegistry {
    default_name: String,
    engines: HashMap<String, Arc<dyn ConnectionEngine>>,
}

impl ConnectionRegistry {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            default_name: default_name.into(),
            engines: HashMap::new(),
        }
    }

    /// Register an engine under its own name, replacing any previous one.
    pub fn register(mut self, engine: Arc<dyn ConnectionEngine>) -> Self {
        self.insert(engine);
        self
    }

    pub fn insert(&mut self, engine: Arc<dyn ConnectionEngine>) -> Option<Arc<dyn ConnectionEngine>> {
        self.engines.insert(engine.name().to_string(), engine)
    }

    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn ConnectionEngine>> {
        let name = name.unwrap_or(&self.default_name);
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| TxError::ConnectionNotFound(name.to_string()))
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("default_name", &self.default_name)
            .field("engines", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::MemoryEngine;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new("default")
            .register(Arc::new(MemoryEngine::new("default")))
            .register(Arc::new(MemoryEngine::new("audit")))
    }

    #[test]
    fn test_get_default() {
        let engine = registry().get(None).unwrap();
        assert_eq!(engine.name(), "default");
    }

    #[test]
    fn test_get_named() {
        let engine = registry().get(Some("audit")).unwrap();
        assert_eq!(engine.name(), "audit");
        assert_eq!(registry().names(), vec!["audit", "default"]);
    }

    #[test]
    fn test_unknown_name() {
        let err = registry().get(Some("reporting")).err().unwrap();
        assert!(matches!(err, TxError::ConnectionNotFound(ref name) if name == "reporting"));
    }

    #[test]
    fn test_unregistered_default() {
        let registry = ConnectionRegistry::new("primary")
            .register(Arc::new(MemoryEngine::new("audit")));

        let err = registry.get(None).err().unwrap();
        assert_eq!(err.to_string(), "Connection 'primary' is not registered");
    }
}
