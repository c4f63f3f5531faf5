use crate::connection::ConnectionRegistry;
use crate::core::{DeclaredOptions, Result, TxError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How much of the transaction progress is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingMode {
    /// Every decision and lifecycle step
    All,
    /// Propagation decisions
    Debug,
    /// Informational events only
    #[default]
    Log,
    /// Failures only
    Error,
}

impl fmt::Display for LoggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingMode::All => write!(f, "all"),
            LoggingMode::Debug => write!(f, "debug"),
            LoggingMode::Log => write!(f, "log"),
            LoggingMode::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LoggingMode {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(LoggingMode::All),
            "debug" => Ok(LoggingMode::Debug),
            "log" => Ok(LoggingMode::Log),
            "error" => Ok(LoggingMode::Error),
            other => Err(TxError::Config(format!("unknown logging mode: {}", other))),
        }
    }
}

/// Transaction engine configuration
///
/// # Examples
///
/// ```
/// use txboundary::{LoggingMode, TransactionConfig};
///
/// let config = TransactionConfig::from_json(r#"{
///     "default_connection_name": "primary",
///     "logging": "all",
///     "methods": {
///         "AuditService::record": { "propagation": "REQUIRES_NEW" }
///     }
/// }"#).unwrap();
///
/// assert_eq!(config.default_connection_name, "primary");
/// assert_eq!(config.logging, LoggingMode::All);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Connection used when a method does not name one
    pub default_connection_name: String,

    #[serde(default)]
    pub logging: LoggingMode,

    /// Declared options per method name
    #[serde(default)]
    pub methods: HashMap<String, DeclaredOptions>,
}

impl TransactionConfig {
    pub fn new(default_connection_name: &str) -> Self {
        Self {
            default_connection_name: default_connection_name.to_string(),
            logging: LoggingMode::default(),
            methods: HashMap::new(),
        }
    }

    /// Set the logging mode
    pub fn logging(mut self, mode: LoggingMode) -> Self {
        self.logging = mode;
        self
    }

    /// Declare options for a method
    pub fn method(mut self, name: &str, options: DeclaredOptions) -> Self {
        self.methods.insert(name.to_string(), options);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| TxError::Config(e.to_string()))
    }

    /// Declared options for `method`; undeclared methods get the defaults.
    pub fn declared(&self, method: &str) -> DeclaredOptions {
        self.methods.get(method).cloned().unwrap_or_default()
    }

    /// Empty registry resolving unnamed lookups to the default connection.
    pub fn registry(&self) -> ConnectionRegistry {
        ConnectionRegistry::new(self.default_connection_name.clone())
    }

    /// Validate configuration
    ///
    /// Method options are not resolved here; they surface at invocation.
    pub fn validate(&self) -> Result<()> {
        if self.default_connection_name.trim().is_empty() {
            return Err(TxError::Config(
                "default_connection_name cannot be empty".to_string(),
            ));
        }

        if let Some(name) = self.methods.keys().find(|name| name.trim().is_empty()) {
            return Err(TxError::Config(format!("invalid method name: '{}'", name)));
        }

        Ok(())
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
