use super::{Result, TxError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction propagation policy.
///
/// Governs how a method's transactional requirement relates to the transaction
/// already running in the ambient execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the running transaction, or start one if none is joinable.
    #[default]
    Required,
    /// Always start an independent physical transaction.
    RequiresNew,
    /// Savepoint inside the running transaction, or start one if none is joinable.
    Nested,
    /// Refuse to run inside any transaction boundary.
    Never,
    /// Join the running transaction if there is one, otherwise run without.
    Supports,
    /// Join the running transaction; fail if there is none.
    Mandatory,
}

impl Propagation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Nested => "NESTED",
            Propagation::Never => "NEVER",
            Propagation::Supports => "SUPPORTS",
            Propagation::Mandatory => "MANDATORY",
        }
    }

    /// Whether an error leaving a scope of this kind carries the rollback signal.
    pub fn suppresses_outer_rollback(&self) -> bool {
        matches!(self, Propagation::RequiresNew | Propagation::Nested)
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "REQUIRED" => Ok(Propagation::Required),
            "REQUIRES_NEW" => Ok(Propagation::RequiresNew),
            "NESTED" => Ok(Propagation::Nested),
            "NEVER" => Ok(Propagation::Never),
            "SUPPORTS" => Ok(Propagation::Supports),
            "MANDATORY" => Ok(Propagation::Mandatory),
            other => Err(TxError::UnsupportedPropagation(other.to_string())),
        }
    }
}

/// Isolation level requested when beginning a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse isolation level from string (SQL syntax).
impl FromStr for IsolationLevel {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().replace('_', " ").as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(TxError::UnsupportedIsolation(s.to_string())),
        }
    }
}

/// Options declared on a transactional method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    connection_name: Option<String>,
    isolation_level: IsolationLevel,
    propagation: Propagation,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection name (falls back to the registry default when unset)
    pub fn connection(mut self, name: &str) -> Self {
        self.connection_name = Some(name.to_string());
        self
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn connection_name(&self) -> Option<&str> {
        self.connection_name.as_deref()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn propagation_kind(&self) -> Propagation {
        self.propagation
    }
}

/// Untyped method options as they appear in configuration.
///
/// Values are kept as written and only resolved when the method is invoked,
/// so a misspelled propagation surfaces as an invocation error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation: Option<String>,
}

impl DeclaredOptions {
    pub fn resolve(&self) -> Result<TransactionOptions> {
        let propagation = match &self.propagation {
            Some(name) => name.parse()?,
            None => Propagation::default(),
        };
        let isolation_level = match &self.isolation_level {
            Some(name) => name.parse()?,
            None => IsolationLevel::default(),
        };

        Ok(TransactionOptions {
            connection_name: self.connection_name.clone(),
            isolation_level,
            propagation,
        })
    }
}

impl From<&TransactionOptions> for DeclaredOptions {
    fn from(options: &TransactionOptions) -> Self {
        Self {
            connection_name: options.connection_name.clone(),
            isolation_level: Some(options.isolation_level.to_string()),
            propagation: Some(options.propagation.to_string()),
        }
    }
}
