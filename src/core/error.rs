use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Propagation '{0}' is not supported")]
    UnsupportedPropagation(String),

    #[error("Isolation level '{0}' is not supported")]
    UnsupportedIsolation(String),

    #[error("Transaction boundary violation: {0}")]
    BoundaryViolation(String),

    #[error("Connection '{0}' is not registered")]
    ConnectionNotFound(String),

    #[error("No active connection: {0}")]
    NoActiveConnection(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    /// Error produced by the wrapped target method.
    #[error(transparent)]
    Target(#[from] anyhow::Error),

    /// Rollback signal: the scope that catches this commits its own work.
    #[error(transparent)]
    RollbackSuppressed(Box<TxError>),
}

pub type Result<T> = std::result::Result<T, TxError>;

impl TxError {
    /// Wrap a domain error raised inside a transactional method.
    pub fn target<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Target(anyhow::Error::new(err))
    }

    /// Attach the rollback signal. Attaching twice is a no-op.
    pub fn suppress_rollback(self) -> Self {
        match self {
            Self::RollbackSuppressed(_) => self,
            other => Self::RollbackSuppressed(Box::new(other)),
        }
    }

    pub fn is_rollback_suppressed(&self) -> bool {
        matches!(self, Self::RollbackSuppressed(_))
    }

    /// Strip the rollback signal, returning the error as originally raised.
    pub fn into_unsuppressed(self) -> Self {
        match self {
            Self::RollbackSuppressed(inner) => *inner,
            other => other,
        }
    }

    /// The error as originally raised, ignoring any rollback signal.
    pub fn inner(&self) -> &TxError {
        match self {
            Self::RollbackSuppressed(inner) => inner,
            other => other,
        }
    }

    /// Downcast a target error to its concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self.inner() {
            Self::Target(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for TxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("insufficient funds: {0}")]
    struct InsufficientFunds(u64);

    #[test]
    fn test_signal_is_idempotent() {
        let err = TxError::Connection("boom".into())
            .suppress_rollback()
            .suppress_rollback();

        assert!(err.is_rollback_suppressed());
        assert!(matches!(err.inner(), TxError::Connection(_)));
        assert!(!err.into_unsuppressed().is_rollback_suppressed());
    }

    #[test]
    fn test_signal_keeps_message() {
        let plain = TxError::target(InsufficientFunds(10));
        let expected = plain.to_string();

        assert_eq!(plain.suppress_rollback().to_string(), expected);
    }

    #[test]
    fn test_downcast_through_signal() {
        let err = TxError::target(InsufficientFunds(42)).suppress_rollback();

        let funds = err.downcast_ref::<InsufficientFunds>().unwrap();
        assert_eq!(funds.0, 42);
        assert!(err.downcast_ref::<std::io::Error>().is_none());
    }

    #[test]
    fn test_from_anyhow() {
        let err: TxError = anyhow::anyhow!("plain failure").into();
        assert!(matches!(err, TxError::Target(_)));
        assert_eq!(err.to_string(), "plain failure");
    }
}
