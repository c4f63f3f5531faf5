use crate::config::LoggingMode;
use crate::context::ExecutionContext;
use crate::core::{IsolationLevel, Propagation, TxError};
use crate::interface::ConnectionHandle;
use tracing::{Level, event};

/// Records propagation decisions and scope outcomes through `tracing`.
///
/// Events are emitted under the `transactional` target and filtered by the
/// configured [`LoggingMode`] before they reach the subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionLogger {
    mode: LoggingMode,
}

/// Fields shared by every event about one scope.
pub(crate) struct ScopeFields<'a> {
    pub context_id: &'a str,
    pub connection: &'a str,
    pub method: &'a str,
    pub isolation: IsolationLevel,
    pub propagation: Propagation,
}

impl TransactionLogger {
    pub fn new(mode: LoggingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub fn enabled(&self, level: Level) -> bool {
        let threshold = match self.mode {
            LoggingMode::All => Level::TRACE,
            LoggingMode::Debug => Level::DEBUG,
            LoggingMode::Log => Level::INFO,
            LoggingMode::Error => Level::ERROR,
        };
        level <= threshold
    }

    pub(crate) fn decision(&self, message: &str, fields: &ScopeFields<'_>) {
        if !self.enabled(Level::DEBUG) {
            return;
        }
        event!(
            target: "transactional",
            Level::DEBUG,
            context_id = fields.context_id,
            connection = fields.connection,
            method = fields.method,
            isolation = %fields.isolation,
            propagation = %fields.propagation,
            "{}",
            message
        );
    }

    pub(crate) fn settled(&self, ctx: &ExecutionContext, method: &str, outcome: &str) {
        if !self.enabled(Level::TRACE) {
            return;
        }
        let elapsed_ms = (chrono::Utc::now() - ctx.created_at()).num_milliseconds();
        event!(
            target: "transactional",
            Level::TRACE,
            context_id = ctx.id(),
            method,
            elapsed_ms,
            outcome,
            "scope settled"
        );
    }

    pub(crate) fn rejected(&self, method: &str, propagation: Propagation, err: &TxError) {
        if !self.enabled(Level::WARN) {
            return;
        }
        event!(
            target: "transactional",
            Level::WARN,
            method,
            propagation = %propagation,
            error = %err,
            "transaction boundary rejected"
        );
    }

    /// A commit, rollback or release failed while another outcome was being reported.
    pub(crate) fn cleanup_failed(&self, handle: &dyn ConnectionHandle, step: &str, err: &TxError) {
        if !self.enabled(Level::ERROR) {
            return;
        }
        event!(
            target: "transactional",
            Level::ERROR,
            connection = handle.connection_name(),
            handle_id = handle.id(),
            step,
            error = %err,
            "connection cleanup failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_thresholds() {
        let all = TransactionLogger::new(LoggingMode::All);
        assert!(all.enabled(Level::TRACE));

        let debug = TransactionLogger::new(LoggingMode::Debug);
        assert!(debug.enabled(Level::DEBUG));
        assert!(!debug.enabled(Level::TRACE));

        let log = TransactionLogger::default();
        assert!(log.enabled(Level::INFO));
        assert!(!log.enabled(Level::DEBUG));

        let error = TransactionLogger::new(LoggingMode::Error);
        assert!(error.enabled(Level::ERROR));
        assert!(!error.enabled(Level::WARN));
    }
}
