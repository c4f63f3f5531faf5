// ============================================================================
// Propagation Engine
// ============================================================================
//
// Decides, from the ambient execution context alone, how a transactional
// method relates to the transaction already running in its call tree:
//
//   REQUIRED      join a joinable transaction, else start one
//   REQUIRES_NEW  always start an independent one
//   NESTED        savepoint inside a joinable transaction, else start one
//   NEVER         reject inside a boundary, else run without a transaction
//   SUPPORTS      join a joinable transaction, else run without one
//   MANDATORY     join the active transaction, else reject
//
// A transaction is joinable when the ambient handle is active and the
// enclosing scope was not started with REQUIRES_NEW.
//
// ============================================================================

use super::lifecycle::{self, Ownership};
use super::logger::{ScopeFields, TransactionLogger};
use crate::config::TransactionConfig;
use crate::connection::ConnectionRegistry;
use crate::context::{self, ExecutionContext};
use crate::core::{DeclaredOptions, Propagation, Result, TransactionOptions, TxError};
use crate::interface::ConnectionHandle;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

const MISSING_CONTEXT: &str = "transactional methods require an execution context; \
     run the call tree inside context::enter() at its entrypoint";

struct EngineInner {
    registry: ConnectionRegistry,
    config: TransactionConfig,
    logger: TransactionLogger,
}

/// Transaction propagation engine.
///
/// Cheap to clone; clones share the registry and configuration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use txboundary::{context, Engine, MemoryEngine, Propagation, TransactionConfig, TransactionOptions};
///
/// # #[tokio::main]
/// # async fn main() -> txboundary::Result<()> {
/// let memory = Arc::new(MemoryEngine::new("default"));
/// let config = TransactionConfig::new("default");
/// let engine = Engine::new(config.clone(), config.registry().register(memory.clone()))?;
///
/// let options = TransactionOptions::new().propagation(Propagation::RequiresNew);
/// let answer = context::enter(engine.run(&options, "compute", || async { Ok(42) })).await?;
///
/// assert_eq!(answer, 42);
/// assert_eq!(memory.stats().commits, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(config: TransactionConfig, registry: ConnectionRegistry) -> Result<Self> {
        config.validate()?;
        if registry.default_name() != config.default_connection_name {
            return Err(TxError::Config(format!(
                "registry default '{}' does not match configured default '{}'",
                registry.default_name(),
                config.default_connection_name
            )));
        }

        Ok(Self {
            inner: Arc::new(EngineInner {
                logger: TransactionLogger::new(config.logging),
                registry,
                config,
            }),
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.inner.config
    }

    /// Wrap `invoke` so that every call runs inside the boundary described by `options`.
    pub fn wrap<F>(
        &self,
        options: TransactionOptions,
        method_name: impl Into<String>,
        invoke: F,
    ) -> Transactional<F> {
        let method_name: String = method_name.into();
        Transactional {
            engine: self.clone(),
            options: MethodOptions::Typed(options),
            method_name: Arc::from(method_name),
            invoke,
        }
    }

    /// Wrap `invoke` with the options declared for `method_name` in the configuration.
    ///
    /// Declared options are resolved on every call, so an unsupported
    /// propagation fails the invocation rather than the wiring.
    pub fn declared<F>(&self, method_name: impl Into<String>, invoke: F) -> Transactional<F> {
        let method_name: String = method_name.into();
        Transactional {
            engine: self.clone(),
            options: MethodOptions::Declared(self.inner.config.declared(&method_name)),
            method_name: Arc::from(method_name),
            invoke,
        }
    }

    /// Run `invoke` once inside the boundary described by `options`.
    pub async fn run<T, F, Fut>(
        &self,
        options: &TransactionOptions,
        method_name: &str,
        invoke: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ctx = ambient()?;
        self.execute(ctx, options, method_name, invoke).await
    }

    async fn execute<T, F, Fut>(
        &self,
        ctx: ExecutionContext,
        options: &TransactionOptions,
        method_name: &str,
        invoke: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let propagation = options.propagation_kind();
        let outcome = self.dispatch(&ctx, options, method_name, invoke).await;

        self.inner.logger.settled(
            &ctx,
            method_name,
            if outcome.is_ok() { "ok" } else { "error" },
        );
        outcome.map_err(|err| signal_outer_scope(&ctx, propagation, err))
    }

    async fn dispatch<T, F, Fut>(
        &self,
        ctx: &ExecutionContext,
        options: &TransactionOptions,
        method_name: &str,
        invoke: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let propagation = options.propagation_kind();
        let logger = &self.inner.logger;

        match propagation {
            Propagation::Required | Propagation::Supports if ctx.is_joinable() => {
                self.log_ambient(ctx, options, method_name, "Join Transaction");
                invoke().await
            }
            Propagation::Mandatory if ctx.has_active_transaction() => {
                self.log_ambient(ctx, options, method_name, "Join Transaction");
                invoke().await
            }
            Propagation::Mandatory => Err(self.reject(
                method_name,
                propagation,
                "no active transaction to join for a MANDATORY method",
            )),
            Propagation::Required | Propagation::RequiresNew => {
                self.begin_new(ctx, options, method_name, invoke).await
            }
            Propagation::Nested => match ctx.active_handle() {
                Some(handle) if ctx.is_joinable() => {
                    let handle = Arc::clone(handle);
                    self.log(
                        ctx,
                        handle.as_ref(),
                        options,
                        method_name,
                        "Make savepoint, Wrap Transaction",
                    );

                    let child = ctx.child(Arc::clone(&handle), propagation);
                    let isolation = options.isolation_level();
                    let scope =
                        lifecycle::run_scope(handle, isolation, Ownership::Savepoint, logger, invoke);
                    context::run_with(child, scope).await
                }
                _ => self.begin_new(ctx, options, method_name, invoke).await,
            },
            Propagation::Never if ctx.active_handle().is_some() => Err(self.reject(
                method_name,
                propagation,
                "methods with NEVER propagation cannot run within a transaction boundary",
            )),
            Propagation::Never | Propagation::Supports => {
                let handle = self.acquire(options)?;
                self.log(ctx, handle.as_ref(), options, method_name, "Without Transaction");

                let child = ctx.child(Arc::clone(&handle), propagation);
                context::run_with(child, lifecycle::run_detached(handle, logger, invoke)).await
            }
        }
    }

    /// Acquire a fresh handle and run `invoke` in its own owned transaction.
    async fn begin_new<T, F, Fut>(
        &self,
        ctx: &ExecutionContext,
        options: &TransactionOptions,
        method_name: &str,
        invoke: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.acquire(options)?;
        self.log(ctx, handle.as_ref(), options, method_name, "New Transaction");

        let child = ctx.child(Arc::clone(&handle), options.propagation_kind());
        let isolation = options.isolation_level();
        let logger = &self.inner.logger;
        let scope = lifecycle::run_scope(handle, isolation, Ownership::Owner, logger, invoke);
        context::run_with(child, scope).await
    }

    fn acquire(&self, options: &TransactionOptions) -> Result<Arc<dyn ConnectionHandle>> {
        self.inner
            .registry
            .get(options.connection_name())?
            .create_handle()
    }

    fn reject(&self, method_name: &str, propagation: Propagation, reason: &str) -> TxError {
        let err = TxError::BoundaryViolation(reason.to_string());
        self.inner.logger.rejected(method_name, propagation, &err);
        err
    }

    fn log(
        &self,
        ctx: &ExecutionContext,
        handle: &dyn ConnectionHandle,
        options: &TransactionOptions,
        method_name: &str,
        message: &str,
    ) {
        self.inner.logger.decision(
            message,
            &ScopeFields {
                context_id: ctx.id(),
                connection: handle.connection_name(),
                method: method_name,
                isolation: options.isolation_level(),
                propagation: options.propagation_kind(),
            },
        );
    }

    fn log_ambient(
        &self,
        ctx: &ExecutionContext,
        options: &TransactionOptions,
        method_name: &str,
        message: &str,
    ) {
        if let Some(handle) = ctx.active_handle() {
            self.log(ctx, handle.as_ref(), options, method_name, message);
        }
    }
}

/// Decide whether an error leaving a scope carries the rollback signal.
///
/// The signal is added when the scope was REQUIRES_NEW or NESTED, or when its
/// immediate parent was REQUIRES_NEW. At the outermost boundary nothing can
/// consume it, so the caller gets the error as raised.
fn signal_outer_scope(ctx: &ExecutionContext, propagation: Propagation, err: TxError) -> TxError {
    if ctx.active_handle().is_none() {
        return err.into_unsuppressed();
    }

    if propagation.suppresses_outer_rollback() || ctx.is_fresh_start() {
        err.suppress_rollback()
    } else {
        err
    }
}

fn ambient() -> Result<ExecutionContext> {
    context::current().ok_or_else(|| TxError::Initialization(MISSING_CONTEXT.to_string()))
}

enum MethodOptions {
    Typed(TransactionOptions),
    Declared(DeclaredOptions),
}

impl MethodOptions {
    fn resolve(&self) -> Result<Cow<'_, TransactionOptions>> {
        match self {
            MethodOptions::Typed(options) => Ok(Cow::Borrowed(options)),
            MethodOptions::Declared(declared) => declared.resolve().map(Cow::Owned),
        }
    }
}

/// A method wrapped in a transaction boundary.
///
/// Arguments, return values and errors pass through unchanged.
pub struct Transactional<F> {
    engine: Engine,
    options: MethodOptions,
    method_name: Arc<str>,
    invoke: F,
}

impl<F> Transactional<F> {
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub async fn call<A, T, Fut>(&self, args: A) -> Result<T>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ctx = ambient()?;
        let options = self.options.resolve()?;
        self.engine
            .execute(ctx, &options, &self.method_name, || (self.invoke)(args))
            .await
    }
}
