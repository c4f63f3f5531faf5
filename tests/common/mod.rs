//! Shared fixtures for integration tests
//!
//! `RecordingEngine` journals every handle call so tests can assert the exact
//! lifecycle sequence a propagation kind produces.
#![allow(dead_code)]

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use txboundary::{
    ConnectionEngine, ConnectionHandle, Engine, IsolationLevel, Result, TransactionConfig,
    TxError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Connect,
    Begin(IsolationLevel),
    Commit,
    Rollback,
    Release,
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Connect => "connect",
            Op::Begin(_) => "begin",
            Op::Commit => "commit",
            Op::Rollback => "rollback",
            Op::Release => "release",
        }
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<(u64, Op)>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl Journal {
    fn record(&self, handle_id: u64, op: Op) -> Result<()> {
        self.entries.lock()?.push((handle_id, op));
        if self.failing.lock()?.contains(op.name()) {
            return Err(TxError::Connection(format!("injected {} failure", op.name())));
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<(u64, Op)> {
        self.entries.lock().unwrap().clone()
    }

    /// Calls on one handle, in order.
    pub fn ops(&self, handle_id: u64) -> Vec<Op> {
        self.entries()
            .into_iter()
            .filter(|(id, _)| *id == handle_id)
            .map(|(_, op)| op)
            .collect()
    }

    /// Calls of every handle, without handle ids.
    pub fn all_ops(&self) -> Vec<Op> {
        self.entries().into_iter().map(|(_, op)| op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.entries()
            .iter()
            .filter(|(_, recorded)| recorded.name() == op.name())
            .count()
    }

    pub fn handles(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .entries()
            .iter()
            .filter(|(_, op)| *op == Op::Create)
            .map(|(id, _)| *id)
            .collect();
        ids.dedup();
        ids
    }
}

/// Connection engine whose handles only record what is asked of them.
pub struct RecordingEngine {
    name: String,
    next_id: AtomicU64,
    journal: Arc<Journal>,
}

impl RecordingEngine {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            journal: Arc::new(Journal::default()),
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Make every later call of `op` fail (after being journaled).
    pub fn fail_on(&self, op: Op) {
        self.journal.failing.lock().unwrap().insert(op.name());
    }
}

impl ConnectionEngine for RecordingEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_handle(&self) -> Result<Arc<dyn ConnectionHandle>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.journal.record(id, Op::Create)?;
        Ok(Arc::new(RecordingHandle {
            id,
            connection_name: self.name.clone(),
            journal: Arc::clone(&self.journal),
            depth: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }))
    }
}

pub struct RecordingHandle {
    id: u64,
    connection_name: String,
    journal: Arc<Journal>,
    depth: AtomicUsize,
    released: AtomicBool,
}

impl RecordingHandle {
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    fn close_frame(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }
}

#[async_trait]
impl ConnectionHandle for RecordingHandle {
    fn id(&self) -> u64 {
        self.id
    }

    fn connection_name(&self) -> &str {
        &self.connection_name
    }

    fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst) && self.depth() > 0
    }

    async fn connect(&self) -> Result<()> {
        self.journal.record(self.id, Op::Connect)
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<()> {
        self.journal.record(self.id, Op::Begin(isolation))?;
        self.depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.close_frame();
        self.journal.record(self.id, Op::Commit)
    }

    async fn rollback(&self) -> Result<()> {
        self.close_frame();
        self.journal.record(self.id, Op::Rollback)
    }

    async fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        self.journal.record(self.id, Op::Release)
    }

    fn executor(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Engine over a single recording connection named "default".
pub fn recording_engine() -> (Engine, Arc<RecordingEngine>) {
    let recorder = RecordingEngine::new("default");
    let config = TransactionConfig::new("default");
    let registry = config.registry().register(recorder.clone());
    let engine = Engine::new(config, registry).unwrap();
    (engine, recorder)
}

pub const RC: Op = Op::Begin(IsolationLevel::ReadCommitted);
