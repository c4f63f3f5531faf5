use crate::core::{IsolationLevel, Result, TxError};
use crate::interface::{ConnectionEngine, ConnectionHandle};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Table = BTreeMap<String, Value>;

/// Committed state shared by every handle of a [`MemoryEngine`].
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of `table`, ordered by key.
    pub fn rows(&self, table: &str) -> Result<Vec<(String, Value)>> {
        let tables = self.tables.read()?;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    /// Committed keys of `table`, ordered.
    pub fn keys(&self, table: &str) -> Result<Vec<String>> {
        let tables = self.tables.read()?;
        Ok(tables
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn snapshot(&self, table: &str) -> Result<Table> {
        let tables = self.tables.read()?;
        Ok(tables.get(table).cloned().unwrap_or_default())
    }

    fn apply(&self, writes: Vec<Write>) -> Result<()> {
        let mut tables = self.tables.write()?;
        for write in writes {
            write.apply_to(&mut tables);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Write {
    Put { table: String, key: String, value: Value },
    Delete { table: String, key: String },
}

impl Write {
    fn table(&self) -> &str {
        match self {
            Write::Put { table, .. } | Write::Delete { table, .. } => table,
        }
    }

    fn apply_to(self, tables: &mut HashMap<String, Table>) {
        match self {
            Write::Put { table, key, value } => {
                tables.entry(table).or_default().insert(key, value);
            }
            Write::Delete { table, key } => {
                if let Some(rows) = tables.get_mut(&table) {
                    rows.remove(&key);
                }
            }
        }
    }

    fn apply_to_table(&self, rows: &mut Table) {
        match self {
            Write::Put { key, value, .. } => {
                rows.insert(key.clone(), value.clone());
            }
            Write::Delete { key, .. } => {
                rows.remove(key);
            }
        }
    }
}

/// Call counters of a [`MemoryEngine`].
#[derive(Debug, Default)]
struct EngineCounters {
    handles_created: AtomicUsize,
    connects: AtomicUsize,
    begins: AtomicUsize,
    savepoints: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    releases: AtomicUsize,
}

impl EngineCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Snapshot of engine call counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub handles_created: usize,
    pub connects: usize,
    /// All `begin` calls, savepoints included.
    pub begins: usize,
    pub savepoints: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub releases: usize,
}

impl EngineStats {
    /// Handles created but not yet released.
    pub fn open_handles(&self) -> usize {
        self.handles_created.saturating_sub(self.releases)
    }
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Engine Stats: {} handles ({} open), {} connects, {} begins ({} savepoints), {} commits, {} rollbacks",
            self.handles_created,
            self.open_handles(),
            self.connects,
            self.begins,
            self.savepoints,
            self.commits,
            self.rollbacks
        )
    }
}

/// In-memory connection engine.
///
/// Stores keyed JSON documents per table. Handles buffer their writes in a
/// stack of frames (one per `begin`, the inner ones being savepoints) and apply
/// them to the shared [`MemoryDatabase`] when the outermost frame commits.
/// Writes issued outside any transaction are applied immediately.
pub struct MemoryEngine {
    name: String,
    db: Arc<MemoryDatabase>,
    next_id: AtomicU64,
    counters: Arc<EngineCounters>,
}

impl MemoryEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_database(name, Arc::new(MemoryDatabase::new()))
    }

    pub fn with_database(name: impl Into<String>, db: Arc<MemoryDatabase>) -> Self {
        Self {
            name: name.into(),
            db,
            next_id: AtomicU64::new(1),
            counters: Arc::new(EngineCounters::default()),
        }
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    pub fn stats(&self) -> EngineStats {
        let load = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);
        EngineStats {
            handles_created: load(&self.counters.handles_created),
            connects: load(&self.counters.connects),
            begins: load(&self.counters.begins),
            savepoints: load(&self.counters.savepoints),
            commits: load(&self.counters.commits),
            rollbacks: load(&self.counters.rollbacks),
            releases: load(&self.counters.releases),
        }
    }

    /// Create a handle with its concrete type.
    pub fn create_memory_handle(&self) -> Arc<MemoryHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        EngineCounters::bump(&self.counters.handles_created);

        Arc::new(MemoryHandle {
            id,
            connection_name: self.name.clone(),
            db: Arc::clone(&self.db),
            counters: Arc::clone(&self.counters),
            state: Mutex::new(HandleState::default()),
        })
    }
}

impl ConnectionEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_handle(&self) -> Result<Arc<dyn ConnectionHandle>> {
        Ok(self.create_memory_handle())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum HandlePhase {
    #[default]
    Created,
    Connected,
    Released,
}

#[derive(Debug)]
struct Frame {
    isolation: IsolationLevel,
    writes: Vec<Write>,
}

#[derive(Debug, Default)]
struct HandleState {
    phase: HandlePhase,
    frames: Vec<Frame>,
}

/// Handle produced by [`MemoryEngine`]; also its own query executor.
pub struct MemoryHandle {
    id: u64,
    connection_name: String,
    db: Arc<MemoryDatabase>,
    counters: Arc<EngineCounters>,
    state: Mutex<HandleState>,
}

impl MemoryHandle {
    fn released(&self) -> TxError {
        TxError::Connection(format!("Connection {} has been released", self.id))
    }

    fn no_transaction(&self) -> TxError {
        TxError::Connection(format!("No active transaction on connection {}", self.id))
    }

    /// Savepoint depth: 0 without a transaction, 1 for a plain transaction.
    pub fn depth(&self) -> usize {
        self.state.lock().map(|state| state.frames.len()).unwrap_or(0)
    }

    /// Isolation level of the outermost open transaction.
    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.frames.first().map(|frame| frame.isolation))
    }

    pub fn is_released(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.phase == HandlePhase::Released)
            .unwrap_or(true)
    }

    /// Rows of `table` as seen by this handle, own uncommitted writes included.
    fn view(&self, state: &HandleState, table: &str) -> Result<Table> {
        let mut rows = self.db.snapshot(table)?;
        for write in state.frames.iter().flat_map(|frame| frame.writes.iter()) {
            if write.table() == table {
                write.apply_to_table(&mut rows);
            }
        }
        Ok(rows)
    }

    /// Buffer the write in the innermost frame, or apply it when no transaction is open.
    fn write(&self, state: &mut HandleState, write: Write) -> Result<()> {
        match state.frames.last_mut() {
            Some(frame) => {
                frame.writes.push(write);
                Ok(())
            }
            None => self.db.apply(vec![write]),
        }
    }

    fn usable_state(&self) -> Result<std::sync::MutexGuard<'_, HandleState>> {
        let state = self.state.lock()?;
        if state.phase == HandlePhase::Released {
            return Err(self.released());
        }
        Ok(state)
    }

    /// Insert a new row; fails if `key` is already visible to this handle.
    pub fn insert(&self, table: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.usable_state()?;
        if self.view(&state, table)?.contains_key(key) {
            return Err(TxError::Constraint(format!(
                "Duplicate key '{}' in table '{}'",
                key, table
            )));
        }

        self.write(
            &mut state,
            Write::Put {
                table: table.to_string(),
                key: key.to_string(),
                value,
            },
        )
    }

    /// Insert or replace a row.
    pub fn upsert(&self, table: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.usable_state()?;
        self.write(
            &mut state,
            Write::Put {
                table: table.to_string(),
                key: key.to_string(),
                value,
            },
        )
    }

    /// Delete a row, returning whether it existed.
    pub fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let mut state = self.usable_state()?;
        if !self.view(&state, table)?.contains_key(key) {
            return Ok(false);
        }

        self.write(
            &mut state,
            Write::Delete {
                table: table.to_string(),
                key: key.to_string(),
            },
        )?;
        Ok(true)
    }

    pub fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let state = self.usable_state()?;
        Ok(self.view(&state, table)?.remove(key))
    }

    pub fn scan(&self, table: &str) -> Result<Vec<(String, Value)>> {
        let state = self.usable_state()?;
        Ok(self.view(&state, table)?.into_iter().collect())
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        let state = self.usable_state()?;
        Ok(self.view(&state, table)?.len())
    }
}

#[async_trait]
impl ConnectionHandle for MemoryHandle {
    fn id(&self) -> u64 {
        self.id
    }

    fn connection_name(&self) -> &str {
        &self.connection_name
    }

    fn is_active(&self) -> bool {
        self.depth() > 0
    }

    async fn connect(&self) -> Result<()> {
        let mut state = self.usable_state()?;
        state.phase = HandlePhase::Connected;
        EngineCounters::bump(&self.counters.connects);
        Ok(())
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<()> {
        let mut state = self.usable_state()?;
        if state.phase != HandlePhase::Connected {
            return Err(TxError::Connection(format!(
                "Connection {} is not connected",
                self.id
            )));
        }

        if !state.frames.is_empty() {
            EngineCounters::bump(&self.counters.savepoints);
        }
        state.frames.push(Frame {
            isolation,
            writes: Vec::new(),
        });
        EngineCounters::bump(&self.counters.begins);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.usable_state()?;
        let frame = state.frames.pop().ok_or_else(|| self.no_transaction())?;
        EngineCounters::bump(&self.counters.commits);

        match state.frames.last_mut() {
            // Releasing a savepoint hands its writes to the enclosing frame.
            Some(parent) => {
                parent.writes.extend(frame.writes);
                Ok(())
            }
            None => self.db.apply(frame.writes),
        }
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.usable_state()?;
        state.frames.pop().ok_or_else(|| self.no_transaction())?;
        EngineCounters::bump(&self.counters.rollbacks);
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        let mut state = self.usable_state()?;
        state.frames.clear();
        state.phase = HandlePhase::Released;
        EngineCounters::bump(&self.counters.releases);
        Ok(())
    }

    fn executor(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("id", &self.id)
            .field("connection_name", &self.connection_name)
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn begun(engine: &MemoryEngine) -> Arc<MemoryHandle> {
        let handle = engine.create_memory_handle();
        handle.connect().await.unwrap();
        handle.begin(IsolationLevel::ReadCommitted).await.unwrap();
        handle
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let engine = MemoryEngine::new("default");
        let handle = begun(&engine).await;

        handle.insert("users", "u1", json!({"name": "Alice"})).unwrap();
        assert!(engine.database().rows("users").unwrap().is_empty());
        assert_eq!(handle.count("users").unwrap(), 1);

        handle.commit().await.unwrap();
        assert_eq!(engine.database().keys("users").unwrap(), vec!["u1"]);
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let engine = MemoryEngine::new("default");
        let handle = begun(&engine).await;

        handle.insert("users", "u1", json!({})).unwrap();
        handle.rollback().await.unwrap();

        assert!(engine.database().rows("users").unwrap().is_empty());
        assert_eq!(engine.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_savepoint_rollback_keeps_outer_writes() {
        let engine = MemoryEngine::new("default");
        let handle = begun(&engine).await;
        handle.insert("users", "u1", json!({})).unwrap();

        handle.begin(IsolationLevel::ReadCommitted).await.unwrap();
        assert_eq!(handle.depth(), 2);
        handle.insert("users", "u2", json!({})).unwrap();
        handle.rollback().await.unwrap();

        assert!(handle.is_active());
        handle.commit().await.unwrap();

        assert_eq!(engine.database().keys("users").unwrap(), vec!["u1"]);
        assert_eq!(engine.stats().savepoints, 1);
    }

    #[tokio::test]
    async fn test_savepoint_commit_merges_into_outer() {
        let engine = MemoryEngine::new("default");
        let handle = begun(&engine).await;

        handle.begin(IsolationLevel::ReadCommitted).await.unwrap();
        handle.insert("users", "u2", json!({})).unwrap();
        handle.commit().await.unwrap();
        assert!(engine.database().rows("users").unwrap().is_empty());

        handle.rollback().await.unwrap();
        assert!(engine.database().rows("users").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_autocommit_without_transaction() {
        let engine = MemoryEngine::new("default");
        let handle = engine.create_memory_handle();

        handle.upsert("users", "u1", json!({"v": 1})).unwrap();
        assert_eq!(engine.database().keys("users").unwrap(), vec!["u1"]);
        assert!(handle.delete("users", "u1").unwrap());
        assert!(!handle.delete("users", "u1").unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let engine = MemoryEngine::new("default");
        let handle = begun(&engine).await;

        handle.insert("users", "u1", json!({})).unwrap();
        let err = handle.insert("users", "u1", json!({})).unwrap_err();
        assert!(matches!(err, TxError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_begin_requires_connect() {
        let engine = MemoryEngine::new("default");
        let handle = engine.create_memory_handle();

        assert!(handle.begin(IsolationLevel::Serializable).await.is_err());
    }

    #[tokio::test]
    async fn test_released_handle_is_unusable() {
        let engine = MemoryEngine::new("default");
        let handle = begun(&engine).await;
        handle.insert("users", "u1", json!({})).unwrap();

        handle.release().await.unwrap();

        assert!(handle.is_released());
        assert!(!handle.is_active());
        assert!(handle.get("users", "u1").is_err());
        assert!(handle.release().await.is_err());
        assert!(engine.database().rows("users").unwrap().is_empty());
        assert_eq!(engine.stats().open_handles(), 0);
    }

    #[tokio::test]
    async fn test_commit_without_transaction() {
        let engine = MemoryEngine::new("default");
        let handle = engine.create_memory_handle();
        handle.connect().await.unwrap();

        assert!(handle.commit().await.is_err());
        assert!(handle.rollback().await.is_err());
    }

    #[tokio::test]
    async fn test_isolation_recorded() {
        let engine = MemoryEngine::new("default");
        let handle = engine.create_memory_handle();
        handle.connect().await.unwrap();
        handle.begin(IsolationLevel::Serializable).await.unwrap();

        assert_eq!(handle.isolation(), Some(IsolationLevel::Serializable));
    }
}
