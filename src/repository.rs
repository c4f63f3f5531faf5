//! Data access bound to the ambient transaction.
//!
//! A [`DataAccessHandle`] never stores a connection: every access resolves the
//! executor of the handle active in the caller's execution context, so the
//! same repository value joins whatever scope it is called from.

use crate::connection::MemoryHandle;
use crate::context;
use crate::core::{Result, TxError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Resolves the query executor of type `E` for the current call tree.
pub struct DataAccessHandle<E> {
    fixed: Option<Arc<E>>,
}

impl<E> DataAccessHandle<E>
where
    E: Any + Send + Sync,
{
    /// Follow the ambient handle of whichever scope the caller runs in.
    pub fn ambient() -> Self {
        Self { fixed: None }
    }

    /// Always use `executor`, ignoring the ambient context.
    pub fn fixed(executor: Arc<E>) -> Self {
        Self {
            fixed: Some(executor),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.is_some()
    }

    pub fn executor(&self) -> Result<Arc<E>> {
        if let Some(executor) = &self.fixed {
            return Ok(Arc::clone(executor));
        }

        let ctx = context::current().ok_or_else(|| {
            TxError::NoActiveConnection("no execution context for this call tree".to_string())
        })?;
        let handle = ctx.active_handle().ok_or_else(|| {
            TxError::NoActiveConnection(format!(
                "context {} is not inside a transactional method",
                ctx.id()
            ))
        })?;

        let connection = handle.connection_name().to_string();
        Arc::clone(handle).executor().downcast::<E>().map_err(|_| {
            TxError::Connection(format!(
                "connection '{}' does not provide a {} executor",
                connection,
                type_name::<E>()
            ))
        })
    }
}

impl<E> Clone for DataAccessHandle<E> {
    fn clone(&self) -> Self {
        Self {
            fixed: self.fixed.clone(),
        }
    }
}

impl<E> Default for DataAccessHandle<E>
where
    E: Any + Send + Sync,
{
    fn default() -> Self {
        Self::ambient()
    }
}

impl<E> fmt::Debug for DataAccessHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataAccessHandle")
            .field("executor", &type_name::<E>())
            .field("fixed", &self.fixed.is_some())
            .finish()
    }
}

/// Keyed JSON documents of one table, read and written through the ambient handle.
#[derive(Debug, Clone)]
pub struct TableRepository {
    table: String,
    access: DataAccessHandle<MemoryHandle>,
}

impl TableRepository {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            access: DataAccessHandle::ambient(),
        }
    }

    /// Repository pinned to `handle` instead of the ambient one.
    pub fn with_executor(table: impl Into<String>, handle: Arc<MemoryHandle>) -> Self {
        Self {
            table: table.into(),
            access: DataAccessHandle::fixed(handle),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert a new document; fails with `Constraint` if `key` exists.
    pub fn insert<T: Serialize>(&self, key: &str, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)?;
        self.access.executor()?.insert(&self.table, key, value)
    }

    pub fn save<T: Serialize>(&self, key: &str, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)?;
        self.access.executor()?.upsert(&self.table, key, value)
    }

    pub fn find<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.access.executor()?.get(&self.table, key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// All documents, ordered by key.
    pub fn find_all<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>> {
        self.access
            .executor()?
            .scan(&self.table)?
            .into_iter()
            .map(|(key, value)| Ok((key, serde_json::from_value(value)?)))
            .collect()
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.access.executor()?.delete(&self.table, key)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.executor()?.count(&self.table)
    }
}
