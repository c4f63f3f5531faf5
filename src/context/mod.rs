// ============================================================================
// Execution Context
// ============================================================================
//
// Ambient, call-tree-scoped state consulted by every propagation decision:
// the context id, the handle of the enclosing scope (if any) and the kind of
// the immediately enclosing scope.
//
// ============================================================================

pub mod carrier;

pub use carrier::{current, enter, run_with};

use crate::core::Propagation;
use crate::interface::ConnectionHandle;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Kind of the immediately enclosing scope.
///
/// Only one level is ever recorded: a child scope replaces the flag
/// wholesale and never inherits its grandparent's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParentFlag(Option<Propagation>);

impl ParentFlag {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn of(kind: Propagation) -> Self {
        Self(Some(kind))
    }

    pub fn contains(&self, kind: Propagation) -> bool {
        self.0 == Some(kind)
    }

    pub fn kind(&self) -> Option<Propagation> {
        self.0
    }
}

#[derive(Clone)]
pub struct ExecutionContext {
    id: String,
    active_handle: Option<Arc<dyn ConnectionHandle>>,
    parent_flag: ParentFlag,
    created_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Fresh context for a new entrypoint (request, job, ...).
    pub fn root() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active_handle: None,
            parent_flag: ParentFlag::empty(),
            created_at: Utc::now(),
        }
    }

    /// Context for a new scope of `kind` opened inside this one.
    pub fn child(&self, handle: Arc<dyn ConnectionHandle>, kind: Propagation) -> Self {
        Self {
            id: self.id.clone(),
            active_handle: Some(handle),
            parent_flag: ParentFlag::of(kind),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_handle(&self) -> Option<&Arc<dyn ConnectionHandle>> {
        self.active_handle.as_ref()
    }

    pub fn parent_flag(&self) -> ParentFlag {
        self.parent_flag
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A handle is present and has an open transaction.
    pub fn has_active_transaction(&self) -> bool {
        self.active_handle.as_ref().is_some_and(|handle| handle.is_active())
    }

    /// The enclosing scope was started with REQUIRES_NEW.
    pub fn is_fresh_start(&self) -> bool {
        self.parent_flag.contains(Propagation::RequiresNew)
    }

    /// REQUIRED, NESTED and SUPPORTS may join the enclosing transaction.
    pub fn is_joinable(&self) -> bool {
        self.has_active_transaction() && !self.is_fresh_start()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("active_handle", &self.active_handle.as_ref().map(|h| h.id()))
            .field("parent_flag", &self.parent_flag)
            .field("created_at", &self.created_at)
            .finish()
    }
}
