//! Operation Registry
//!
//! Maps every outstanding `RequestId` to its `Operation` and to whoever is
//! waiting on it. Single-shot operations are waited on through a shared
//! result slot; searches through a shared row buffer.
//!
//! ```text
//!   RequestId ──► Entry { op, waiter }
//!                            │
//!               ┌────────────┼─────────────┐
//!               ▼            ▼             ▼
//!          Future(slot)  Search(rows)   Detached
//!                                     (iterator dropped,
//!                                      rows discarded)
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::operation::{OpStatus, Operation, Outcome};
use crate::error::{Result, SpaceError};
use crate::protocol::RequestId;
use crate::value::Attributes;

// =============================================================================
// Shared State
// =============================================================================

/// Result slot shared between the registry and a `Deferred`
#[derive(Debug, Default)]
pub(crate) enum Slot {
    #[default]
    Pending,
    Resolved(Result<Outcome>),
}

impl Slot {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Slot::Resolved(_))
    }

    /// Store the result; a slot resolves at most once
    pub fn resolve(&mut self, result: Result<Outcome>) -> bool {
        if self.is_resolved() {
            tracing::error!("Ignoring second resolution of a completed operation");
            return false;
        }
        *self = Slot::Resolved(result);
        true
    }

    pub fn result(&self) -> Option<Result<Outcome>> {
        match self {
            Slot::Pending => None,
            Slot::Resolved(r) => Some(r.clone()),
        }
    }
}

pub(crate) type SharedSlot = Arc<Mutex<Slot>>;

/// Row buffer shared between the registry and a `SearchIterator`
#[derive(Debug, Default)]
pub(crate) struct SearchState {
    pub rows: VecDeque<Attributes>,
    pub done: bool,
    pub error: Option<SpaceError>,
}

impl SearchState {
    /// True once a caller has something to consume
    pub fn ready(&self) -> bool {
        !self.rows.is_empty() || self.done || self.error.is_some()
    }

    pub fn fail(&mut self, error: SpaceError) {
        if self.done {
            return;
        }
        self.error = Some(error);
        self.done = true;
    }
}

pub(crate) type SharedSearch = Arc<Mutex<SearchState>>;

/// Who consumes an operation's responses
#[derive(Debug)]
pub(crate) enum Waiter {
    Future(SharedSlot),
    Search(SharedSearch),
    /// Search whose iterator was dropped
    Detached,
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub op: Operation,
    pub waiter: Waiter,
}

impl Entry {
    /// Fail this entry's waiter; returns the slot if a future was resolved
    pub fn fail(mut self, error: SpaceError) -> Option<SharedSlot> {
        self.op.set_status(OpStatus::Failed);
        match self.waiter {
            Waiter::Future(slot) => {
                let resolved = slot.lock().resolve(Err(error));
                resolved.then_some(slot)
            }
            Waiter::Search(state) => {
                state.lock().fail(error);
                None
            }
            Waiter::Detached => None,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Outstanding operations keyed by request id
#[derive(Debug, Default)]
pub struct OperationRegistry {
    entries: HashMap<RequestId, Entry>,
    futures: usize,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new operation
    pub(crate) fn insert(&mut self, op: Operation, waiter: Waiter) -> Result<()> {
        let id = op.id();
        if self.entries.contains_key(&id) {
            return Err(SpaceError::Protocol(format!(
                "Transport reused outstanding request id {}",
                id
            )));
        }
        if matches!(waiter, Waiter::Future(_)) {
            self.futures += 1;
        }
        self.entries.insert(id, Entry { op, waiter });
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, id: RequestId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// Stop tracking an operation
    pub(crate) fn remove(&mut self, id: RequestId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        if matches!(entry.waiter, Waiter::Future(_)) {
            self.futures -= 1;
        }
        Some(entry)
    }

    /// Keep draining a search but throw its rows away
    pub(crate) fn detach(&mut self, id: RequestId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if matches!(entry.waiter, Waiter::Search(_)) {
                tracing::trace!("Detaching search {}", id);
                entry.waiter = Waiter::Detached;
            }
        }
    }

    /// Remove every entry
    pub(crate) fn drain(&mut self) -> Vec<(RequestId, Entry)> {
        self.futures = 0;
        self.entries.drain().collect()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Status of an outstanding operation
    pub fn status(&self, id: RequestId) -> Option<OpStatus> {
        self.entries.get(&id).map(|e| e.op.status())
    }

    /// Number of outstanding operations, searches included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outstanding single-shot operations
    pub fn outstanding_futures(&self) -> usize {
        self.futures
    }
}
