//! Event Loop
//!
//! Owns the transport and the registry and turns polled responses into
//! resolved futures and buffered search rows.
//!
//! ```text
//!   submit ──► Transport::send ──► registry.insert
//!
//!   drive_once ──► Transport::poll ──► for each (id, response):
//!                                        unknown id  → warn, drop
//!                                        single-shot → resolve slot, queue as ready
//!                                        search row  → buffer (or discard if detached)
//!                                        search done → mark iterator finished
//! ```
//!
//! A failed poll leaves the connection unusable: every outstanding
//! operation is failed with that error before it is returned.

use std::collections::VecDeque;
use std::time::Instant;

use super::operation::{OpStatus, Operation, Outcome};
use super::registry::{OperationRegistry, SharedSearch, SharedSlot, Waiter};
use crate::error::{Result, SpaceError};
use crate::protocol::{Body, Request, RequestId, Response, Status};
use crate::schema::Schema;
use crate::transport::{PollMode, Transport};

/// Transport plus bookkeeping for everything in flight
pub(crate) struct Dispatcher {
    transport: Box<dyn Transport>,
    registry: OperationRegistry,
    /// Futures resolved but not yet returned by `loop_once` or waited on
    ready: VecDeque<(RequestId, SharedSlot)>,
}

impl Dispatcher {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            registry: OperationRegistry::new(),
            ready: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn describe_space(&mut self, space: &str) -> Result<Option<Schema>> {
        self.transport.describe_space(space)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Send a single-shot request
    pub fn submit(&mut self, request: Request) -> Result<(RequestId, SharedSlot)> {
        let slot = SharedSlot::default();
        let id = self.send(&request, Waiter::Future(slot.clone()))?;
        Ok((id, slot))
    }

    /// Send a streaming request
    pub fn submit_search(&mut self, request: Request) -> Result<(RequestId, SharedSearch)> {
        let state = SharedSearch::default();
        let id = self.send(&request, Waiter::Search(state.clone()))?;
        Ok((id, state))
    }

    fn send(&mut self, request: &Request, waiter: Waiter) -> Result<RequestId> {
        let id = match self.transport.send(request) {
            Ok(id) => id,
            Err(e) => {
                if e.is_transport() {
                    self.fail_all(&e);
                }
                return Err(e);
            }
        };
        tracing::debug!("Submitted {} {:?} on '{}'", id, request.kind(), request.space());
        self.registry.insert(Operation::new(id, request), waiter)?;
        Ok(id)
    }

    /// Stop buffering rows for a search nobody will read
    pub fn detach(&mut self, id: RequestId) {
        self.registry.detach(id);
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Poll once and route every response; returns how many futures resolved
    pub fn drive_once(&mut self, mode: PollMode) -> Result<usize> {
        let batch = match self.transport.poll(mode) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Poll failed, failing {} operation(s): {}", self.registry.len(), e);
                self.fail_all(&e);
                return Err(e);
            }
        };

        let mut resolved = 0;
        for (id, response) in batch {
            if self.deliver(id, response) {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Drive until `done` holds; `Timeout` once the deadline passes
    pub fn drive_until(
        &mut self,
        deadline: Option<Instant>,
        done: impl Fn(&Self) -> bool,
    ) -> Result<()> {
        loop {
            if done(self) {
                return Ok(());
            }
            let mode = match deadline {
                None => PollMode::Block,
                Some(d) if Instant::now() >= d => return Err(SpaceError::Timeout),
                Some(d) => PollMode::Until(d),
            };
            self.drive_once(mode)?;
        }
    }

    /// Route one response to its waiter
    fn deliver(&mut self, id: RequestId, response: Response) -> bool {
        let Some(entry) = self.registry.get_mut(id) else {
            tracing::warn!("Dropping {:?} response for unknown request {}", response.status, id);
            return false;
        };

        if !entry.op.kind().is_stream() {
            let Some(mut entry) = self.registry.remove(id) else {
                return false;
            };
            let result = entry.op.complete(response);
            if let Waiter::Future(slot) = entry.waiter {
                if slot.lock().resolve(result) {
                    self.ready.push_back((id, slot));
                    return true;
                }
            }
            return false;
        }

        match (response.status, response.body) {
            (Status::Success, Body::Object(row)) => {
                if let Waiter::Search(state) = &entry.waiter {
                    state.lock().rows.push_back(row);
                }
            }
            (Status::SearchDone, _) => {
                if let Some(mut entry) = self.registry.remove(id) {
                    entry.op.set_status(OpStatus::Complete);
                    if let Waiter::Search(state) = &entry.waiter {
                        state.lock().done = true;
                    }
                    tracing::debug!("Search {} finished", id);
                }
            }
            (status, _) => {
                let error = if status.is_error() {
                    SpaceError::server(status, response.message.unwrap_or_default())
                } else {
                    SpaceError::Protocol(format!("Unexpected {:?} in search stream", status))
                };
                if let Some(entry) = self.registry.remove(id) {
                    entry.fail(error);
                }
            }
        }
        false
    }

    /// Fail every outstanding operation with `error`
    pub fn fail_all(&mut self, error: &SpaceError) {
        for (id, entry) in self.registry.drain() {
            if let Some(slot) = entry.fail(error.clone()) {
                self.ready.push_back((id, slot));
            }
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Next completed future, in completion order
    pub fn loop_once(&mut self, deadline: Option<Instant>) -> Result<(RequestId, SharedSlot)> {
        if let Some(ready) = self.ready.pop_front() {
            return Ok(ready);
        }
        if self.registry.outstanding_futures() == 0 {
            return Err(SpaceError::NonePending);
        }

        match self.drive_until(deadline, |d| !d.ready.is_empty()) {
            Ok(()) => {}
            // Transport failures resolve every future; hand those out first
            Err(e) if self.ready.is_empty() => return Err(e),
            Err(_) => {}
        }
        self.ready
            .pop_front()
            .ok_or_else(|| SpaceError::Protocol("Ready queue emptied while driving".to_string()))
    }

    /// Block until the future `id` resolves and return its result
    pub fn wait(
        &mut self,
        id: RequestId,
        slot: &SharedSlot,
        deadline: Option<Instant>,
    ) -> Result<Outcome> {
        if !slot.lock().is_resolved() && !self.registry.contains(id) {
            return Err(SpaceError::Protocol(format!("Request {} is not outstanding", id)));
        }

        if let Err(e) = self.drive_until(deadline, |_| slot.lock().is_resolved()) {
            match e {
                SpaceError::Timeout => {
                    if let Some(entry) = self.registry.remove(id) {
                        tracing::debug!("Request {} timed out", id);
                        entry.fail(SpaceError::Timeout);
                    }
                }
                // fail_all has resolved the slot with this error
                _ if slot.lock().is_resolved() => {}
                _ => return Err(e),
            }
        }

        self.consume(id);
        result_of(slot)
    }

    /// Forget a resolved future so `loop_once` never reports it
    pub fn consume(&mut self, id: RequestId) {
        self.ready.retain(|(ready, _)| *ready != id);
    }

    /// Drive until a search has rows, finished, or failed
    pub fn pump_search(
        &mut self,
        id: RequestId,
        state: &SharedSearch,
        deadline: Option<Instant>,
    ) -> Result<()> {
        if !state.lock().ready() && !self.registry.contains(id) {
            state
                .lock()
                .fail(SpaceError::Protocol(format!("Search {} is not outstanding", id)));
            return Ok(());
        }

        match self.drive_until(deadline, |_| state.lock().ready()) {
            Ok(()) => Ok(()),
            Err(SpaceError::Timeout) => {
                if let Some(entry) = self.registry.remove(id) {
                    tracing::debug!("Search {} timed out", id);
                    entry.fail(SpaceError::Timeout);
                }
                Ok(())
            }
            Err(_) if state.lock().error.is_some() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Read a slot that must already be resolved
pub(crate) fn result_of(slot: &SharedSlot) -> Result<Outcome> {
    slot.lock()
        .result()
        .unwrap_or_else(|| Err(SpaceError::Protocol("Operation still pending".to_string())))
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("outstanding", &self.registry.len())
            .field("ready", &self.ready.len())
            .finish()
    }
}
