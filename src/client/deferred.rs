//! Deferred results
//!
//! A `Deferred` is the handle an `async_*` call returns. It resolves exactly
//! once; every later `wait()` hands back the cached result without touching
//! the transport. Two handles are equal when they track the same request.

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use super::dispatcher::result_of;
use super::operation::{FromOutcome, Outcome};
use super::registry::SharedSlot;
use super::Client;
use crate::error::Result;
use crate::protocol::RequestId;

/// Handle to an operation in flight
pub struct Deferred<'c, T = Outcome> {
    id: RequestId,
    slot: SharedSlot,
    client: &'c Client,
    _result: PhantomData<fn() -> T>,
}

impl<'c, T: FromOutcome> Deferred<'c, T> {
    pub(crate) fn new(id: RequestId, slot: SharedSlot, client: &'c Client) -> Self {
        Self {
            id,
            slot,
            client,
            _result: PhantomData,
        }
    }

    /// Request id of the tracked operation
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_resolved()
    }

    /// Block until resolved, using the client's default deadline
    pub fn wait(&self) -> Result<T> {
        self.wait_with(self.client.config().wait_timeout())
    }

    /// Block until resolved or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        self.wait_with(Some(timeout))
    }

    fn wait_with(&self, timeout: Option<Duration>) -> Result<T> {
        T::from_outcome(self.client.wait_for(self.id, &self.slot, timeout)?)
    }

    /// The result if already resolved; never performs I/O
    pub fn try_result(&self) -> Option<Result<T>> {
        if !self.is_resolved() {
            return None;
        }
        Some(result_of(&self.slot).and_then(T::from_outcome))
    }

    /// Forget the result type
    pub fn erase(self) -> Deferred<'c, Outcome> {
        Deferred::new(self.id, self.slot, self.client)
    }
}

impl<T> Clone for Deferred<'_, T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            slot: self.slot.clone(),
            client: self.client,
            _result: PhantomData,
        }
    }
}

impl<T, U> PartialEq<Deferred<'_, U>> for Deferred<'_, T> {
    fn eq(&self, other: &Deferred<'_, U>) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Deferred<'_, T> {}

impl<T> fmt::Debug for Deferred<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.id)
            .field("resolved", &self.slot.lock().is_resolved())
            .finish()
    }
}
