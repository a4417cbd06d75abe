//! Search iteration
//!
//! A search is answered by a stream of rows. The iterator buffers whatever
//! the event loop has routed to it and drives the loop only when the buffer
//! is empty. Once the end-of-stream marker (or an error) has been consumed
//! the iterator is exhausted for good.

use std::fmt;
use std::time::{Duration, Instant};

use super::registry::SharedSearch;
use super::Client;
use crate::error::Result;
use crate::protocol::RequestId;
use crate::value::Attributes;

/// Lazy, single-pass sequence of search results
pub struct SearchIterator<'c> {
    id: RequestId,
    state: SharedSearch,
    client: &'c Client,
    timeout: Option<Duration>,
    exhausted: bool,
}

impl<'c> SearchIterator<'c> {
    pub(crate) fn new(id: RequestId, state: SharedSearch, client: &'c Client) -> Self {
        Self {
            id,
            state,
            client,
            timeout: client.config().wait_timeout(),
            exhausted: false,
        }
    }

    /// Request id of the underlying search
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Bound each refill of the buffer by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// True if another record is available, driving the loop if needed
    ///
    /// A failed search reports its error once; afterwards the iterator is
    /// exhausted.
    pub fn has_next(&mut self) -> Result<bool> {
        while !self.exhausted {
            {
                let mut state = self.state.lock();
                if !state.rows.is_empty() {
                    return Ok(true);
                }
                if let Some(error) = state.error.take() {
                    self.exhausted = true;
                    return Err(error);
                }
                if state.done {
                    self.exhausted = true;
                    break;
                }
            }

            let deadline = self.timeout.map(|t| Instant::now() + t);
            if let Err(e) = self.client.pump_search(self.id, &self.state, deadline) {
                self.exhausted = true;
                return Err(e);
            }
        }
        Ok(false)
    }

    /// Next record, or `None` once the search is finished
    pub fn next_record(&mut self) -> Result<Option<Attributes>> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.state.lock().rows.pop_front())
    }

    /// Drain the remaining records
    pub fn collect_all(mut self) -> Result<Vec<Attributes>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

impl Iterator for SearchIterator<'_> {
    type Item = Result<Attributes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl Drop for SearchIterator<'_> {
    fn drop(&mut self) {
        if !self.exhausted && !self.state.lock().done {
            self.client.detach_search(self.id);
        }
    }
}

impl fmt::Debug for SearchIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIterator")
            .field("id", &self.id)
            .field("buffered", &self.state.lock().rows.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
