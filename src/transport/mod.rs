//! Transport Module
//!
//! The seam between the client core and whatever carries requests to a
//! store. A transport assigns each sent request a `RequestId` and later
//! hands back `(RequestId, Response)` pairs in any order.
//!
//! ## Implementations
//! - `TcpTransport`: framed requests over one TCP connection
//! - `MemoryTransport`: in-process loopback over a shared `MemoryStore`

use std::time::Instant;

use crate::error::Result;
use crate::protocol::{Request, RequestId, Response};
use crate::schema::Schema;

mod memory;
mod tcp;

pub use memory::{MemoryHandle, MemoryTransport, SharedStore};
pub use tcp::TcpTransport;

/// How long `Transport::poll` may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Block until at least one response arrives
    Block,

    /// Return immediately with whatever is already available
    NoWait,

    /// Block until a response arrives or the deadline passes
    Until(Instant),
}

/// Carries requests out and responses back
pub trait Transport: Send {
    /// Send one request and return the id its responses will carry
    fn send(&mut self, request: &Request) -> Result<RequestId>;

    /// Collect available responses
    ///
    /// An empty batch is valid for `NoWait` and for an expired deadline.
    /// An error means the connection is unusable.
    fn poll(&mut self, mode: PollMode) -> Result<Vec<(RequestId, Response)>>;

    /// Look up a space the client has no schema for
    fn describe_space(&mut self, _space: &str) -> Result<Option<Schema>> {
        Ok(None)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, request: &Request) -> Result<RequestId> {
        (**self).send(request)
    }

    fn poll(&mut self, mode: PollMode) -> Result<Vec<(RequestId, Response)>> {
        (**self).poll(mode)
    }

    fn describe_space(&mut self, space: &str) -> Result<Option<Schema>> {
        (**self).describe_space(space)
    }
}
