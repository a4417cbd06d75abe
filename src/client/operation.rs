//! Operation records
//!
//! One `Operation` per request in flight, plus the conversion from a final
//! response into the value a caller waits for.

use crate::error::{Result, SpaceError};
use crate::protocol::{Body, RequestId, RequestKind, Request, Response, Status};
use crate::value::{Attributes, Value};

/// Lifecycle of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// Sent, no final response yet
    Pending,

    /// Final response received (or search stream finished)
    Complete,

    /// Ended with an error
    Failed,
}

/// Result of a completed single-shot operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Writes: `false` when a condition failed or the record was missing
    Done(bool),

    /// Reads: `None` when the record does not exist
    Object(Option<Attributes>),

    /// Count
    Count(u64),
}

/// Types a `Deferred` can resolve to
pub trait FromOutcome: Sized {
    fn from_outcome(outcome: Outcome) -> Result<Self>;
}

impl FromOutcome for Outcome {
    fn from_outcome(outcome: Outcome) -> Result<Self> {
        Ok(outcome)
    }
}

impl FromOutcome for bool {
    fn from_outcome(outcome: Outcome) -> Result<Self> {
        match outcome {
            Outcome::Done(b) => Ok(b),
            other => Err(mismatch("a write result", &other)),
        }
    }
}

impl FromOutcome for Option<Attributes> {
    fn from_outcome(outcome: Outcome) -> Result<Self> {
        match outcome {
            Outcome::Object(obj) => Ok(obj),
            other => Err(mismatch("a record", &other)),
        }
    }
}

impl FromOutcome for u64 {
    fn from_outcome(outcome: Outcome) -> Result<Self> {
        match outcome {
            Outcome::Count(n) => Ok(n),
            other => Err(mismatch("a count", &other)),
        }
    }
}

fn mismatch(wanted: &str, got: &Outcome) -> SpaceError {
    SpaceError::Protocol(format!("Expected {}, got {:?}", wanted, got))
}

/// A request in flight
#[derive(Debug, Clone)]
pub struct Operation {
    id: RequestId,
    kind: RequestKind,
    space: String,
    key: Option<Value>,
    status: OpStatus,
}

impl Operation {
    pub(crate) fn new(id: RequestId, request: &Request) -> Self {
        Self {
            id,
            kind: request.kind(),
            space: request.space().to_string(),
            key: request.key().cloned(),
            status: OpStatus::Pending,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn status(&self) -> OpStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: OpStatus) {
        self.status = status;
    }

    /// Interpret the final response and settle the status
    pub(crate) fn complete(&mut self, response: Response) -> Result<Outcome> {
        let result = interpret(self.kind, response);
        self.status = match result {
            Ok(_) => OpStatus::Complete,
            Err(_) => OpStatus::Failed,
        };
        result
    }
}

fn interpret(kind: RequestKind, response: Response) -> Result<Outcome> {
    let Response {
        status,
        body,
        message,
    } = response;

    if status.is_error() {
        return Err(SpaceError::server(status, message.unwrap_or_default()));
    }

    let unexpected = || {
        SpaceError::Protocol(format!("Unexpected {:?} response to {:?}", status, kind))
    };

    match kind {
        RequestKind::Get | RequestKind::GetPartial => match (status, body) {
            (Status::Success, Body::Object(attrs)) => Ok(Outcome::Object(Some(attrs))),
            (Status::NotFound, _) => Ok(Outcome::Object(None)),
            _ => Err(unexpected()),
        },
        RequestKind::Count => match (status, body) {
            (Status::Success, Body::Count(n)) => Ok(Outcome::Count(n)),
            _ => Err(unexpected()),
        },
        RequestKind::Put
        | RequestKind::PutIfNotExist
        | RequestKind::CondPut
        | RequestKind::Delete
        | RequestKind::Atomic
        | RequestKind::GroupDel => match status {
            Status::Success => Ok(Outcome::Done(true)),
            Status::CmpFail | Status::NotFound => Ok(Outcome::Done(false)),
            _ => Err(unexpected()),
        },
        RequestKind::Search | RequestKind::SortedSearch => Err(unexpected()),
    }
}
