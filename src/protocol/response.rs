//! Response definitions
//!
//! Represents replies from a store. A search is answered by one `Success`
//! row per matching record followed by a single `SearchDone`.

use serde::{Deserialize, Serialize};

use crate::value::Attributes;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    NotFound = 0x01,
    SearchDone = 0x02,
    CmpFail = 0x03,

    // Error conditions
    UnknownSpace = 0x40,
    UnknownAttribute = 0x41,
    WrongType = 0x42,
    Overflow = 0x43,
    BadRequest = 0x44,
    ServerError = 0x45,
}

impl Status {
    /// Failure codes that surface as `SpaceError::Server`
    pub fn is_error(self) -> bool {
        (self as u8) >= 0x40
    }
}

/// Response payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Body {
    #[default]
    Empty,

    /// A record (get, get_partial) or one search row
    Object(Attributes),

    /// Result of count
    Count(u64),
}

/// A response to one request (or one row of a search)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Payload, if the status carries one
    pub body: Body,

    /// Error description for failure statuses
    pub message: Option<String>,
}

impl Response {
    /// Create a SUCCESS response with no payload
    pub fn ok() -> Self {
        Self::with_status(Status::Success)
    }

    /// Create a SUCCESS response carrying a record
    pub fn object(attrs: Attributes) -> Self {
        Self {
            status: Status::Success,
            body: Body::Object(attrs),
            message: None,
        }
    }

    /// Create a SUCCESS response carrying a count
    pub fn count(n: u64) -> Self {
        Self {
            status: Status::Success,
            body: Body::Count(n),
            message: None,
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self::with_status(Status::NotFound)
    }

    /// Create a CMPFAIL response
    pub fn cmp_fail() -> Self {
        Self::with_status(Status::CmpFail)
    }

    /// Create the end-of-stream marker for a search
    pub fn search_done() -> Self {
        Self::with_status(Status::SearchDone)
    }

    /// Create an error response
    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            body: Body::Empty,
            message: Some(message.into()),
        }
    }

    fn with_status(status: Status) -> Self {
        Self {
            status,
            body: Body::Empty,
            message: None,
        }
    }
}
