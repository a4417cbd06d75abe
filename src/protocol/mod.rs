//! Protocol Module
//!
//! The logical request/response contract between the client core and a
//! transport, plus the frame codec used by the TCP transport.
//!
//! ## Requests
//! - GET / GET_PARTIAL        - Payload: space, key [, fields]
//! - PUT / PUT_IF_NOT_EXIST   - Payload: space, key, attributes
//! - COND_PUT                 - Payload: space, key, conditions, attributes
//! - DELETE                   - Payload: space, key
//! - ATOMIC                   - Payload: space, key, op, operands
//! - SEARCH / SORTED_SEARCH   - Payload: space, filter [, sort]
//! - COUNT / GROUP_DEL        - Payload: space, filter
//!
//! ### Status Codes
//! - 0x00: SUCCESS
//! - 0x01: NOT_FOUND
//! - 0x02: SEARCH_DONE
//! - 0x03: CMPFAIL
//! - 0x40..: errors

use std::fmt;

use serde::{Deserialize, Serialize};

mod request;
mod response;
mod codec;

pub use request::{AtomicOp, Request, RequestKind};
pub use response::{Body, Response, Status};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, FrameKind, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};

/// Identifier a transport assigns to each sent request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
