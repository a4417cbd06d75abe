//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │ CRC (4)  │         Payload             │
//! └──────────┴──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! - Kind: 0x01 request, 0x02 response
//! - Len: payload length, big endian
//! - CRC: CRC32 of the payload, big endian
//! - Payload: bincode of `(RequestId, Request)` or `(RequestId, Response)`
//!
//! Responses may arrive in any order; the id ties each back to its request.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Request, RequestId, Response};
use crate::error::{Result, SpaceError};

/// Header size: 1 byte kind + 4 bytes length + 4 bytes checksum
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0x01,
    Response = 0x02,
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

fn encode_frame<T: Serialize>(kind: FrameKind, id: RequestId, body: &T) -> Result<Bytes> {
    let payload = bincode::serialize(&(id, body))?;
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(SpaceError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u8(kind as u8);
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.put_slice(&payload);

    Ok(frame.freeze())
}

/// Pull one frame of `kind` off the front of `buf`
///
/// Returns `Ok(None)` and leaves `buf` untouched when the frame is incomplete.
fn decode_frame<T: DeserializeOwned>(
    buf: &mut BytesMut,
    kind: FrameKind,
    max_payload: u32,
) -> Result<Option<(RequestId, T)>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    // Parse header without consuming
    let frame_kind = buf[0];
    let payload_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    let checksum = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);

    if frame_kind != kind as u8 {
        return Err(SpaceError::Protocol(format!(
            "Unexpected frame kind: 0x{:02x} (wanted 0x{:02x})",
            frame_kind, kind as u8
        )));
    }

    // Validate payload length
    if payload_len > max_payload {
        return Err(SpaceError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, max_payload
        )));
    }

    let total_len = HEADER_SIZE + payload_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(HEADER_SIZE);
    let payload = buf.split_to(payload_len as usize);

    if crc32fast::hash(&payload) != checksum {
        return Err(SpaceError::Protocol(format!(
            "Checksum mismatch on {}-byte frame",
            payload_len
        )));
    }

    let decoded = bincode::deserialize::<(RequestId, T)>(&payload)?;
    Ok(Some(decoded))
}

/// Encode a request frame
pub fn encode_request(id: RequestId, request: &Request) -> Result<Bytes> {
    encode_frame(FrameKind::Request, id, request)
}

/// Decode a request frame from the front of `buf`
pub fn decode_request(buf: &mut BytesMut, max_payload: u32) -> Result<Option<(RequestId, Request)>> {
    decode_frame(buf, FrameKind::Request, max_payload)
}

/// Encode a response frame
pub fn encode_response(id: RequestId, response: &Response) -> Result<Bytes> {
    encode_frame(FrameKind::Response, id, response)
}

/// Decode a response frame from the front of `buf`
pub fn decode_response(buf: &mut BytesMut, max_payload: u32) -> Result<Option<(RequestId, Response)>> {
    decode_frame(buf, FrameKind::Response, max_payload)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read exactly one frame from a blocking stream
fn read_frame<R: Read, T: DeserializeOwned>(
    reader: &mut R,
    kind: FrameKind,
    max_payload: u32,
) -> Result<(RequestId, T)> {
    // Read header first
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if payload_len > max_payload {
        return Err(SpaceError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, max_payload
        )));
    }

    // Read payload
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload_len as usize);
    frame.put_slice(&header);
    frame.resize(HEADER_SIZE + payload_len as usize, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..])?;

    decode_frame(&mut frame, kind, max_payload)?
        .ok_or_else(|| SpaceError::Protocol("Incomplete frame after full read".to_string()))
}

/// Read a complete request from a stream
///
/// Blocks until a complete request is received or an error occurs
pub fn read_request<R: Read>(reader: &mut R) -> Result<(RequestId, Request)> {
    read_frame(reader, FrameKind::Request, MAX_PAYLOAD_SIZE)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, id: RequestId, request: &Request) -> Result<()> {
    let bytes = encode_request(id, request)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<(RequestId, Response)> {
    read_frame(reader, FrameKind::Response, MAX_PAYLOAD_SIZE)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, id: RequestId, response: &Response) -> Result<()> {
    let bytes = encode_response(id, response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
