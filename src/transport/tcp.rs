//! TCP Transport
//!
//! Sends framed requests over a single TCP connection and reassembles
//! response frames from whatever the socket delivers.

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::BytesMut;

use super::{PollMode, Transport};
use crate::config::Config;
use crate::error::{Result, SpaceError};
use crate::protocol::{decode_response, encode_request, Request, RequestId, Response};

/// Client side of one store connection
pub struct TcpTransport {
    /// Read half, switched between blocking and non-blocking per poll
    reader: TcpStream,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Bytes received but not yet decoded into frames
    buffer: BytesMut,

    /// Size of each socket read
    read_chunk: usize,

    /// Largest payload accepted from the peer
    max_payload: u32,

    /// Next request id to hand out
    next_id: u64,

    /// Peer address for logging
    peer_addr: String,

    /// Set once the connection has failed; every later call errors
    closed: bool,

    /// O_NONBLOCK is shared with the write half, so it must never outlive a poll
    nonblocking: bool,
}

impl TcpTransport {
    /// Connect to `config.addr`
    pub fn connect(config: &Config) -> Result<Self> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let addrs = config
            .addr
            .to_socket_addrs()
            .map_err(|e| SpaceError::Config(format!("Invalid address '{}': {}", config.addr, e)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream, config),
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(SpaceError::Transport(match last_err {
            Some(e) => format!("Cannot connect to {}: {}", config.addr, e),
            None => format!("No addresses resolved for {}", config.addr),
        }))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, config: &Config) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        let reader = stream.try_clone()?;
        tracing::debug!("Connected to {}", peer_addr);

        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            read_chunk: config.read_buffer_size.max(1),
            max_payload: config.max_payload_size,
            next_id: 1,
            peer_addr,
            closed: false,
            nonblocking: false,
        })
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Mark the connection dead and build the error to report
    fn fail(&mut self, what: &str, err: impl std::fmt::Display) -> SpaceError {
        self.closed = true;
        tracing::warn!("Connection to {} failed while {}: {}", self.peer_addr, what, err);
        SpaceError::Transport(format!("{} {}: {}", what, self.peer_addr, err))
    }

    /// Decode every complete frame sitting in the buffer
    fn drain_frames(&mut self) -> Result<Vec<(RequestId, Response)>> {
        let mut frames = Vec::new();
        loop {
            match decode_response(&mut self.buffer, self.max_payload) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                // The stream is out of sync; nothing after this can be trusted
                Err(e) => return Err(self.fail("decoding from", e)),
            }
        }
    }

    /// Configure the read half for this poll; `false` means the deadline passed
    fn arm(&mut self, mode: PollMode) -> Result<bool> {
        let armed = match mode {
            PollMode::NoWait => self.set_nonblocking(true),
            PollMode::Block => self
                .set_nonblocking(false)
                .and_then(|_| self.reader.set_read_timeout(None)),
            PollMode::Until(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(false);
                }
                self.set_nonblocking(false)
                    .and_then(|_| self.reader.set_read_timeout(Some(remaining)))
            }
        };
        match armed {
            Ok(()) => Ok(true),
            Err(e) => Err(self.fail("configuring socket to", e)),
        }
    }

    fn set_nonblocking(&mut self, on: bool) -> std::io::Result<()> {
        if self.nonblocking != on {
            self.reader.set_nonblocking(on)?;
            self.nonblocking = on;
        }
        Ok(())
    }

    /// Put the shared socket back into blocking mode before writes resume
    fn disarm(&mut self) -> Result<()> {
        match self.set_nonblocking(false) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail("configuring socket to", e)),
        }
    }

    fn read_frames(&mut self, mode: PollMode) -> Result<Vec<(RequestId, Response)>> {
        let mut chunk = vec![0u8; self.read_chunk];
        loop {
            let frames = self.drain_frames()?;
            if !frames.is_empty() {
                return Ok(frames);
            }

            if !self.arm(mode)? {
                return Ok(Vec::new());
            }

            match self.reader.read(&mut chunk) {
                Ok(0) => return Err(self.fail("reading from", "connection closed by peer")),
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    if mode == PollMode::NoWait {
                        return self.drain_frames();
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                // Nothing available (NoWait) or the read timeout elapsed
                Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    if mode == PollMode::Block {
                        continue;
                    }
                    return Ok(Vec::new());
                }
                Err(e) => return Err(self.fail("reading from", e)),
            }
        }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, request: &Request) -> Result<RequestId> {
        if self.closed {
            return Err(SpaceError::Transport(format!("connection to {} is closed", self.peer_addr)));
        }

        let id = RequestId(self.next_id);
        let frame = encode_request(id, request)?;
        if let Err(e) = self.writer.write_all(&frame).and_then(|_| self.writer.flush()) {
            return Err(self.fail("writing to", e));
        }
        self.next_id += 1;

        tracing::trace!("Sent {} {:?} to {}", id, request.kind(), self.peer_addr);
        Ok(id)
    }

    fn poll(&mut self, mode: PollMode) -> Result<Vec<(RequestId, Response)>> {
        if self.closed {
            return Err(SpaceError::Transport(format!("connection to {} is closed", self.peer_addr)));
        }

        let frames = self.read_frames(mode);
        if self.nonblocking && !self.closed {
            self.disarm()?;
        }
        frames
    }
}
