//! In-process transport
//!
//! Answers requests from a `MemoryStore` shared between any number of
//! transports. Responses are computed when a request is sent and queued on a
//! channel until polled, so they reach the client in the same batched,
//! asynchronous way a network transport delivers them.
//!
//! A `MemoryHandle` steers the link from outside: hold responses back,
//! sever the connection, or inject stray responses.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::{PollMode, Transport};
use crate::error::{Result, SpaceError};
use crate::protocol::{Request, RequestId, Response};
use crate::schema::Schema;
use crate::store::MemoryStore;

/// A store shared between transports
pub type SharedStore = Arc<Mutex<MemoryStore>>;

type Delivery = (RequestId, Response);

/// Link state visible to both the transport and its handles
#[derive(Default)]
struct Link {
    disconnected: bool,
    paused: bool,
    held: VecDeque<Delivery>,
    sent: usize,
    polls: usize,
}

/// Loopback transport over a `MemoryStore`
pub struct MemoryTransport {
    store: SharedStore,
    link: Arc<Mutex<Link>>,
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
    next_id: u64,
    batch_limit: Option<usize>,
}

impl MemoryTransport {
    /// Create a transport over `store`
    pub fn new(store: SharedStore) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            store,
            link: Arc::new(Mutex::new(Link::default())),
            tx,
            rx,
            next_id: 1,
            batch_limit: None,
        }
    }

    /// Create a transport over a fresh store holding `spaces`
    pub fn with_spaces(spaces: impl IntoIterator<Item = Schema>) -> Result<Self> {
        let mut store = MemoryStore::new();
        for schema in spaces {
            store.add_space(schema)?;
        }
        Ok(Self::new(Arc::new(Mutex::new(store))))
    }

    /// Deliver at most `limit` responses per poll
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit.max(1));
        self
    }

    /// The store this transport answers from
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// A handle for steering this transport's link
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            link: Arc::clone(&self.link),
            tx: self.tx.clone(),
        }
    }

    fn closed() -> SpaceError {
        SpaceError::Transport("loopback link disconnected".to_string())
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, request: &Request) -> Result<RequestId> {
        let mut link = self.link.lock();
        if link.disconnected {
            return Err(Self::closed());
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;
        link.sent += 1;

        let responses = self.store.lock().execute(request);
        tracing::trace!("Loopback {} {:?} -> {} response(s)", id, request.kind(), responses.len());

        for response in responses {
            if link.paused {
                link.held.push_back((id, response));
            } else {
                self.tx.send((id, response)).map_err(|_| Self::closed())?;
            }
        }
        Ok(id)
    }

    fn poll(&mut self, mode: PollMode) -> Result<Vec<(RequestId, Response)>> {
        {
            let mut link = self.link.lock();
            link.polls += 1;
            if link.disconnected {
                return Err(Self::closed());
            }
        }

        let first = match mode {
            PollMode::Block => self.rx.recv().map_err(|_| Self::closed())?,
            PollMode::NoWait => match self.rx.try_recv() {
                Ok(d) => d,
                Err(TryRecvError::Empty) => return Ok(Vec::new()),
                Err(TryRecvError::Disconnected) => return Err(Self::closed()),
            },
            PollMode::Until(deadline) => match self.rx.recv_deadline(deadline) {
                Ok(d) => d,
                Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
                Err(RecvTimeoutError::Disconnected) => return Err(Self::closed()),
            },
        };

        // A handle may have severed the link while we were blocked
        if self.link.lock().disconnected {
            return Err(Self::closed());
        }

        let limit = self.batch_limit.unwrap_or(usize::MAX);
        let mut batch = vec![first];
        while batch.len() < limit {
            match self.rx.try_recv() {
                Ok(d) => batch.push(d),
                Err(_) => break,
            }
        }
        Ok(batch)
    }

    fn describe_space(&mut self, space: &str) -> Result<Option<Schema>> {
        Ok(self.store.lock().schema(space).cloned())
    }
}

/// Remote control for a `MemoryTransport`
#[derive(Clone)]
pub struct MemoryHandle {
    link: Arc<Mutex<Link>>,
    tx: Sender<Delivery>,
}

impl MemoryHandle {
    /// Hold responses back until `resume`
    pub fn pause(&self) {
        self.link.lock().paused = true;
    }

    /// Release held responses in the order they were produced
    pub fn resume(&self) {
        let mut link = self.link.lock();
        link.paused = false;
        for delivery in link.held.drain(..) {
            // The transport owns the receiver, so this only fails once it is gone
            if self.tx.send(delivery).is_err() {
                break;
            }
        }
    }

    /// Release held responses newest first
    pub fn resume_reversed(&self) {
        let mut link = self.link.lock();
        link.paused = false;
        while let Some(delivery) = link.held.pop_back() {
            if self.tx.send(delivery).is_err() {
                break;
            }
        }
    }

    /// Number of responses currently held back
    pub fn held(&self) -> usize {
        self.link.lock().held.len()
    }

    /// Sever the link; every later send or poll fails
    pub fn disconnect(&self) {
        self.link.lock().disconnected = true;
    }

    /// Queue a response the store never produced
    pub fn inject(&self, id: RequestId, response: Response) {
        let _ = self.tx.send((id, response));
    }

    /// Requests accepted by the transport so far
    pub fn sent_count(&self) -> usize {
        self.link.lock().sent
    }

    /// Calls to `poll` so far
    pub fn poll_count(&self) -> usize {
        self.link.lock().polls
    }
}
