//! # spacekv
//!
//! Client core for a remote, schema-typed key-value store:
//! - Typed attribute values and space schemas
//! - Predicate filters for search, count, group delete and conditional put
//! - Pipelined asynchronous operations over one connection
//! - A per-client event loop that resolves deferred results and feeds
//!   streaming search iterators
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │        put / get / condput / atomic / search / async_*       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ validate against Schema
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Dispatcher (event loop)                      │
//! │       OperationRegistry  ·  ready queue  ·  loop / wait      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ send / poll
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │TcpTransport │          │  Memory     │
//!   │  (framed)   │          │  Transport  │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!    remote store            ┌─────────────┐
//!                            │ MemoryStore │
//!                            └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use spacekv::{Client, Config, Filter, Predicate, Schema};
//!
//! # fn main() -> spacekv::Result<()> {
//! let schema = Schema::parse("space kv key int k attributes int v")?;
//! let client = Client::connect(Config::builder().space(schema).build())?;
//!
//! client.put("kv", 1, [("v", 10)])?;
//! let pending = client.async_get("kv", 1)?;
//! let record = pending.wait()?;
//!
//! for row in client.search("kv", Filter::new().with("v", Predicate::range(0, 20)))? {
//!     println!("{:?}", row?);
//! }
//! # let _ = record;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod value;
pub mod schema;
pub mod predicate;
pub mod protocol;
pub mod transport;
pub mod store;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SpaceError};
pub use config::Config;
pub use value::{Attributes, DataType, Primitive, Value};
pub use schema::Schema;
pub use predicate::{Filter, Predicate};
pub use protocol::{AtomicOp, RequestId};
pub use transport::{MemoryHandle, MemoryTransport, PollMode, TcpTransport, Transport};
pub use store::MemoryStore;
pub use client::{Client, Deferred, OpStatus, Outcome, SearchIterator};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of spacekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
