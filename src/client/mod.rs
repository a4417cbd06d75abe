//! Client Module
//!
//! The public face of the crate. Every operation is validated against the
//! space's schema, submitted through the transport, and either returned as a
//! `Deferred` (`async_*`) or waited on immediately (synchronous form).
//!
//! ```text
//!   client.async_put(..) ──► validate ──► Dispatcher::submit ──► Deferred
//!                                                                 │
//!   client.put(..)  ════  client.async_put(..)?.wait()  ◄─────────┘
//!
//!   client.loop_once() ──► next resolved Deferred, in completion order
//!   client.search(..)  ──► SearchIterator (pulls rows through the same loop)
//! ```
//!
//! A client is driven from one thread at a time. It is `Send`, not `Sync`.

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod deferred;
mod dispatcher;
mod operation;
mod registry;
mod search;

pub use deferred::Deferred;
pub use operation::{FromOutcome, OpStatus, Operation, Outcome};
pub use registry::OperationRegistry;
pub use search::SearchIterator;

use dispatcher::{result_of, Dispatcher};
use registry::{SharedSearch, SharedSlot};

use crate::config::Config;
use crate::error::{Result, SpaceError};
use crate::predicate::Filter;
use crate::protocol::{AtomicOp, Request, RequestId};
use crate::schema::Schema;
use crate::transport::{TcpTransport, Transport};
use crate::value::{Attributes, DataType, Value};

/// Connection to a store plus the event loop driving it
pub struct Client {
    config: Config,
    schemas: RefCell<HashMap<String, Arc<Schema>>>,
    dispatcher: RefCell<Dispatcher>,
}

impl Client {
    /// Connect over TCP to `config.addr`
    pub fn connect(config: Config) -> Result<Self> {
        let transport = TcpTransport::connect(&config)?;
        Ok(Self::with_transport(transport, config))
    }

    /// Build a client over any transport
    pub fn with_transport(transport: impl Transport + 'static, config: Config) -> Self {
        let schemas = config
            .spaces
            .iter()
            .map(|s| (s.name().to_string(), Arc::new(s.clone())))
            .collect();
        Self {
            config,
            schemas: RefCell::new(schemas),
            dispatcher: RefCell::new(Dispatcher::new(Box::new(transport))),
        }
    }

    /// Build a client over any transport with default settings
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_transport(transport, Config::default())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Schemas
    // =========================================================================

    /// Register a space's schema, replacing any cached one
    pub fn add_space(&self, schema: Schema) {
        tracing::debug!("Registering schema for '{}'", schema.name());
        self.schemas
            .borrow_mut()
            .insert(schema.name().to_string(), Arc::new(schema));
    }

    /// Forget a space's schema; `false` if it was not registered
    ///
    /// A later operation on the space asks the transport again.
    pub fn rm_space(&self, space: &str) -> bool {
        let removed = self.schemas.borrow_mut().remove(space).is_some();
        if removed {
            tracing::debug!("Removed schema for '{}'", space);
        }
        removed
    }

    /// Schema of `space`, asking the transport if it is not cached
    pub fn schema(&self, space: &str) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schemas.borrow().get(space) {
            return Ok(Arc::clone(schema));
        }

        let described = self.dispatcher()?.describe_space(space)?;
        let schema = Arc::new(described.ok_or_else(|| SpaceError::UnknownSpace(space.to_string()))?);
        self.schemas
            .borrow_mut()
            .insert(space.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Declared type of one attribute (the key included)
    pub fn attribute_type(&self, space: &str, attribute: &str) -> Result<DataType> {
        self.schema(space)?.require(attribute)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create or update a record; unspecified attributes of a new record
    /// start at their zero value
    pub fn put<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<bool>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.async_put(space, key, attrs)?.wait()
    }

    pub fn async_put<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<Deferred<'_, bool>>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let (key, attributes) = self.checked_write(space, key, attrs)?;
        self.submit(Request::Put {
            space: space.to_string(),
            key,
            attributes,
        })
    }

    /// Create a record only if the key is unused; `false` if it exists
    pub fn put_if_not_exist<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<bool>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.async_put_if_not_exist(space, key, attrs)?.wait()
    }

    pub fn async_put_if_not_exist<K, I, S, V>(
        &self,
        space: &str,
        key: K,
        attrs: I,
    ) -> Result<Deferred<'_, bool>>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let (key, attributes) = self.checked_write(space, key, attrs)?;
        self.submit(Request::PutIfNotExist {
            space: space.to_string(),
            key,
            attributes,
        })
    }

    /// Update a record only if it satisfies every condition
    ///
    /// Returns `false`, leaving the record untouched, when a condition fails
    /// or the record does not exist.
    pub fn condput<K, I, S, V>(&self, space: &str, key: K, conditions: Filter, attrs: I) -> Result<bool>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.async_condput(space, key, conditions, attrs)?.wait()
    }

    pub fn async_condput<K, I, S, V>(
        &self,
        space: &str,
        key: K,
        conditions: Filter,
        attrs: I,
    ) -> Result<Deferred<'_, bool>>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let (key, attributes) = self.checked_write(space, key, attrs)?;
        conditions.validate(&*self.schema(space)?)?;
        self.submit(Request::CondPut {
            space: space.to_string(),
            key,
            conditions,
            attributes,
        })
    }

    /// Remove a record; `false` if it did not exist
    pub fn delete(&self, space: &str, key: impl Into<Value>) -> Result<bool> {
        self.async_delete(space, key)?.wait()
    }

    pub fn async_delete(&self, space: &str, key: impl Into<Value>) -> Result<Deferred<'_, bool>> {
        let key = self.checked_key(space, key)?;
        self.submit(Request::Delete {
            space: space.to_string(),
            key,
        })
    }

    // =========================================================================
    // Atomic Operations
    // =========================================================================

    /// Apply `op` to each named attribute in place, all or nothing
    ///
    /// `false` if the record does not exist. Integer overflow fails the
    /// operation with a server error.
    pub fn atomic<K, I, S, V>(&self, space: &str, key: K, op: AtomicOp, attrs: I) -> Result<bool>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.async_atomic(space, key, op, attrs)?.wait()
    }

    pub fn async_atomic<K, I, S, V>(
        &self,
        space: &str,
        key: K,
        op: AtomicOp,
        attrs: I,
    ) -> Result<Deferred<'_, bool>>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let schema = self.schema(space)?;
        let key = key.into();
        schema.validate_key(&key)?;
        let attributes = collect_attributes(attrs)?;
        for (name, operand) in &attributes {
            if name == schema.key_name() {
                return Err(SpaceError::Validation(format!(
                    "Cannot modify key attribute '{}'",
                    name
                )));
            }
            op.validate(name, &schema.require(name)?, operand)?;
        }
        self.submit(Request::Atomic {
            space: space.to_string(),
            key,
            op,
            attributes,
        })
    }

    /// Add each operand to its attribute
    pub fn atomic_inc<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<bool>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.atomic(space, key, AtomicOp::Add, attrs)
    }

    pub fn async_atomic_inc<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<Deferred<'_, bool>>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.async_atomic(space, key, AtomicOp::Add, attrs)
    }

    /// Subtract each operand from its attribute
    pub fn atomic_dec<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<bool>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.atomic(space, key, AtomicOp::Sub, attrs)
    }

    pub fn async_atomic_dec<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<Deferred<'_, bool>>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.async_atomic(space, key, AtomicOp::Sub, attrs)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch a record's attributes (the key excluded); `None` if absent
    pub fn get(&self, space: &str, key: impl Into<Value>) -> Result<Option<Attributes>> {
        self.async_get(space, key)?.wait()
    }

    pub fn async_get(
        &self,
        space: &str,
        key: impl Into<Value>,
    ) -> Result<Deferred<'_, Option<Attributes>>> {
        let key = self.checked_key(space, key)?;
        self.submit(Request::Get {
            space: space.to_string(),
            key,
        })
    }

    /// Fetch only `fields` of a record; `None` if absent
    pub fn get_partial<F>(
        &self,
        space: &str,
        key: impl Into<Value>,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<Option<Attributes>>
    where
        F: Into<String>,
    {
        self.async_get_partial(space, key, fields)?.wait()
    }

    pub fn async_get_partial<F>(
        &self,
        space: &str,
        key: impl Into<Value>,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<Deferred<'_, Option<Attributes>>>
    where
        F: Into<String>,
    {
        let key = self.checked_key(space, key)?;
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.schema(space)?.validate_fields(&fields)?;
        self.submit(Request::GetPartial {
            space: space.to_string(),
            key,
            fields,
        })
    }

    /// Number of records matching `filter`
    pub fn count(&self, space: &str, filter: Filter) -> Result<u64> {
        self.async_count(space, filter)?.wait()
    }

    pub fn async_count(&self, space: &str, filter: Filter) -> Result<Deferred<'_, u64>> {
        self.checked_filter(space, &filter)?;
        self.submit(Request::Count {
            space: space.to_string(),
            filter,
        })
    }

    /// Remove every record matching `filter`
    pub fn group_del(&self, space: &str, filter: Filter) -> Result<bool> {
        self.async_group_del(space, filter)?.wait()
    }

    pub fn async_group_del(&self, space: &str, filter: Filter) -> Result<Deferred<'_, bool>> {
        self.checked_filter(space, &filter)?;
        self.submit(Request::GroupDel {
            space: space.to_string(),
            filter,
        })
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Stream every record matching `filter`, the key included
    ///
    /// Results form a set; their order is unspecified.
    pub fn search(&self, space: &str, filter: Filter) -> Result<SearchIterator<'_>> {
        self.checked_filter(space, &filter)?;
        self.submit_search(Request::Search {
            space: space.to_string(),
            filter,
        })
    }

    /// Stream at most `limit` matches ordered by `sort_by`, largest first
    /// when `maximize` is set
    pub fn sorted_search(
        &self,
        space: &str,
        filter: Filter,
        sort_by: &str,
        limit: u64,
        maximize: bool,
    ) -> Result<SearchIterator<'_>> {
        self.checked_filter(space, &filter)?;
        let datatype = self.schema(space)?.require(sort_by)?;
        if !datatype.is_ordered() {
            return Err(SpaceError::WrongType {
                attribute: sort_by.to_string(),
                message: format!("cannot sort by {}", datatype),
            });
        }
        self.submit_search(Request::SortedSearch {
            space: space.to_string(),
            filter,
            sort_by: sort_by.to_string(),
            limit,
            maximize,
        })
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    /// Return the next operation to complete, driving the transport if needed
    ///
    /// Fails with `NonePending` when no `async_*` call is outstanding.
    pub fn loop_once(&self) -> Result<Deferred<'_, Outcome>> {
        self.loop_with(self.config.wait_timeout())
    }

    /// As `loop_once`, giving up with `Timeout` after `timeout`
    pub fn loop_timeout(&self, timeout: Duration) -> Result<Deferred<'_, Outcome>> {
        self.loop_with(Some(timeout))
    }

    fn loop_with(&self, timeout: Option<Duration>) -> Result<Deferred<'_, Outcome>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let (id, slot) = self.dispatcher()?.loop_once(deadline)?;
        Ok(Deferred::new(id, slot, self))
    }

    /// Outstanding operations, searches included
    pub fn pending(&self) -> usize {
        self.dispatcher
            .try_borrow()
            .map_or(0, |d| d.registry().len())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn dispatcher(&self) -> Result<RefMut<'_, Dispatcher>> {
        self.dispatcher
            .try_borrow_mut()
            .map_err(|_| SpaceError::Protocol("Client re-entered while dispatching".to_string()))
    }

    fn submit<T: FromOutcome>(&self, request: Request) -> Result<Deferred<'_, T>> {
        let (id, slot) = self.dispatcher()?.submit(request)?;
        Ok(Deferred::new(id, slot, self))
    }

    fn submit_search(&self, request: Request) -> Result<SearchIterator<'_>> {
        let (id, state) = self.dispatcher()?.submit_search(request)?;
        Ok(SearchIterator::new(id, state, self))
    }

    pub(crate) fn wait_for(
        &self,
        id: RequestId,
        slot: &SharedSlot,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        if slot.lock().is_resolved() {
            if let Ok(mut dispatcher) = self.dispatcher.try_borrow_mut() {
                dispatcher.consume(id);
            }
            return result_of(slot);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        self.dispatcher()?.wait(id, slot, deadline)
    }

    pub(crate) fn pump_search(
        &self,
        id: RequestId,
        state: &SharedSearch,
        deadline: Option<Instant>,
    ) -> Result<()> {
        self.dispatcher()?.pump_search(id, state, deadline)
    }

    pub(crate) fn detach_search(&self, id: RequestId) {
        if let Ok(mut dispatcher) = self.dispatcher.try_borrow_mut() {
            dispatcher.detach(id);
        }
    }

    fn checked_key(&self, space: &str, key: impl Into<Value>) -> Result<Value> {
        let key = key.into();
        self.schema(space)?.validate_key(&key)?;
        Ok(key)
    }

    fn checked_write<K, I, S, V>(&self, space: &str, key: K, attrs: I) -> Result<(Value, Attributes)>
    where
        K: Into<Value>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let key = self.checked_key(space, key)?;
        let attributes = collect_attributes(attrs)?;
        self.schema(space)?.validate_attributes(&attributes)?;
        Ok((key, attributes))
    }

    fn checked_filter(&self, space: &str, filter: &Filter) -> Result<()> {
        filter.validate(&*self.schema(space)?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("spaces", &self.schemas.borrow().len())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Gather `(name, value)` pairs, rejecting repeated names
fn collect_attributes<I, S, V>(attrs: I) -> Result<Attributes>
where
    I: IntoIterator<Item = (S, V)>,
    S: Into<String>,
    V: Into<Value>,
{
    let mut attributes = Attributes::new();
    for (name, value) in attrs {
        let name = name.into();
        if attributes.contains_key(&name) {
            return Err(SpaceError::DuplicateAttribute(name));
        }
        attributes.insert(name, value.into());
    }
    Ok(attributes)
}
