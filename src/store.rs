//! Store Module
//!
//! In-memory evaluation of requests against typed spaces. This is the backend
//! of `MemoryTransport` and the reference for how a server answers each
//! request; it keeps no durable state.
//!
//! ## Responsibilities
//! - Route requests to per-operation handlers
//! - Zero-fill attributes a `put` leaves out on new records
//! - Evaluate filters for search, count, group_del and condput
//! - Apply atomic operations all-or-nothing

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SpaceError};
use crate::predicate::Filter;
use crate::protocol::{AtomicOp, Request, Response, Status};
use crate::schema::Schema;
use crate::value::{Attributes, Value};

/// One space: its schema and records ordered by key
struct Space {
    schema: Schema,
    records: BTreeMap<Value, Attributes>,
}

impl Space {
    /// A record as search sees it: attributes plus the key attribute
    fn full_record(&self, key: &Value, attrs: &Attributes) -> Attributes {
        let mut full = attrs.clone();
        full.insert(self.schema.key_name().to_string(), key.clone());
        full
    }

    fn matching(&self, filter: &Filter) -> Result<Vec<(Value, Attributes)>> {
        let compiled = filter.compile()?;
        Ok(self
            .records
            .iter()
            .map(|(k, attrs)| (k.clone(), self.full_record(k, attrs)))
            .filter(|(_, full)| compiled.matches(full))
            .collect())
    }
}

/// Request evaluator over in-memory spaces
#[derive(Default)]
pub struct MemoryStore {
    spaces: HashMap<String, Space>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a space; fails if the name is taken
    pub fn add_space(&mut self, schema: Schema) -> Result<()> {
        if self.spaces.contains_key(schema.name()) {
            return Err(SpaceError::Validation(format!(
                "Space '{}' already exists",
                schema.name()
            )));
        }
        tracing::debug!("Adding space '{}'", schema.name());
        self.spaces.insert(
            schema.name().to_string(),
            Space {
                schema,
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Drop a space and all its records
    pub fn remove_space(&mut self, name: &str) -> bool {
        self.spaces.remove(name).is_some()
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.spaces.get(name).map(|s| &s.schema)
    }

    /// Number of records in a space
    pub fn record_count(&self, name: &str) -> usize {
        self.spaces.get(name).map_or(0, |s| s.records.len())
    }

    /// Execute a request
    ///
    /// Single-record requests yield one response; searches yield one row per
    /// match followed by `SearchDone`.
    pub fn execute(&mut self, request: &Request) -> Vec<Response> {
        let Some(space) = self.spaces.get_mut(request.space()) else {
            return vec![Response::error(
                Status::UnknownSpace,
                format!("no space named '{}'", request.space()),
            )];
        };

        match Self::dispatch(space, request) {
            Ok(responses) => responses,
            Err(e) => vec![Response::error(status_for(&e), e.to_string())],
        }
    }

    fn dispatch(space: &mut Space, request: &Request) -> Result<Vec<Response>> {
        if let Some(key) = request.key() {
            space.schema.validate_key(key)?;
        }

        let response = match request {
            Request::Get { key, .. } => match space.records.get(key) {
                Some(attrs) => Response::object(attrs.clone()),
                None => Response::not_found(),
            },
            Request::GetPartial { key, fields, .. } => {
                space.schema.validate_fields(fields)?;
                match space.records.get(key) {
                    Some(attrs) => {
                        let full = space.full_record(key, attrs);
                        Response::object(
                            fields
                                .iter()
                                .filter_map(|f| full.get(f).map(|v| (f.clone(), v.clone())))
                                .collect(),
                        )
                    }
                    None => Response::not_found(),
                }
            }
            Request::Put { key, attributes, .. } => {
                space.schema.validate_attributes(attributes)?;
                let record = space
                    .records
                    .entry(key.clone())
                    .or_insert_with(|| space.schema.zero_record());
                record.extend(attributes.clone());
                Response::ok()
            }
            Request::PutIfNotExist { key, attributes, .. } => {
                space.schema.validate_attributes(attributes)?;
                if space.records.contains_key(key) {
                    Response::cmp_fail()
                } else {
                    let mut record = space.schema.zero_record();
                    record.extend(attributes.clone());
                    space.records.insert(key.clone(), record);
                    Response::ok()
                }
            }
            Request::CondPut {
                key,
                conditions,
                attributes,
                ..
            } => {
                space.schema.validate_attributes(attributes)?;
                conditions.validate(&space.schema)?;
                let compiled = conditions.compile()?;
                let satisfied = space
                    .records
                    .get(key)
                    .map(|attrs| compiled.matches(&space.full_record(key, attrs)));
                match satisfied {
                    None => Response::not_found(),
                    Some(false) => Response::cmp_fail(),
                    Some(true) => {
                        if let Some(record) = space.records.get_mut(key) {
                            record.extend(attributes.clone());
                        }
                        Response::ok()
                    }
                }
            }
            Request::Delete { key, .. } => match space.records.remove(key) {
                Some(_) => Response::ok(),
                None => Response::not_found(),
            },
            Request::Atomic {
                key,
                op,
                attributes,
                ..
            } => {
                for (name, operand) in attributes {
                    let datatype = space.schema.require(name)?;
                    op.validate(name, &datatype, operand)?;
                }
                let Some(record) = space.records.get_mut(key) else {
                    return Ok(vec![Response::not_found()]);
                };

                // Compute every new value before touching the record
                let mut updates = Vec::with_capacity(attributes.len());
                for (name, operand) in attributes {
                    let current = record
                        .get(name)
                        .ok_or_else(|| SpaceError::Validation(format!("Cannot modify key attribute '{}'", name)))?;
                    match apply_atomic(*op, current, operand) {
                        Ok(v) => updates.push((name.clone(), v)),
                        Err(status) => {
                            return Ok(vec![Response::error(
                                status,
                                format!("{:?} failed on '{}'", op, name),
                            )]);
                        }
                    }
                }
                record.extend(updates);
                Response::ok()
            }
            Request::Search { filter, .. } => {
                filter.validate(&space.schema)?;
                let mut rows: Vec<Response> = space
                    .matching(filter)?
                    .into_iter()
                    .map(|(_, full)| Response::object(full))
                    .collect();
                rows.push(Response::search_done());
                return Ok(rows);
            }
            Request::SortedSearch {
                filter,
                sort_by,
                limit,
                maximize,
                ..
            } => {
                filter.validate(&space.schema)?;
                let datatype = space.schema.require(sort_by)?;
                if !datatype.is_ordered() {
                    return Err(SpaceError::WrongType {
                        attribute: sort_by.clone(),
                        message: format!("cannot sort by {}", datatype),
                    });
                }
                let mut matches = space.matching(filter)?;
                matches.sort_by(|(_, a), (_, b)| a.get(sort_by).cmp(&b.get(sort_by)));
                if *maximize {
                    matches.reverse();
                }
                let mut rows: Vec<Response> = matches
                    .into_iter()
                    .take(*limit as usize)
                    .map(|(_, full)| Response::object(full))
                    .collect();
                rows.push(Response::search_done());
                return Ok(rows);
            }
            Request::Count { filter, .. } => {
                filter.validate(&space.schema)?;
                Response::count(space.matching(filter)?.len() as u64)
            }
            Request::GroupDel { filter, .. } => {
                filter.validate(&space.schema)?;
                for (key, _) in space.matching(filter)? {
                    space.records.remove(&key);
                }
                Response::ok()
            }
        };

        Ok(vec![response])
    }
}

/// Map a validation failure to the status a server would report
fn status_for(error: &SpaceError) -> Status {
    match error {
        SpaceError::UnknownSpace(_) => Status::UnknownSpace,
        SpaceError::UnknownAttribute { .. } => Status::UnknownAttribute,
        SpaceError::WrongType { .. } => Status::WrongType,
        SpaceError::Validation(_) | SpaceError::DuplicateAttribute(_) => Status::BadRequest,
        _ => Status::ServerError,
    }
}

/// Apply one atomic op to one stored value
fn apply_atomic(op: AtomicOp, current: &Value, operand: &Value) -> std::result::Result<Value, Status> {
    use Value::*;

    let int = |r: Option<i64>| r.map(Int).ok_or(Status::Overflow);

    match (op, current, operand) {
        (AtomicOp::Add, Int(a), Int(b)) => int(a.checked_add(*b)),
        (AtomicOp::Sub, Int(a), Int(b)) => int(a.checked_sub(*b)),
        (AtomicOp::Mul, Int(a), Int(b)) => int(a.checked_mul(*b)),
        (AtomicOp::Div, Int(a), Int(b)) => int(a.checked_div(*b)),
        (AtomicOp::Mod, Int(a), Int(b)) => int(a.checked_rem(*b)),
        (AtomicOp::And, Int(a), Int(b)) => Ok(Int(a & b)),
        (AtomicOp::Or, Int(a), Int(b)) => Ok(Int(a | b)),
        (AtomicOp::Xor, Int(a), Int(b)) => Ok(Int(a ^ b)),

        (AtomicOp::Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (AtomicOp::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
        (AtomicOp::Mul, Float(a), Float(b)) => Ok(Float(a * b)),
        (AtomicOp::Div, Float(a), Float(b)) => Ok(Float(a / b)),

        (AtomicOp::StringPrepend, String(a), String(b)) => Ok(String(format!("{}{}", b, a))),
        (AtomicOp::StringAppend, String(a), String(b)) => Ok(String(format!("{}{}", a, b))),

        (AtomicOp::ListLpush, List(items), elem) => {
            let mut items = items.clone();
            items.insert(0, elem.clone());
            Ok(List(items))
        }
        (AtomicOp::ListRpush, List(items), elem) => {
            let mut items = items.clone();
            items.push(elem.clone());
            Ok(List(items))
        }

        (AtomicOp::SetAdd, Set(items), elem) => {
            let mut items = items.clone();
            items.insert(elem.clone());
            Ok(Set(items))
        }
        (AtomicOp::SetRemove, Set(items), elem) => {
            let mut items = items.clone();
            items.remove(elem);
            Ok(Set(items))
        }
        (AtomicOp::SetIntersect, Set(a), Set(b)) => Ok(Set(a.intersection(b).cloned().collect())),
        (AtomicOp::SetUnion, Set(a), Set(b)) => Ok(Set(a.union(b).cloned().collect())),

        (AtomicOp::MapAdd, Map(entries), Map(added)) => {
            let mut entries = entries.clone();
            entries.extend(added.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Map(entries))
        }
        (AtomicOp::MapRemove, Map(entries), key) => {
            let mut entries = entries.clone();
            entries.remove(key);
            Ok(Map(entries))
        }
        (op, Map(entries), Map(operands)) => {
            let entry_op = op.entry_op().ok_or(Status::WrongType)?;
            let mut entries = entries.clone();
            for (key, operand) in operands {
                let current = match entries.get(key) {
                    Some(v) => v.clone(),
                    None => zero_like(operand),
                };
                let updated = apply_atomic(entry_op, &current, operand)?;
                entries.insert(key.clone(), updated);
            }
            Ok(Map(entries))
        }

        _ => Err(Status::WrongType),
    }
}

/// Zero value of the scalar type `operand` has
fn zero_like(operand: &Value) -> Value {
    match operand {
        Value::Int(_) => Value::Int(0),
        Value::Float(_) => Value::Float(0.0),
        _ => Value::String(String::new()),
    }
}
