//! Request definitions
//!
//! Represents the operations a client sends to a store.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpaceError};
use crate::predicate::Filter;
use crate::value::{Attributes, DataType, Value};

/// Request types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    Get = 0x01,
    GetPartial = 0x02,
    Put = 0x03,
    PutIfNotExist = 0x04,
    CondPut = 0x05,
    Delete = 0x06,
    Atomic = 0x07,
    Search = 0x08,
    SortedSearch = 0x09,
    Count = 0x0a,
    GroupDel = 0x0b,
}

/// A request for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Fetch every non-key attribute of a record
    Get { space: String, key: Value },

    /// Fetch only the named attributes
    GetPartial {
        space: String,
        key: Value,
        fields: Vec<String>,
    },

    /// Create or update a record
    Put {
        space: String,
        key: Value,
        attributes: Attributes,
    },

    /// Create a record only if the key is free
    PutIfNotExist {
        space: String,
        key: Value,
        attributes: Attributes,
    },

    /// Update a record only if it satisfies `conditions`
    CondPut {
        space: String,
        key: Value,
        conditions: Filter,
        attributes: Attributes,
    },

    /// Remove a record
    Delete { space: String, key: Value },

    /// Apply `op` with each attribute's operand to the stored values
    Atomic {
        space: String,
        key: Value,
        op: AtomicOp,
        attributes: Attributes,
    },

    /// Stream every matching record
    Search { space: String, filter: Filter },

    /// Stream at most `limit` matching records ordered by `sort_by`
    SortedSearch {
        space: String,
        filter: Filter,
        sort_by: String,
        limit: u64,
        maximize: bool,
    },

    /// Number of matching records
    Count { space: String, filter: Filter },

    /// Remove every matching record
    GroupDel { space: String, filter: Filter },
}

impl Request {
    /// Get the request type
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Get { .. } => RequestKind::Get,
            Request::GetPartial { .. } => RequestKind::GetPartial,
            Request::Put { .. } => RequestKind::Put,
            Request::PutIfNotExist { .. } => RequestKind::PutIfNotExist,
            Request::CondPut { .. } => RequestKind::CondPut,
            Request::Delete { .. } => RequestKind::Delete,
            Request::Atomic { .. } => RequestKind::Atomic,
            Request::Search { .. } => RequestKind::Search,
            Request::SortedSearch { .. } => RequestKind::SortedSearch,
            Request::Count { .. } => RequestKind::Count,
            Request::GroupDel { .. } => RequestKind::GroupDel,
        }
    }

    pub fn space(&self) -> &str {
        match self {
            Request::Get { space, .. }
            | Request::GetPartial { space, .. }
            | Request::Put { space, .. }
            | Request::PutIfNotExist { space, .. }
            | Request::CondPut { space, .. }
            | Request::Delete { space, .. }
            | Request::Atomic { space, .. }
            | Request::Search { space, .. }
            | Request::SortedSearch { space, .. }
            | Request::Count { space, .. }
            | Request::GroupDel { space, .. } => space,
        }
    }

    /// Key of single-record requests
    pub fn key(&self) -> Option<&Value> {
        match self {
            Request::Get { key, .. }
            | Request::GetPartial { key, .. }
            | Request::Put { key, .. }
            | Request::PutIfNotExist { key, .. }
            | Request::CondPut { key, .. }
            | Request::Delete { key, .. }
            | Request::Atomic { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl RequestKind {
    /// Requests answered by a stream of rows ending in `SearchDone`
    pub fn is_stream(self) -> bool {
        matches!(self, RequestKind::Search | RequestKind::SortedSearch)
    }
}

// =============================================================================
// Atomic Operations
// =============================================================================

/// In-place mutations applied by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    StringPrepend,
    StringAppend,
    ListLpush,
    ListRpush,
    SetAdd,
    SetRemove,
    SetIntersect,
    SetUnion,

    /// Insert or overwrite the entries of a map operand
    MapAdd,
    /// Erase one map key
    MapRemove,

    // Per-entry ops take a map of key to operand; a missing entry starts
    // at the zero value of the map's value type
    MapAtomicAdd,
    MapAtomicSub,
    MapAtomicMul,
    MapAtomicDiv,
    MapAtomicMod,
    MapAtomicAnd,
    MapAtomicOr,
    MapAtomicXor,
    MapStringPrepend,
    MapStringAppend,
}

impl AtomicOp {
    /// Op applied to each entry's value by a per-entry map op
    pub fn entry_op(self) -> Option<AtomicOp> {
        match self {
            AtomicOp::MapAtomicAdd => Some(AtomicOp::Add),
            AtomicOp::MapAtomicSub => Some(AtomicOp::Sub),
            AtomicOp::MapAtomicMul => Some(AtomicOp::Mul),
            AtomicOp::MapAtomicDiv => Some(AtomicOp::Div),
            AtomicOp::MapAtomicMod => Some(AtomicOp::Mod),
            AtomicOp::MapAtomicAnd => Some(AtomicOp::And),
            AtomicOp::MapAtomicOr => Some(AtomicOp::Or),
            AtomicOp::MapAtomicXor => Some(AtomicOp::Xor),
            AtomicOp::MapStringPrepend => Some(AtomicOp::StringPrepend),
            AtomicOp::MapStringAppend => Some(AtomicOp::StringAppend),
            _ => None,
        }
    }

    /// Check `operand` is a valid argument for this op on `datatype`
    pub fn validate(self, attribute: &str, datatype: &DataType, operand: &Value) -> Result<()> {
        let ok = match self {
            AtomicOp::Add | AtomicOp::Sub | AtomicOp::Mul | AtomicOp::Div => {
                datatype.is_numeric() && datatype.conforms(operand)
            }
            AtomicOp::Mod | AtomicOp::And | AtomicOp::Or | AtomicOp::Xor => {
                *datatype == DataType::Int && datatype.conforms(operand)
            }
            AtomicOp::StringPrepend | AtomicOp::StringAppend => {
                *datatype == DataType::String && datatype.conforms(operand)
            }
            // Push takes one element
            AtomicOp::ListLpush | AtomicOp::ListRpush => match datatype {
                DataType::List(elem) => elem.conforms(operand),
                _ => false,
            },
            // Add/remove take one element; intersect/union take a whole set
            AtomicOp::SetAdd | AtomicOp::SetRemove => match datatype {
                DataType::Set(elem) => elem.conforms(operand),
                _ => false,
            },
            AtomicOp::SetIntersect | AtomicOp::SetUnion => {
                matches!(datatype, DataType::Set(_)) && datatype.conforms(operand)
            }
            AtomicOp::MapAdd => matches!(datatype, DataType::Map(_, _)) && datatype.conforms(operand),
            AtomicOp::MapRemove => match datatype {
                DataType::Map(key, _) => key.conforms(operand),
                _ => false,
            },
            // Every entry must be a valid operand for the op on the value type
            _ => match (datatype, operand, self.entry_op()) {
                (DataType::Map(key, value), Value::Map(entries), Some(op)) => {
                    let value = DataType::from(*value);
                    entries.iter().all(|(k, v)| {
                        key.conforms(k) && op.validate(attribute, &value, v).is_ok()
                    })
                }
                _ => false,
            },
        };

        if !ok {
            return Err(SpaceError::WrongType {
                attribute: attribute.to_string(),
                message: format!("{:?} cannot apply {} to {}", self, operand, datatype),
            });
        }
        Ok(())
    }
}
