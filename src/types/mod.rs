pub mod hash;
pub mod sorted_set;

use crate::error::{EmberError, EmberResult};

/// The core value type stored in the data store.
///
/// Every read site matches on the variant; a command that expects one kind
/// and finds another fails with WRONGTYPE instead of coercing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Vec<u8>),
    Integer(i64),
    Hash(hash::HashValue),
    SortedSet(sorted_set::SortedSet),
}

impl Value {
    /// Name reported by TYPE. Integers are strings to clients.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) | Value::Integer(_) => "string",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
        }
    }

    /// String-like payload in wire form, or None for collection kinds.
    pub fn as_string_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(n) => Some(n.to_string().into_bytes()),
            Value::Hash(_) | Value::SortedSet(_) => None,
        }
    }

    /// Interpret a string-like value as an integer for INCR/DECR.
    pub fn to_integer(&self) -> EmberResult<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            Value::String(s) => std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(EmberError::NotInteger),
            Value::Hash(_) | Value::SortedSet(_) => Err(EmberError::WrongType),
        }
    }
}
