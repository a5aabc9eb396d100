//! Payload Module
//!
//! Abstracts over the data that flows through fetches and uploads. Anything
//! implementing [`Payload`] can be chunked, merged, split and persisted to the
//! cache. Two implementations ship with the crate:
//!
//! - `serde_json::Value` for plain (always acyclic) JSON
//! - [`Node`], a shareable graph that may contain reference cycles
//!
//! Serialization to JSON takes a [`CyclePolicy`]: `Reject` is used for cache
//! keys (a cycle degrades the key), `Mark` for cache persistence (cycles are
//! replaced by [`CIRCULAR_MARKER`]).

mod merge;
mod node;
mod split;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

pub use merge::{merge_chunks, MergeStrategy};
pub use node::Node;
pub use split::UploadPayload;

// == Public Constants ==
/// Sentinel written in place of a back-reference when persisting a cyclic value
pub const CIRCULAR_MARKER: &str = "[Circular]";

/// Nesting limit for serialization
pub const MAX_DEPTH: usize = 256;

/// Request parameters, keyed by name.
pub type Params<T> = BTreeMap<String, T>;

// == Cycle Policy ==
/// What to do when serialization meets a reference back to an ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Fail with [`SerializeError::Cycle`]
    Reject,
    /// Substitute [`CIRCULAR_MARKER`]
    Mark,
}

// == Serialize Error ==
/// Failure to turn a payload into JSON. The path uses `$.field[index]` notation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializeError {
    #[error("circular reference at {0}")]
    Cycle(String),

    #[error("non-finite number at {0}")]
    NonFinite(String),

    #[error("nesting too deep at {0}")]
    TooDeep(String),

    #[error("poisoned lock at {0}")]
    Poisoned(String),
}

// == Payload Trait ==
/// Data that can travel through the chunked fetch and upload paths.
pub trait Payload: Clone + Send + Sync + 'static {
    /// Serializes to JSON, handling cycles per `policy`.
    fn to_json(&self, policy: CyclePolicy) -> Result<Value, SerializeError>;

    /// Rebuilds a payload from (cached or wire) JSON.
    fn from_json(value: Value) -> Self;

    /// Builds an array payload.
    fn array(items: Vec<Self>) -> Self;

    /// Builds an object payload.
    fn object(fields: BTreeMap<String, Self>) -> Self;

    /// Returns the elements if this payload is an array.
    fn into_items(self) -> Option<Vec<Self>>;

    /// Returns the fields if this payload is an object.
    fn into_fields(self) -> Option<BTreeMap<String, Self>>;
}

impl Payload for Value {
    fn to_json(&self, _policy: CyclePolicy) -> Result<Value, SerializeError> {
        Ok(self.clone())
    }

    fn from_json(value: Value) -> Self {
        value
    }

    fn array(items: Vec<Self>) -> Self {
        Value::Array(items)
    }

    fn object(fields: BTreeMap<String, Self>) -> Self {
        Value::Object(fields.into_iter().collect())
    }

    fn into_items(self) -> Option<Vec<Self>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    fn into_fields(self) -> Option<BTreeMap<String, Self>> {
        match self {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }
}
