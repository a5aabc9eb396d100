//! Chunk merging
//!
//! Combines per-chunk payloads into one result, in chunk order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Payload;
use crate::error::{Result, ServiceError};

/// How chunk payloads are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergeStrategy {
    /// Every chunk is an array; results are concatenated
    #[default]
    #[serde(rename = "concat")]
    Concat,
    /// Every chunk is an object; later chunks overwrite earlier keys
    #[serde(rename = "merge")]
    ShallowMerge,
}

/// Merges `chunks` (already in chunk-index order) using `strategy`.
///
/// A single chunk is returned untouched, whatever its shape.
pub fn merge_chunks<T: Payload>(mut chunks: Vec<T>, strategy: MergeStrategy) -> Result<T> {
    if chunks.len() == 1 {
        if let Some(only) = chunks.pop() {
            return Ok(only);
        }
    }

    match strategy {
        MergeStrategy::Concat => {
            let mut merged = Vec::new();
            for (index, chunk) in chunks.into_iter().enumerate() {
                let items = chunk.into_items().ok_or_else(|| {
                    ServiceError::Merge(format!("chunk {index} is not an array"))
                })?;
                merged.extend(items);
            }
            Ok(T::array(merged))
        }
        MergeStrategy::ShallowMerge => {
            let mut merged = BTreeMap::new();
            for (index, chunk) in chunks.into_iter().enumerate() {
                let fields = chunk.into_fields().ok_or_else(|| {
                    ServiceError::Merge(format!("chunk {index} is not an object"))
                })?;
                merged.extend(fields);
            }
            Ok(T::object(merged))
        }
    }
}
