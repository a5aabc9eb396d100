//! Upload splitting

use std::collections::BTreeMap;

use super::Payload;

/// A payload to upload, tagged by how it is split into fragments.
#[derive(Debug, Clone)]
pub enum UploadPayload<T> {
    /// Sliced by element count
    Items(Vec<T>),
    /// Split into groups of keys, in key order
    Fields(BTreeMap<String, T>),
    /// Neither array nor object; sent as one fragment, unchanged
    Single(T),
}

impl<T: Payload> UploadPayload<T> {
    /// Interprets a payload as an upload. Arrays become `Items`, objects
    /// become `Fields`, anything else is a `Single`.
    pub fn from_payload(payload: T) -> Self {
        match payload.clone().into_items() {
            Some(items) => UploadPayload::Items(items),
            None => match payload.clone().into_fields() {
                Some(fields) => UploadPayload::Fields(fields),
                None => UploadPayload::Single(payload),
            },
        }
    }

    /// Number of fragments `split` would produce for `chunk_size`.
    pub fn fragment_count(&self, chunk_size: usize) -> usize {
        let len = match self {
            UploadPayload::Items(items) => items.len(),
            UploadPayload::Fields(fields) => fields.len(),
            UploadPayload::Single(_) => 1,
        };
        len.div_ceil(chunk_size.max(1)).max(1)
    }

    /// Splits into fragments of at most `chunk_size` elements or keys.
    ///
    /// Always yields at least one fragment; an empty payload yields one empty
    /// fragment. A `chunk_size` of zero is treated as one.
    pub fn split(self, chunk_size: usize) -> Vec<T> {
        let chunk_size = chunk_size.max(1);
        match self {
            UploadPayload::Items(items) => {
                if items.is_empty() {
                    return vec![T::array(Vec::new())];
                }
                items
                    .chunks(chunk_size)
                    .map(|slice| T::array(slice.to_vec()))
                    .collect()
            }
            UploadPayload::Fields(fields) => {
                if fields.is_empty() {
                    return vec![T::object(BTreeMap::new())];
                }
                let mut fragments = Vec::new();
                let mut current = BTreeMap::new();
                for (key, value) in fields {
                    current.insert(key, value);
                    if current.len() == chunk_size {
                        fragments.push(T::object(std::mem::take(&mut current)));
                    }
                }
                if !current.is_empty() {
                    fragments.push(T::object(current));
                }
                fragments
            }
            UploadPayload::Single(payload) => vec![payload],
        }
    }
}
