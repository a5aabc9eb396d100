//! Cache Key Module
//!
//! Derives deterministic cache keys from an endpoint and its parameters.

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use crate::payload::{CyclePolicy, Params, Payload};

// == Cache Key ==
/// A cache key, tagged with how precisely it identifies the request.
///
/// `Exact` keys embed the full parameter JSON. `Degraded` keys are used when
/// the parameters cannot be serialized (a reference cycle, a NaN) and only
/// carry the sorted parameter names, so two different parameter sets with the
/// same names share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Exact(String),
    Degraded(String),
}

impl CacheKey {
    // == Derive ==
    /// Builds `"{endpoint}:{params-json}"`, falling back to
    /// `"{endpoint}:~keys[{names}]"`.
    pub fn derive<T: Payload>(endpoint: &str, params: &Params<T>) -> Self {
        let serialized = params
            .iter()
            .map(|(name, value)| {
                value
                    .to_json(CyclePolicy::Reject)
                    .map(|json| (name.clone(), json))
            })
            .collect::<Result<Map<String, Value>, _>>();

        match serialized {
            Ok(map) => CacheKey::Exact(format!("{endpoint}:{}", Value::Object(map))),
            Err(err) => {
                warn!(endpoint, error = %err, "params not serializable, using degraded cache key");
                let names: Vec<&str> = params.keys().map(String::as_str).collect();
                CacheKey::Degraded(format!("{endpoint}:~keys[{}]", names.join(",")))
            }
        }
    }

    /// Prefix shared by every key derived for `endpoint`.
    pub fn endpoint_prefix(endpoint: &str) -> String {
        format!("{endpoint}:")
    }

    pub fn as_str(&self) -> &str {
        match self {
            CacheKey::Exact(key) | CacheKey::Degraded(key) => key,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CacheKey::Degraded(_))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
