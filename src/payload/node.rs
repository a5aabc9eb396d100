//! Shareable payload graph
//!
//! `Node` containers are reference counted, so the same array or object can
//! appear in several places, including inside itself. Serialization detects
//! a back-reference by keeping the addresses of the containers on the current
//! path; a container shared between siblings is not a cycle and serializes
//! normally each time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Number, Value};

use super::{CyclePolicy, Payload, SerializeError, CIRCULAR_MARKER, MAX_DEPTH};

type Shared<T> = Arc<RwLock<T>>;

/// JSON-like value whose containers may be shared or self-referencing.
#[derive(Clone)]
pub enum Node {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Shared<Vec<Node>>),
    Object(Shared<BTreeMap<String, Node>>),
}

impl Node {
    pub fn array(items: impl IntoIterator<Item = Node>) -> Self {
        Node::Array(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Node)>) -> Self {
        Node::Object(Arc::new(RwLock::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Node::String(value.into())
    }

    /// Sets a field on an object node. Returns false for non-objects.
    pub fn insert(&self, key: impl Into<String>, value: Node) -> bool {
        match self {
            Node::Object(fields) => {
                fields
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Appends to an array node. Returns false for non-arrays.
    pub fn push(&self, value: Node) -> bool {
        match self {
            Node::Array(items) => {
                items
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(value);
                true
            }
            _ => false,
        }
    }

    /// Looks up a field of an object node.
    pub fn get(&self, key: &str) -> Option<Node> {
        match self {
            Node::Object(fields) => fields
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned(),
            _ => None,
        }
    }

    /// True if both nodes are the same container.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Array(a), Node::Array(b)) => Arc::ptr_eq(a, b),
            (Node::Object(a), Node::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn container_addr(&self) -> Option<usize> {
        match self {
            Node::Array(items) => Some(Arc::as_ptr(items) as *const () as usize),
            Node::Object(fields) => Some(Arc::as_ptr(fields) as *const () as usize),
            _ => None,
        }
    }
}

// Shallow on purpose: a derived Debug would recurse forever on a cycle.
impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => write!(f, "Null"),
            Node::Bool(b) => write!(f, "Bool({b})"),
            Node::Number(n) => write!(f, "Number({n})"),
            Node::String(s) => write!(f, "String({s:?})"),
            Node::Array(items) => match items.try_read() {
                Ok(items) => write!(f, "Array(len={})", items.len()),
                Err(_) => write!(f, "Array(<locked>)"),
            },
            Node::Object(fields) => match fields.try_read() {
                Ok(fields) => write!(f, "Object(keys={:?})", fields.keys().collect::<Vec<_>>()),
                Err(_) => write!(f, "Object(<locked>)"),
            },
        }
    }
}

// == Serialization ==
struct Walker {
    policy: CyclePolicy,
    ancestors: Vec<usize>,
}

impl Walker {
    fn walk(&mut self, node: &Node, path: &str) -> Result<Value, SerializeError> {
        if let Some(addr) = node.container_addr() {
            if self.ancestors.contains(&addr) {
                return match self.policy {
                    CyclePolicy::Reject => Err(SerializeError::Cycle(path.to_string())),
                    CyclePolicy::Mark => Ok(Value::String(CIRCULAR_MARKER.to_string())),
                };
            }
            if self.ancestors.len() >= MAX_DEPTH {
                return Err(SerializeError::TooDeep(path.to_string()));
            }
        }

        match node {
            Node::Null => Ok(Value::Null),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::String(s) => Ok(Value::String(s.clone())),
            Node::Number(n) => number_to_json(*n, path),
            Node::Array(items) => {
                // Clone the children out so no lock is held while recursing
                let children = items
                    .read()
                    .map_err(|_| SerializeError::Poisoned(path.to_string()))?
                    .clone();
                self.enter(node);
                let result = children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| self.walk(child, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>();
                self.ancestors.pop();
                result.map(Value::Array)
            }
            Node::Object(fields) => {
                let children = fields
                    .read()
                    .map_err(|_| SerializeError::Poisoned(path.to_string()))?
                    .clone();
                self.enter(node);
                let result = children
                    .iter()
                    .map(|(key, child)| {
                        self.walk(child, &format!("{path}.{key}"))
                            .map(|value| (key.clone(), value))
                    })
                    .collect::<Result<serde_json::Map<_, _>, _>>();
                self.ancestors.pop();
                result.map(Value::Object)
            }
        }
    }

    fn enter(&mut self, node: &Node) {
        if let Some(addr) = node.container_addr() {
            self.ancestors.push(addr);
        }
    }
}

fn number_to_json(n: f64, path: &str) -> Result<Value, SerializeError> {
    if !n.is_finite() {
        return Err(SerializeError::NonFinite(path.to_string()));
    }
    // Whole numbers inside the exact-integer range print without a fraction
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| SerializeError::NonFinite(path.to_string()))
}

impl Payload for Node {
    fn to_json(&self, policy: CyclePolicy) -> Result<Value, SerializeError> {
        Walker {
            policy,
            ancestors: Vec::new(),
        }
        .walk(self, "$")
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::array(items.into_iter().map(Node::from_json)),
            Value::Object(fields) => {
                Node::object(fields.into_iter().map(|(k, v)| (k, Node::from_json(v))))
            }
        }
    }

    fn array(items: Vec<Self>) -> Self {
        Node::array(items)
    }

    fn object(fields: BTreeMap<String, Self>) -> Self {
        Node::object(fields)
    }

    fn into_items(self) -> Option<Vec<Self>> {
        match self {
            Node::Array(items) => Some(items.read().unwrap_or_else(PoisonError::into_inner).clone()),
            _ => None,
        }
    }

    fn into_fields(self) -> Option<BTreeMap<String, Self>> {
        match self {
            Node::Object(fields) => {
                Some(fields.read().unwrap_or_else(PoisonError::into_inner).clone())
            }
            _ => None,
        }
    }
}
