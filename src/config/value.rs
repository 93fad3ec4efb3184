//! The configuration tree value model.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::stack::ConfigStack;

/// The producer function of a deferred value.
///
/// It receives the stack it lives in, so it can read other settings through
/// the ordinary resolution machinery (which is what makes cycle detection
/// possible).
pub type ThunkFn = dyn Fn(&ConfigStack) -> super::Result<Value>;

static NEXT_THUNK_ID: AtomicU64 = AtomicU64::new(1);

/// A deferred configuration value: a zero-argument producer evaluated on
/// demand.
///
/// Thunks compare equal by identity, never by behavior; the identity also
/// keys the resolution cache.
#[derive(Clone)]
pub struct Thunk {
    id: u64,
    producer: Rc<ThunkFn>,
}

impl Thunk {
    /// Wraps a producer function into a deferred value.
    pub fn new(producer: impl Fn(&ConfigStack) -> super::Result<Value> + 'static) -> Self {
        Self {
            id: NEXT_THUNK_ID.fetch_add(1, Ordering::Relaxed),
            producer: Rc::new(producer),
        }
    }

    /// Returns the identity of this producer.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Invokes the producer against `stack`.
    ///
    /// # Errors
    ///
    /// Propagates whatever the producer reports, usually a
    /// [`super::ConfigError::CircularDependency`] from a nested `get`.
    pub fn call(&self, stack: &ConfigStack) -> super::Result<Value> {
        (self.producer)(stack)
    }
}

impl std::fmt::Debug for Thunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Thunk").field(&self.id).finish()
    }
}

impl PartialEq for Thunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// A value in the configuration tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// A boolean scalar.
    Bool(bool),
    /// An integer scalar.
    Int(i64),
    /// A floating point scalar.
    Float(f64),
    /// A string scalar.
    Str(String),
    /// An ordered sequence. Sequences merge wholesale, never element-wise.
    List(Vec<Value>),
    /// A string-keyed mapping. Tables are the only values merged recursively.
    Table(BTreeMap<String, Value>),
    /// A deferred value, evaluated on demand. Merges wholesale.
    Lazy(Thunk),
    /// A tombstone: merging it over an existing key erases that key.
    #[default]
    Erased,
}

impl Value {
    /// Builds a [`Value::Table`] from key/value pairs.
    pub fn table<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Table(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// Builds a [`Value::List`] from values.
    pub fn list(entries: impl IntoIterator<Item = Value>) -> Self {
        Self::List(entries.into_iter().collect())
    }

    /// Wraps a producer into a [`Value::Lazy`].
    pub fn lazy(producer: impl Fn(&ConfigStack) -> super::Result<Value> + 'static) -> Self {
        Self::Lazy(Thunk::new(producer))
    }

    /// The type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Table(_) => "table",
            Self::Lazy(_) => "deferred",
            Self::Erased => "erased",
        }
    }

    /// Returns the boolean if this is a [`Value::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`Value::Int`].
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns a float for either numeric variant.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string slice if this is a [`Value::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is a [`Value::List`].
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the mapping if this is a [`Value::Table`].
    #[must_use]
    pub const fn as_table(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Table(entries) => Some(entries),
            _ => None,
        }
    }

    /// Navigates a dotted path inside an already resolved tree.
    ///
    /// Deferred values are not evaluated here; resolve through
    /// [`super::ConfigStack::get`] first.
    #[must_use]
    pub fn at(&self, dotted: &str) -> Option<&Value> {
        let mut node = self;
        for segment in super::path::Path::parse(dotted).segments() {
            node = match node {
                Self::Table(entries) => entries.get(segment.as_str())?,
                Self::List(items) => items.get(super::path::as_index(segment)?)?,
                _ => return None,
            };
        }
        match node {
            Self::Erased => None,
            other => Some(other),
        }
    }

    /// Reads a pair of numbers out of a two-element list, the shape every
    /// `pos`/`size` setting uses.
    #[must_use]
    pub fn as_pair(&self) -> Option<(f64, f64)> {
        let items = self.as_list()?;
        match items {
            [a, b] => Some((a.as_f64()?, b.as_f64()?)),
            _ => None,
        }
    }

    /// Converts a `serde_json` tree into a configuration tree.
    ///
    /// JSON `null` maps to [`Value::Erased`], which makes `{"key": null}` in
    /// a pushed layer erase `key`, the erase convention of the merge.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Erased,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Table(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts a resolved tree back into `serde_json`.
    ///
    /// Deferred values must be resolved before serialization; an unresolved
    /// producer and a tombstone both become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Table(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .filter(|(_, v)| !matches!(v, Self::Erased))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Lazy(_) | Self::Erased => serde_json::Value::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_of_scalars() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": 2.5, "c": "x", "d": [true, null]}"#)
                .expect("valid json");
        let value = Value::from_json(&json);
        assert_eq!(
            value,
            Value::table([
                ("a", Value::Int(1)),
                ("b", Value::Float(2.5)),
                ("c", Value::from("x")),
                ("d", Value::list([Value::Bool(true), Value::Erased])),
            ])
        );
    }

    #[test]
    fn thunks_compare_by_identity() {
        let a = Thunk::new(|_| Ok(Value::Int(1)));
        let b = Thunk::new(|_| Ok(Value::Int(1)));
        assert_ne!(Value::Lazy(a.clone()), Value::Lazy(b));
        assert_eq!(Value::Lazy(a.clone()), Value::Lazy(a));
    }
}
