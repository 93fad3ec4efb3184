//! The configuration layer stack.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use super::{
    ConfigError, Result,
    path::{Path, as_index},
    value::{Thunk, Value},
};

#[derive(Default)]
struct Resolution {
    /// Resolved results keyed by producer identity.
    cache: HashMap<u64, Value>,
    /// Paths whose deferred value is being evaluated right now.
    eval_stack: Vec<String>,
}

/// A stack of configuration layers.
///
/// Layer 0 is the empty table and can never be removed. Each [`push`] takes a
/// fresh table and deep-merges it onto the current top; the merged result is
/// pushed, the original layers stay untouched. [`pop`] therefore restores the
/// exact observable state from before the matching push.
///
/// Deep merge: where both sides hold a table the merge recurses; everything
/// else (scalars, lists, deferred values) replaces wholesale, and an
/// [`Value::Erased`] tombstone erases the key it lands on.
///
/// [`push`]: ConfigStack::push
/// [`pop`]: ConfigStack::pop
pub struct ConfigStack {
    layers: Vec<Value>,
    resolution: RefCell<Resolution>,
}

impl Default for ConfigStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStack {
    /// Creates a stack holding only the empty layer 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: vec![Value::Table(BTreeMap::new())],
            resolution: RefCell::new(Resolution::default()),
        }
    }

    /// The number of layers, including layer 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// The current top layer, unresolved.
    #[must_use]
    pub fn top(&self) -> &Value {
        self.layers.last().expect("layer 0 always present")
    }

    /// Deep-merges `layer` onto the top and pushes the result.
    ///
    /// Returns the new depth.
    ///
    /// # Errors
    ///
    /// [`ConfigError::LayerNotTable`] when `layer` is not a table; the stack
    /// is left unchanged.
    pub fn push(&mut self, layer: Value) -> Result<usize> {
        if !matches!(layer, Value::Table(_)) {
            return Err(ConfigError::LayerNotTable {
                found: layer.type_name().into(),
            });
        }
        let merged = deep_merge(self.top(), &layer);
        self.layers.push(merged);
        self.invalidate();
        Ok(self.depth())
    }

    /// Removes the top layer. Layer 0 stays; popping it is a no-op.
    ///
    /// Returns the new depth.
    pub fn pop(&mut self) -> usize {
        if self.layers.len() > 1 {
            self.layers.pop();
            self.invalidate();
        }
        self.depth()
    }

    /// Pops layers until the depth is at most `depth` (but never below 1).
    ///
    /// Returns the new depth.
    pub fn reset_to(&mut self, depth: usize) -> usize {
        let target = depth.max(1);
        if target < self.layers.len() {
            self.layers.truncate(target);
            self.invalidate();
        }
        self.depth()
    }

    /// Reads the resolved value at `dotted` in the top layer.
    ///
    /// Deferred values along the path and inside the result are evaluated
    /// and cached by producer identity; tombstones read as `None`. The empty
    /// path returns the whole resolved top layer.
    ///
    /// # Errors
    ///
    /// [`ConfigError::CircularDependency`] when deferred values form a
    /// reference cycle, naming the full chain.
    pub fn get(&self, dotted: &str) -> Result<Option<Value>> {
        let path = Path::parse(dotted);
        let mut prefix = Path::root();
        let mut node = self.top().clone();
        for segment in path.segments() {
            if let Value::Lazy(thunk) = &node {
                node = self.resolve_thunk(&prefix, thunk)?;
            }
            prefix = prefix.child(segment);
            let next = match &node {
                Value::Table(entries) => entries.get(segment.as_str()).cloned(),
                Value::List(items) => as_index(segment).and_then(|i| items.get(i).cloned()),
                _ => None,
            };
            let Some(next) = next else {
                return Ok(None);
            };
            node = next;
        }
        let resolved = self.resolve_value(&prefix, node)?;
        Ok(match resolved {
            Value::Erased => None,
            other => Some(other),
        })
    }

    /// Reads the value at `dotted` without evaluating deferred values.
    ///
    /// A deferred value along the path makes the target unreachable and
    /// reads as `None`; a deferred value *at* the path is returned as-is.
    #[must_use]
    pub fn get_raw(&self, dotted: &str) -> Option<Value> {
        let path = Path::parse(dotted);
        let mut node = self.top();
        for segment in path.segments() {
            node = match node {
                Value::Table(entries) => entries.get(segment.as_str())?,
                Value::List(items) => items.get(as_index(segment)?)?,
                _ => return None,
            };
        }
        match node {
            Value::Erased => None,
            other => Some(other.clone()),
        }
    }

    /// Writes `value` at `dotted` into the top layer, creating intermediate
    /// containers as needed.
    ///
    /// A numeric segment addresses an existing list (appending at its end is
    /// allowed) and creates a list when the node does not exist yet;
    /// otherwise it is an ordinary table key. Invalidates resolution caches.
    ///
    /// # Errors
    ///
    /// [`ConfigError::IndexOutOfRange`] when a numeric segment skips past the
    /// end of an existing list; [`ConfigError::LayerNotTable`] when the root
    /// path is assigned a non-table.
    pub fn set(&mut self, dotted: &str, value: Value) -> Result<()> {
        self.invalidate();
        let path = Path::parse(dotted);
        if path.is_root() {
            if !matches!(value, Value::Table(_)) {
                return Err(ConfigError::LayerNotTable {
                    found: value.type_name().into(),
                });
            }
            *self.layers.last_mut().expect("layer 0 always present") = value;
            return Ok(());
        }
        let top = self.layers.last_mut().expect("layer 0 always present");
        set_in(top, &Path::root(), path.segments(), value)
    }

    /// Erases the value at `dotted` in the top layer.
    ///
    /// Equivalent to `set(dotted, Value::Erased)`: the tombstone survives
    /// merges and makes the key read as missing.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ConfigStack::set`].
    pub fn delete(&mut self, dotted: &str) -> Result<()> {
        self.set(dotted, Value::Erased)
    }

    /// Every dotted path to a table entry of the top layer, pre-order.
    ///
    /// Non-leaf tables are listed before their children; tombstoned entries
    /// are skipped; lists count as leaves.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        fn walk(prefix: &Path, node: &Value, out: &mut Vec<String>) {
            if let Value::Table(entries) = node {
                for (key, child) in entries {
                    if matches!(child, Value::Erased) {
                        continue;
                    }
                    let path = prefix.child(key);
                    out.push(path.to_string());
                    walk(&path, child, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&Path::root(), self.top(), &mut out);
        out
    }

    fn invalidate(&mut self) {
        let mut resolution = self.resolution.borrow_mut();
        resolution.cache.clear();
        resolution.eval_stack.clear();
    }

    /// Recursively replaces deferred values inside `value`, dropping
    /// tombstoned table entries. Container structure is preserved.
    fn resolve_value(&self, at: &Path, value: Value) -> Result<Value> {
        match value {
            Value::Lazy(thunk) => {
                let produced = self.resolve_thunk(at, &thunk)?;
                self.resolve_value(at, produced)
            }
            Value::Table(entries) => {
                let mut resolved = BTreeMap::new();
                for (key, child) in entries {
                    if matches!(child, Value::Erased) {
                        continue;
                    }
                    resolved.insert(key.clone(), self.resolve_value(&at.child(&key), child)?);
                }
                Ok(Value::Table(resolved))
            }
            Value::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    resolved.push(self.resolve_value(&at.child(&index.to_string()), item)?);
                }
                Ok(Value::List(resolved))
            }
            other => Ok(other),
        }
    }

    fn resolve_thunk(&self, at: &Path, thunk: &Thunk) -> Result<Value> {
        let dotted = at.to_string();
        {
            let resolution = self.resolution.borrow();
            if let Some(hit) = resolution.cache.get(&thunk.id()) {
                return Ok(hit.clone());
            }
            if let Some(start) = resolution.eval_stack.iter().position(|p| *p == dotted) {
                let mut chain = resolution.eval_stack[start..].to_vec();
                chain.push(dotted);
                return Err(ConfigError::CircularDependency { chain });
            }
        }
        self.resolution.borrow_mut().eval_stack.push(dotted);
        let produced = thunk.call(self);
        let mut resolution = self.resolution.borrow_mut();
        resolution.eval_stack.pop();
        let value = produced?;
        resolution.cache.insert(thunk.id(), value.clone());
        Ok(value)
    }
}

/// Non-destructive deep merge of `incoming` over `base`.
pub(crate) fn deep_merge(base: &Value, incoming: &Value) -> Value {
    match (base, incoming) {
        (Value::Table(base_entries), Value::Table(incoming_entries)) => {
            let mut merged = base_entries.clone();
            for (key, incoming_child) in incoming_entries {
                let entry = match base_entries.get(key) {
                    Some(base_child) => deep_merge(base_child, incoming_child),
                    None => incoming_child.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Table(merged)
        }
        (_, replacement) => replacement.clone(),
    }
}

fn set_in(node: &mut Value, at: &Path, segments: &[String], value: Value) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };
    // A scalar, tombstone, or deferred node on the way gets replaced by a
    // fresh container matching the segment shape.
    if !matches!(node, Value::Table(_) | Value::List(_)) {
        *node = if as_index(segment).is_some() {
            Value::List(Vec::new())
        } else {
            Value::Table(BTreeMap::new())
        };
    }
    let here = at.child(segment);
    match node {
        Value::List(items) => {
            let Some(index) = as_index(segment) else {
                // Non-numeric key on a list: the list makes way for a table.
                *node = Value::Table(BTreeMap::new());
                return set_in(node, at, segments, value);
            };
            if index > items.len() {
                return Err(ConfigError::IndexOutOfRange {
                    path: at.to_string(),
                    index,
                    len: items.len(),
                });
            }
            if index == items.len() {
                items.push(Value::Erased);
            }
            set_in(&mut items[index], &here, rest, value)
        }
        Value::Table(entries) => set_in(
            entries.entry(segment.clone()).or_insert(Value::Erased),
            &here,
            rest,
            value,
        ),
        _ => unreachable!("node was just normalized to a container"),
    }
}
