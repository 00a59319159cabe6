// ── JSON-backed nodes ──
//
// An in-memory tree over one shared `serde_json::Value` document. Decoded
// responses, action input/output, event payloads and edit buffers all live
// in one of these.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::NodeError;
use crate::meta::{Definition, Kind, strip_prefix};
use crate::node::{ChildRequest, FieldRequest, ListEntry, ListRequest, Node, NodeRef};
use crate::path::value_text;

#[derive(Debug, Clone)]
enum Step {
    Key(String),
    Index(usize),
}

/// A position inside a shared JSON document.
///
/// Clones share the document, so a child handed out by [`Node::child`] writes
/// through to the same value its parent sees.
#[derive(Debug, Clone)]
pub struct JsonNode {
    doc: Arc<Mutex<Value>>,
    at: Vec<Step>,
}

impl JsonNode {
    pub fn new(value: Value) -> Self {
        Self {
            doc: Arc::new(Mutex::new(value)),
            at: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// Copy of the value at this position (`Null` when absent).
    pub fn value(&self) -> Value {
        self.with(|v| v.cloned().unwrap_or(Value::Null))
    }

    /// Replace the value at this position.
    pub fn set_value(&self, value: Value) -> bool {
        self.with_mut(|v| *v = value).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let doc = self.lock();
        f(locate(&doc, &self.at))
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut doc = self.lock();
        locate_mut(&mut doc, &self.at).map(f)
    }

    fn step(&self, step: Step) -> Self {
        let mut at = self.at.clone();
        at.push(step);
        Self {
            doc: Arc::clone(&self.doc),
            at,
        }
    }

    // ── Containers ───────────────────────────────────────────────────

    /// Existing container or list member named `ident`.
    pub fn get_child(&self, ident: &str) -> Option<JsonNode> {
        let present = self.with(|v| {
            v.and_then(|v| v.get(ident))
                .is_some_and(|c| c.is_object() || c.is_array())
        });
        present.then(|| self.step(Step::Key(ident.into())))
    }

    /// Get or create `ident`: an object for containers, an array for lists.
    pub fn ensure_child(&self, ident: &str, kind: Kind) -> Option<JsonNode> {
        let created = self.with_mut(|v| {
            let Value::Object(obj) = v else {
                return false;
            };
            let entry = obj.entry(ident).or_insert_with(|| match kind {
                Kind::List => Value::Array(Vec::new()),
                _ => Value::Object(Map::new()),
            });
            entry.is_object() || entry.is_array()
        });
        created
            .unwrap_or(false)
            .then(|| self.step(Step::Key(ident.into())))
    }

    pub fn remove_child(&self, ident: &str) {
        self.with_mut(|v| {
            if let Value::Object(obj) = v {
                obj.remove(ident);
            }
        });
    }

    // ── Leaves ───────────────────────────────────────────────────────

    pub fn get_field(&self, ident: &str) -> Option<Value> {
        self.with(|v| v.and_then(|v| v.get(ident)).cloned())
    }

    /// Set or (with `None`) remove a leaf. Returns `false` if this position
    /// does not hold an object.
    pub fn set_field(&self, ident: &str, value: Option<Value>) -> bool {
        self.with_mut(|v| {
            let Value::Object(obj) = v else {
                return false;
            };
            match value {
                Some(value) => {
                    obj.insert(ident.into(), value);
                }
                None => {
                    obj.remove(ident);
                }
            }
            true
        })
        .unwrap_or(false)
    }

    // ── Lists ────────────────────────────────────────────────────────

    /// The array holding `list`'s entries: this position itself, or a member
    /// named after the list when a response wrapped it in an object.
    fn entries(&self, list: &Definition) -> Option<JsonNode> {
        self.with(|v| match v {
            Some(Value::Array(_)) => Some(self.clone()),
            Some(Value::Object(obj)) if obj.get(&list.ident).is_some_and(Value::is_array) => {
                Some(self.step(Step::Key(list.ident.clone())))
            }
            _ => None,
        })
    }

    fn find_entry(&self, list: &Definition, key: &[Value]) -> Option<(JsonNode, Vec<Value>)> {
        let index = self.with(|v| {
            v.and_then(Value::as_array)?
                .iter()
                .position(|e| key_matches(&entry_key(list, e), key))
        })?;
        self.entry_at(list, index)
    }

    fn entry_at(&self, list: &Definition, row: usize) -> Option<(JsonNode, Vec<Value>)> {
        let key = self.with(|v| v.and_then(|v| v.get(row)).map(|e| entry_key(list, e)))?;
        Some((self.step(Step::Index(row)), key))
    }

    fn insert_entry(&self, list: &Definition, key: &[Value]) -> Option<(JsonNode, Vec<Value>)> {
        let index = self.with_mut(|v| {
            let Value::Array(items) = v else {
                return None;
            };
            let entry: Map<String, Value> = list
                .keys
                .iter()
                .cloned()
                .zip(key.iter().cloned())
                .collect();
            items.push(Value::Object(entry));
            Some(items.len() - 1)
        })??;
        Some((self.step(Step::Index(index)), key.to_vec()))
    }

    fn remove_entry(&self, list: &Definition, key: &[Value]) {
        self.with_mut(|v| {
            if let Value::Array(items) = v {
                items.retain(|e| !key_matches(&entry_key(list, e), key));
            }
        });
    }

    /// Resolve a list request against this position without type erasure.
    pub(crate) fn select_entry(&self, r: &ListRequest) -> Option<(JsonNode, Vec<Value>)> {
        let list = r.meta();
        let items = self.entries(list)?;
        match &r.key {
            Some(key) if r.delete => {
                items.remove_entry(list, key);
                None
            }
            Some(key) if r.new => items
                .find_entry(list, key)
                .or_else(|| items.insert_entry(list, key)),
            Some(key) => items.find_entry(list, key),
            None => items.entry_at(list, r.row),
        }
    }
}

#[async_trait]
impl Node for JsonNode {
    async fn child(&self, r: ChildRequest) -> Result<Option<NodeRef>, NodeError> {
        let ident = &r.meta.ident;
        if r.delete {
            self.remove_child(ident);
            return Ok(None);
        }
        let child = if r.new {
            self.ensure_child(ident, r.meta.kind)
        } else {
            self.get_child(ident)
        };
        Ok(child.map(|c| Arc::new(c) as NodeRef))
    }

    async fn next(&self, r: ListRequest) -> Result<Option<ListEntry>, NodeError> {
        Ok(self.select_entry(&r).map(|(node, key)| ListEntry {
            node: Arc::new(node),
            key,
        }))
    }

    async fn read(&self, r: FieldRequest) -> Result<Option<Value>, NodeError> {
        Ok(self.get_field(&r.meta.ident))
    }

    async fn write(&self, r: FieldRequest, value: Option<Value>) -> Result<(), NodeError> {
        if self.set_field(&r.meta.ident, value) {
            Ok(())
        } else {
            Err(NodeError::NotFound {
                path: r.selection.path().to_string(),
            })
        }
    }
}

// ── Document helpers ─────────────────────────────────────────────────

fn locate<'a>(root: &'a Value, at: &[Step]) -> Option<&'a Value> {
    at.iter().try_fold(root, |v, step| match step {
        Step::Key(k) => v.get(k.as_str()),
        Step::Index(i) => v.get(*i),
    })
}

fn locate_mut<'a>(root: &'a mut Value, at: &[Step]) -> Option<&'a mut Value> {
    at.iter().try_fold(root, |v, step| match step {
        Step::Key(k) => v.get_mut(k.as_str()),
        Step::Index(i) => v.get_mut(*i),
    })
}

fn entry_key(list: &Definition, entry: &Value) -> Vec<Value> {
    list.keys
        .iter()
        .map(|k| entry.get(k).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Keys compare by text so `"7"` from a URL matches `7` from a payload.
fn key_matches(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| value_text(a) == value_text(b))
}

/// Prefix top-level member names with `module:`, as standard RESTCONF JSON
/// encoding requires. Names that are already qualified are left alone.
pub fn qualify(module: &str, value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| {
                    if k.contains(':') {
                        (k, v)
                    } else {
                        (format!("{module}:{k}"), v)
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

/// Strip any `module:` prefix from top-level member names.
pub fn unqualify(value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| (strip_prefix(&k).to_string(), v))
                .collect(),
        ),
        other => other,
    }
}

/// Deep-merge `overlay` onto `base`. Objects merge member by member; any
/// other value in the overlay replaces what the base had.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (k, v) in overlay {
                match base.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
