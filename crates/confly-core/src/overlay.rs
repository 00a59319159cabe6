// ── Edit buffers ──
//
// Changes made during an edit land in a private change document layered
// over a snapshot of the current data. Reads see the change first and fall
// back to the snapshot. When the edit replaces its target, a list is copied
// whole into the change document the first time it is touched, so the change
// always carries complete lists. When the edit creates, the change document
// holds only what was written.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::json::{JsonNode, merge};
use crate::meta::Kind;
use crate::node::{ChildRequest, FieldRequest, ListEntry, ListRequest, Node, NodeRef};

#[derive(Debug, Clone)]
pub struct EditBuffer {
    snapshot: JsonNode,
    changes: JsonNode,
    seed_lists: bool,
}

impl EditBuffer {
    /// Buffer over `snapshot` for an edit that replaces its target. A `Null`
    /// snapshot means the target is new.
    pub fn new(snapshot: Value) -> Self {
        Self::with_seeding(snapshot, true)
    }

    /// Buffer for an edit that creates children under its target. Existing
    /// list entries stay readable but never enter the change document.
    pub fn creating(snapshot: Value) -> Self {
        Self::with_seeding(snapshot, false)
    }

    fn with_seeding(snapshot: Value, seed_lists: bool) -> Self {
        let snapshot = if snapshot.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            snapshot
        };
        let changes = if snapshot.is_array() {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        };
        Self {
            snapshot: JsonNode::new(snapshot),
            changes: JsonNode::new(changes),
            seed_lists,
        }
    }

    /// Node that records writes into this buffer.
    pub fn node(&self) -> NodeRef {
        Arc::new(OverlayNode {
            top: self.changes.clone(),
            base: Some(self.snapshot.clone()),
            seed: self.seed_lists,
        })
    }

    /// Only what was written during the edit.
    pub fn changes(&self) -> Value {
        self.changes.value()
    }

    pub fn snapshot(&self) -> Value {
        self.snapshot.value()
    }

    /// Snapshot with the changes merged over it.
    pub fn merged(&self) -> Value {
        let mut merged = self.snapshot.value();
        merge(&mut merged, self.changes.value());
        merged
    }
}

struct OverlayNode {
    top: JsonNode,
    base: Option<JsonNode>,
    seed: bool,
}

impl OverlayNode {
    fn layer(&self, top: JsonNode, base: Option<JsonNode>) -> Self {
        Self {
            top,
            base,
            seed: self.seed,
        }
    }

    /// Put the list into the top layer unless it is already there, copying
    /// the base entries when seeding.
    fn seed_list(&self, ident: &str, base: Option<&JsonNode>) -> Option<JsonNode> {
        if self.top.get_child(ident).is_none() {
            let items = base
                .filter(|_| self.seed)
                .map_or_else(|| Value::Array(Vec::new()), JsonNode::value);
            self.top.set_field(ident, Some(items));
        }
        self.top.get_child(ident)
    }
}

#[async_trait]
impl Node for OverlayNode {
    async fn child(&self, r: ChildRequest) -> Result<Option<NodeRef>, NodeError> {
        let ident = &r.meta.ident;
        if r.delete {
            self.top.remove_child(ident);
            if let Some(base) = &self.base {
                base.remove_child(ident);
            }
            return Ok(None);
        }
        let base = self.base.as_ref().and_then(|b| b.get_child(ident));
        if !r.new && base.is_none() && self.top.get_child(ident).is_none() {
            return Ok(None);
        }
        let node = if !self.seed && !r.new && self.top.get_child(ident).is_none() {
            // Existing data read while creating: a detached copy.
            base.map(|b| self.layer(JsonNode::new(b.value()), None))
        } else if r.meta.kind == Kind::List {
            self.seed_list(ident, base.as_ref())
                .map(|top| self.layer(top, None))
        } else {
            self.top
                .ensure_child(ident, Kind::Container)
                .map(|top| self.layer(top, base))
        };
        Ok(node.map(|n| Arc::new(n) as NodeRef))
    }

    async fn next(&self, r: ListRequest) -> Result<Option<ListEntry>, NodeError> {
        // Editing a list entry from the list itself: the list is the edit
        // root and the top layer starts out empty.
        if let Some(base) = self.base.as_ref().filter(|_| self.seed) {
            if base.value().is_array() && self.top.value().as_array().is_some_and(Vec::is_empty) {
                self.top.set_value(base.value());
            }
        }
        Ok(self.top.select_entry(&r).map(|(top, key)| ListEntry {
            node: Arc::new(self.layer(top, None)),
            key,
        }))
    }

    async fn read(&self, r: FieldRequest) -> Result<Option<Value>, NodeError> {
        let ident = &r.meta.ident;
        Ok(self
            .top
            .get_field(ident)
            .or_else(|| self.base.as_ref().and_then(|b| b.get_field(ident))))
    }

    async fn write(&self, r: FieldRequest, value: Option<Value>) -> Result<(), NodeError> {
        let ident = &r.meta.ident;
        if value.is_none() {
            if let Some(base) = &self.base {
                base.set_field(ident, None);
            }
        }
        if self.top.set_field(ident, value) {
            Ok(())
        } else {
            Err(NodeError::NotFound {
                path: r.path().to_string(),
            })
        }
    }
}
