// ── Selections ──
//
// A selection is a node bound to the path it was reached by, plus the
// caller's context. All user-facing tree operations start here.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::edit::copy_into;
use crate::error::NodeError;
use crate::json::JsonNode;
use crate::meta::{Definition, Kind};
use crate::node::{
    ActionRequest, ChildRequest, EditRequest, FieldRequest, ListRequest, NodeRef, NotifyRequest,
    Subscription,
};
use crate::path::{Path, parse_segments};
use crate::secure::{Guard, Role};

/// Caller-supplied context carried alongside every selection.
#[derive(Debug, Clone, Default)]
pub struct Context {
    role: Option<Arc<Role>>,
}

impl Context {
    pub fn role(&self) -> Option<&Arc<Role>> {
        self.role.as_ref()
    }

    pub fn with_role(&self, role: Arc<Role>) -> Self {
        Self { role: Some(role) }
    }
}

#[derive(Clone)]
pub struct Selection {
    path: Arc<Path>,
    node: NodeRef,
    context: Context,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("path", &self.path.schema_path())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Selection {
    pub fn new(path: Arc<Path>, node: NodeRef) -> Self {
        Self {
            path,
            node,
            context: Context::default(),
        }
    }

    pub fn path(&self) -> &Arc<Path> {
        &self.path
    }

    pub fn meta(&self) -> &Arc<Definition> {
        self.path.meta()
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// A selection on another node that keeps this one's context.
    pub fn derive(&self, path: Arc<Path>, node: NodeRef) -> Self {
        Self {
            path,
            node,
            context: self.context.clone(),
        }
    }

    /// Put this selection under access control for `role`. Every operation
    /// through the returned selection, and through anything reached from it,
    /// is checked against the role's grants.
    pub fn with_role(&self, role: impl Into<Arc<Role>>) -> Self {
        Self {
            path: Arc::clone(&self.path),
            node: Guard::wrap(Arc::clone(&self.node)),
            context: self.context.with_role(role.into()),
        }
    }

    fn definition(&self, ident: &str, expect: &[Kind]) -> Result<Arc<Definition>, NodeError> {
        let meta = self.meta();
        let def = meta.find(ident).ok_or_else(|| NodeError::InvalidPath {
            path: child_display(&self.path, ident),
            reason: format!("'{ident}' is not defined under '{}'", meta.ident),
        })?;
        if expect.contains(&def.kind) {
            Ok(Arc::clone(def))
        } else {
            Err(NodeError::InvalidPath {
                path: child_display(&self.path, ident),
                reason: format!("'{ident}' cannot be used here ({:?})", def.kind),
            })
        }
    }

    fn child_selection(&self, meta: &Arc<Definition>, node: NodeRef) -> Self {
        self.derive(self.path.child(meta), node)
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// Navigate to a container, list or list entry below this selection.
    ///
    /// Each step is asked whether it exists rather than for its data, with
    /// the final destination attached so remote nodes can skip fetching.
    /// `Ok(None)` means some step along the way does not exist.
    pub async fn find(&self, rel: &str) -> Result<Option<Selection>, NodeError> {
        let target = self.path.resolve(rel)?;
        let mut sel = self.clone();
        for seg in parse_segments(rel)? {
            let meta = sel.definition(&seg.ident, &[Kind::Container, Kind::List])?;
            let mut r = ChildRequest::new(&sel, &meta);
            r.target = Some(Arc::clone(&target));
            let Some(node) = sel.node.child(r).await? else {
                debug!(path = %sel.path.child(&meta), "navigation stopped");
                return Ok(None);
            };
            sel = sel.child_selection(&meta, node);
            if let Some(key) = seg.key {
                let mut r = ListRequest::by_key(&sel, key.clone());
                r.target = Some(Arc::clone(&target));
                let Some(entry) = sel.node.next(r).await? else {
                    return Ok(None);
                };
                let key = if entry.key.is_empty() { key } else { entry.key };
                sel = sel.derive(sel.path.with_key(key), entry.node);
            }
        }
        Ok(Some(sel))
    }

    // ── Leaves ───────────────────────────────────────────────────────

    pub async fn get(&self, ident: &str) -> Result<Option<Value>, NodeError> {
        let meta = self.definition(ident, &[Kind::Leaf, Kind::LeafList])?;
        self.node.read(FieldRequest::new(self, &meta)).await
    }

    /// Set one leaf, as an edit of its own.
    pub async fn set(&self, ident: &str, value: impl Into<Value>) -> Result<(), NodeError> {
        self.write_leaf(ident, Some(value.into())).await
    }

    pub async fn clear(&self, ident: &str) -> Result<(), NodeError> {
        self.write_leaf(ident, None).await
    }

    async fn write_leaf(&self, ident: &str, value: Option<Value>) -> Result<(), NodeError> {
        let meta = self.definition(ident, &[Kind::Leaf, Kind::LeafList])?;
        self.edit(EditRequest::root(self), async {
            self.node
                .write(FieldRequest::new(self, &meta), value)
                .await
        })
        .await
    }

    /// Bracket `body` with begin/end edit. A failed body aborts the edit:
    /// `end_edit` is not called and nothing is committed.
    async fn edit<F>(&self, r: EditRequest, body: F) -> Result<(), NodeError>
    where
        F: Future<Output = Result<(), NodeError>>,
    {
        self.node.begin_edit(r.clone()).await?;
        body.await?;
        self.node.end_edit(r).await
    }

    // ── Structural edits ─────────────────────────────────────────────

    /// Delete the container, list or list entry at `rel`.
    pub async fn delete(&self, rel: &str) -> Result<(), NodeError> {
        let rel = rel.trim_matches('/');
        let (parent_rel, last) = rel.rsplit_once('/').unwrap_or(("", rel));
        let parent = if parent_rel.is_empty() {
            self.clone()
        } else {
            self.find(parent_rel)
                .await?
                .ok_or_else(|| NodeError::NotFound {
                    path: self.path.resolve(parent_rel).map_or_else(
                        |_| parent_rel.to_string(),
                        |p| p.to_string(),
                    ),
                })?
        };
        let Some(seg) = parse_segments(last)?.pop() else {
            return Err(NodeError::InvalidPath {
                path: rel.into(),
                reason: "nothing to delete".into(),
            });
        };
        let meta = parent.definition(&seg.ident, &[Kind::Container, Kind::List])?;
        let mut edit = EditRequest::root(&parent);
        edit.delete = true;

        match seg.key {
            None => {
                parent
                    .edit(edit, async {
                        let mut r = ChildRequest::new(&parent, &meta);
                        r.delete = true;
                        parent.node.child(r).await.map(|_| ())
                    })
                    .await
            }
            Some(key) => {
                let target = parent.path.child(&meta).with_key(key.clone());
                let mut r = ChildRequest::new(&parent, &meta);
                r.target = Some(Arc::clone(&target));
                let list_node = parent
                    .node
                    .child(r)
                    .await?
                    .ok_or_else(|| NodeError::NotFound {
                        path: target.to_string(),
                    })?;
                let list = parent.child_selection(&meta, list_node);
                parent
                    .edit(edit, async {
                        let mut r = ListRequest::by_key(&list, key);
                        r.delete = true;
                        list.node.next(r).await.map(|_| ())
                    })
                    .await
            }
        }
    }

    /// Merge `from` into this selection: existing data is updated and
    /// missing containers and entries are created.
    pub async fn upsert_from(&self, from: &Selection) -> Result<(), NodeError> {
        self.edit(EditRequest::root(self), copy_into(from, self))
            .await
    }

    /// Like [`upsert_from`](Self::upsert_from), but opens the edit as a
    /// creation of this selection's target.
    pub async fn insert_from(&self, from: &Selection) -> Result<(), NodeError> {
        let mut r = EditRequest::root(self);
        r.new = true;
        self.edit(r, copy_into(from, self)).await
    }

    pub async fn upsert_json(&self, value: Value) -> Result<(), NodeError> {
        let from = self.json_selection(Arc::clone(&self.path), value);
        self.upsert_from(&from).await
    }

    pub async fn insert_json(&self, value: Value) -> Result<(), NodeError> {
        let from = self.json_selection(Arc::clone(&self.path), value);
        self.insert_from(&from).await
    }

    fn json_selection(&self, path: Arc<Path>, value: Value) -> Self {
        self.derive(path, Arc::new(JsonNode::new(value)))
    }

    // ── Actions and notifications ────────────────────────────────────

    /// Invoke the action `ident` declared on this selection's definition.
    /// Returns a selection over the output when the action produced one.
    pub async fn action(
        &self,
        ident: &str,
        input: Option<Value>,
    ) -> Result<Option<Selection>, NodeError> {
        let meta = self.definition(ident, &[Kind::Action])?;
        let path = self.path.child(&meta);
        let input = match (input, &meta.input) {
            (Some(value), Some(def)) => Some(self.json_selection(path.child(def), value)),
            (Some(_), None) => {
                return Err(NodeError::InvalidPath {
                    path: path.to_string(),
                    reason: format!("'{ident}' takes no input"),
                });
            }
            (None, _) => None,
        };
        let r = ActionRequest {
            selection: self.derive(Arc::clone(&path), Arc::clone(&self.node)),
            input,
        };
        let output = self.node.action(r).await?;
        Ok(output.map(|node| {
            let out_path = meta
                .output
                .as_ref()
                .map_or_else(|| Arc::clone(&path), |o| path.child(o));
            self.derive(out_path, node)
        }))
    }

    /// Subscribe to the notification `ident` declared on this selection's
    /// definition.
    pub async fn notifications(&self, ident: &str) -> Result<Subscription, NodeError> {
        let meta = self.definition(ident, &[Kind::Notification])?;
        let r = NotifyRequest {
            selection: self.child_selection(&meta, Arc::clone(&self.node)),
        };
        self.node.notify(r).await
    }

    // ── Export ───────────────────────────────────────────────────────

    /// Read everything visible under this selection into a JSON value.
    pub async fn to_json(&self) -> Result<Value, NodeError> {
        let out = if self.meta().is_list() && self.path.key().is_none() {
            JsonNode::new(Value::Array(Vec::new()))
        } else {
            JsonNode::empty()
        };
        let to = self.derive(Arc::clone(&self.path), Arc::new(out.clone()));
        copy_into(self, &to).await?;
        Ok(out.value())
    }
}

fn child_display(path: &Path, ident: &str) -> String {
    let here = path.to_string();
    if here.is_empty() {
        ident.to_string()
    } else {
        format!("{here}/{ident}")
    }
}

// ── Browser ──────────────────────────────────────────────────────────

type NodeFactory = dyn Fn() -> NodeRef + Send + Sync;

/// Entry point to one module's data. Each call to [`root`](Self::root)
/// starts from a fresh root node.
#[derive(Clone)]
pub struct Browser {
    module: Arc<Definition>,
    factory: Arc<NodeFactory>,
}

impl Browser {
    pub fn new(
        module: Arc<Definition>,
        factory: impl Fn() -> NodeRef + Send + Sync + 'static,
    ) -> Self {
        Self {
            module,
            factory: Arc::new(factory),
        }
    }

    /// A browser over a single in-memory JSON document.
    pub fn from_json(module: Arc<Definition>, value: Value) -> Self {
        let doc = JsonNode::new(value);
        Self::new(module, move || Arc::new(doc.clone()) as NodeRef)
    }

    pub fn module(&self) -> &Arc<Definition> {
        &self.module
    }

    pub fn root(&self) -> Selection {
        Selection::new(Path::root(Arc::clone(&self.module)), (self.factory)())
    }
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("module", &self.module.ident)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn module() -> Arc<Definition> {
        Definition::module(
            "m",
            vec![
                Definition::container(
                    "x",
                    vec![
                        Definition::leaf("z"),
                        Definition::container("y", vec![Definition::leaf("a")]),
                    ],
                ),
                Definition::list(
                    "pets",
                    &["name"],
                    vec![Definition::leaf("name"), Definition::leaf("age")],
                ),
                Definition::leaf("count"),
                Definition::action("reset", Some(vec![Definition::leaf("to")]), None),
            ],
        )
    }

    fn browser() -> Browser {
        Browser::from_json(
            module(),
            json!({
                "x": {"z": "hi", "y": {"a": 1}},
                "pets": [{"name": "rex", "age": 3}],
                "count": 2
            }),
        )
    }

    #[tokio::test]
    async fn find_and_read() {
        let root = browser().root();
        let y = root.find("x/y").await.unwrap().unwrap();
        assert_eq!(y.path().to_string(), "x/y");
        assert_eq!(y.get("a").await.unwrap(), Some(json!(1)));

        let rex = root.find("pets=rex").await.unwrap().unwrap();
        assert_eq!(rex.path().to_string(), "pets=rex");
        assert_eq!(rex.get("age").await.unwrap(), Some(json!(3)));

        assert!(root.find("pets=fido").await.unwrap().is_none());
        assert!(root.find("x/nope").await.is_err());
    }

    #[tokio::test]
    async fn set_clear_and_delete() {
        let root = browser().root();
        root.set("count", 5).await.unwrap();
        assert_eq!(root.get("count").await.unwrap(), Some(json!(5)));
        root.clear("count").await.unwrap();
        assert_eq!(root.get("count").await.unwrap(), None);

        root.delete("pets=rex").await.unwrap();
        root.delete("x/y").await.unwrap();
        assert_eq!(
            root.to_json().await.unwrap(),
            json!({"x": {"z": "hi"}, "pets": []})
        );
    }

    #[tokio::test]
    async fn upsert_creates_missing_structure() {
        let root = Browser::from_json(module(), json!({})).root();
        root.upsert_json(json!({"x": {"y": {"a": 9}}, "pets": [{"name": "tom"}]}))
            .await
            .unwrap();
        assert_eq!(
            root.to_json().await.unwrap(),
            json!({"x": {"y": {"a": 9}}, "pets": [{"name": "tom"}]})
        );
    }

    #[tokio::test]
    async fn list_selection_exports_array() {
        let root = browser().root();
        let pets = root.find("pets").await.unwrap().unwrap();
        assert_eq!(
            pets.to_json().await.unwrap(),
            json!([{"name": "rex", "age": 3}])
        );
    }

    #[tokio::test]
    async fn action_on_plain_json_is_unsupported() {
        let root = browser().root();
        let err = root
            .action("reset", Some(json!({"to": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Unsupported { .. }));
        assert!(root.action("count", None).await.is_err());
    }
}
