use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::Permission;
use crate::error::NodeError;
use crate::node::{
    ActionRequest, ChildRequest, EditRequest, FieldRequest, ListEntry, ListRequest, Node, NodeRef,
    NotifyRequest, Subscription,
};
use crate::path::Path;
use crate::selection::Selection;

/// Middleware that checks every operation against the role carried in the
/// selection's context.
///
/// Reads below [`Permission::Read`] are hidden: the data looks absent.
/// Writes, deletes and actions below [`Permission::Write`] fail with
/// [`NodeError::Unauthorized`]; an edit is refused before it starts when
/// nothing at or below its root is writable. Subscriptions below `Read` yield a single
/// unauthorized event. Without a role in context every call passes through.
pub struct Guard {
    inner: NodeRef,
}

impl Guard {
    pub fn wrap(inner: NodeRef) -> NodeRef {
        Arc::new(Self { inner })
    }
}

fn permission(selection: &Selection, path: &Path) -> Option<Permission> {
    selection.context().role().map(|role| role.resolve(path))
}

#[async_trait]
impl Node for Guard {
    async fn child(&self, r: ChildRequest) -> Result<Option<NodeRef>, NodeError> {
        let path = r.path();
        if let Some(granted) = permission(&r.selection, &path) {
            if r.new || r.delete {
                if granted < Permission::Write {
                    let op = if r.delete { "delete" } else { "create" };
                    return Err(NodeError::unauthorized(op, path.schema_path()));
                }
            } else if granted < Permission::Read {
                debug!(path = %path.schema_path(), "hidden by access control");
                return Ok(None);
            }
        }
        Ok(self.inner.child(r).await?.map(Guard::wrap))
    }

    async fn next(&self, r: ListRequest) -> Result<Option<ListEntry>, NodeError> {
        let path = r.path();
        if let Some(granted) = permission(&r.selection, &path) {
            if r.new || r.delete {
                if granted < Permission::Write {
                    let op = if r.delete { "delete" } else { "create" };
                    return Err(NodeError::unauthorized(op, path.schema_path()));
                }
            } else if granted < Permission::Read {
                return Ok(None);
            }
        }
        Ok(self.inner.next(r).await?.map(|entry| ListEntry {
            node: Guard::wrap(entry.node),
            key: entry.key,
        }))
    }

    async fn read(&self, r: FieldRequest) -> Result<Option<Value>, NodeError> {
        if permission(&r.selection, &r.path()).is_some_and(|p| p < Permission::Read) {
            return Ok(None);
        }
        self.inner.read(r).await
    }

    async fn write(&self, r: FieldRequest, value: Option<Value>) -> Result<(), NodeError> {
        let path = r.path();
        if permission(&r.selection, &path).is_some_and(|p| p < Permission::Write) {
            return Err(NodeError::unauthorized("write", path.schema_path()));
        }
        self.inner.write(r, value).await
    }

    async fn action(&self, r: ActionRequest) -> Result<Option<NodeRef>, NodeError> {
        let path = r.path();
        if permission(&r.selection, &path).is_some_and(|p| p < Permission::Write) {
            return Err(NodeError::unauthorized("action", path.schema_path()));
        }
        self.inner.action(r).await
    }

    async fn notify(&self, r: NotifyRequest) -> Result<Subscription, NodeError> {
        let path = r.path();
        if permission(&r.selection, &path).is_some_and(|p| p < Permission::Read) {
            return Ok(Subscription::rejected(NodeError::unauthorized(
                "notify",
                path.schema_path(),
            )));
        }
        self.inner.notify(r).await
    }

    async fn begin_edit(&self, r: EditRequest) -> Result<(), NodeError> {
        if r.edit_root {
            if let Some(role) = r.selection.context().role() {
                let target = r.selection.path().schema_path();
                if !role.writable_within(&target) {
                    let op = if r.delete { "delete" } else { "edit" };
                    return Err(NodeError::unauthorized(op, target));
                }
            }
        }
        self.inner.begin_edit(r).await
    }

    async fn end_edit(&self, r: EditRequest) -> Result<(), NodeError> {
        self.inner.end_edit(r).await
    }
}
