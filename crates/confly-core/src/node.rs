// ── Tree operation interface ──
//
// Every tree node, local or remote, answers the same capability set. Each
// capability is optional: the default method body reports `Unsupported`, so
// an implementation only spells out what it can actually do. Middleware
// (access control, protocol drivers) wraps one `Node` in another.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;
use crate::meta::Definition;
use crate::path::Path;
use crate::selection::Selection;

pub type NodeRef = Arc<dyn Node>;

/// Buffer between a subscription's producer task and its consumer.
pub const SUBSCRIPTION_CAPACITY: usize = 64;

#[async_trait]
pub trait Node: Send + Sync {
    /// Select a container or list child. `Ok(None)` means absent.
    async fn child(&self, r: ChildRequest) -> Result<Option<NodeRef>, NodeError> {
        Err(NodeError::unsupported("child", r.path()))
    }

    /// Select a list entry by key, or by row when no key is given.
    async fn next(&self, r: ListRequest) -> Result<Option<ListEntry>, NodeError> {
        Err(NodeError::unsupported("next", r.path()))
    }

    /// Read a leaf. `Ok(None)` means no value.
    async fn read(&self, r: FieldRequest) -> Result<Option<Value>, NodeError> {
        Err(NodeError::unsupported("read", r.path()))
    }

    /// Write a leaf; `None` clears it.
    async fn write(&self, r: FieldRequest, _value: Option<Value>) -> Result<(), NodeError> {
        Err(NodeError::unsupported("write", r.path()))
    }

    /// Invoke an action, returning its output if it produced any.
    async fn action(&self, r: ActionRequest) -> Result<Option<NodeRef>, NodeError> {
        Err(NodeError::unsupported("action", r.path()))
    }

    /// Subscribe to a notification.
    async fn notify(&self, r: NotifyRequest) -> Result<Subscription, NodeError> {
        Err(NodeError::unsupported("notify", r.path()))
    }

    async fn begin_edit(&self, _r: EditRequest) -> Result<(), NodeError> {
        Ok(())
    }

    async fn end_edit(&self, _r: EditRequest) -> Result<(), NodeError> {
        Ok(())
    }
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ChildRequest {
    pub selection: Selection,
    pub meta: Arc<Definition>,
    /// Create the child if it does not exist.
    pub new: bool,
    pub delete: bool,
    /// Final destination of a navigation. Present only while navigating,
    /// when the node is asked whether the path exists rather than for data.
    pub target: Option<Arc<Path>>,
}

impl ChildRequest {
    pub fn new(selection: &Selection, meta: &Arc<Definition>) -> Self {
        Self {
            selection: selection.clone(),
            meta: Arc::clone(meta),
            new: false,
            delete: false,
            target: None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.target.is_some()
    }

    pub fn path(&self) -> Arc<Path> {
        self.selection.path().child(&self.meta)
    }
}

/// Request against a list. The selection addresses the list itself.
#[derive(Clone)]
pub struct ListRequest {
    pub selection: Selection,
    pub key: Option<Vec<Value>>,
    pub row: usize,
    pub new: bool,
    pub delete: bool,
    pub target: Option<Arc<Path>>,
}

impl ListRequest {
    pub fn by_key(selection: &Selection, key: Vec<Value>) -> Self {
        Self {
            selection: selection.clone(),
            key: Some(key),
            row: 0,
            new: false,
            delete: false,
            target: None,
        }
    }

    pub fn by_row(selection: &Selection, row: usize) -> Self {
        Self {
            selection: selection.clone(),
            key: None,
            row,
            new: false,
            delete: false,
            target: None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.target.is_some()
    }

    pub fn meta(&self) -> &Arc<Definition> {
        self.selection.meta()
    }

    pub fn path(&self) -> Arc<Path> {
        match &self.key {
            Some(key) => self.selection.path().with_key(key.clone()),
            None => Arc::clone(self.selection.path()),
        }
    }
}

#[derive(Clone)]
pub struct ListEntry {
    pub node: NodeRef,
    pub key: Vec<Value>,
}

#[derive(Clone)]
pub struct FieldRequest {
    pub selection: Selection,
    pub meta: Arc<Definition>,
    pub target: Option<Arc<Path>>,
}

impl FieldRequest {
    pub fn new(selection: &Selection, meta: &Arc<Definition>) -> Self {
        Self {
            selection: selection.clone(),
            meta: Arc::clone(meta),
            target: None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.target.is_some()
    }

    pub fn path(&self) -> Arc<Path> {
        self.selection.path().child(&self.meta)
    }
}

/// Invoke an action. The selection addresses the action definition.
#[derive(Clone)]
pub struct ActionRequest {
    pub selection: Selection,
    pub input: Option<Selection>,
}

impl ActionRequest {
    pub fn path(&self) -> Arc<Path> {
        Arc::clone(self.selection.path())
    }
}

/// Subscribe to a notification. The selection addresses the notification.
#[derive(Clone)]
pub struct NotifyRequest {
    pub selection: Selection,
}

impl NotifyRequest {
    pub fn path(&self) -> Arc<Path> {
        Arc::clone(self.selection.path())
    }

    /// Wrap a decoded event payload as a selection on the notification.
    pub fn event(&self, node: NodeRef) -> Selection {
        self.selection.derive(Arc::clone(self.selection.path()), node)
    }
}

/// Opens or closes an edit. `edit_root` is set only on the selection the
/// caller started the edit from; nested containers see `false`.
#[derive(Clone)]
pub struct EditRequest {
    pub selection: Selection,
    pub new: bool,
    pub delete: bool,
    pub edit_root: bool,
}

impl EditRequest {
    pub fn root(selection: &Selection) -> Self {
        Self {
            selection: selection.clone(),
            new: false,
            delete: false,
            edit_root: true,
        }
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// One delivered event: its timestamp and either the payload or the reason
/// the event could not be produced.
pub struct Notification {
    pub event_time: DateTime<Utc>,
    pub event: Result<Selection, NodeError>,
}

impl Notification {
    pub fn new(event_time: DateTime<Utc>, event: Selection) -> Self {
        Self {
            event_time,
            event: Ok(event),
        }
    }

    pub fn error(err: NodeError) -> Self {
        Self {
            event_time: Utc::now(),
            event: Err(err),
        }
    }

    pub fn is_error(&self) -> bool {
        self.event.is_err()
    }
}

/// Consumer end of a live notification feed.
///
/// Yields events until the producer closes the channel or the subscription is
/// cancelled. Once cancellation is observed nothing further is delivered.
/// Dropping the subscription cancels it.
pub struct Subscription {
    events: mpsc::Receiver<Notification>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<Notification>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// A subscription whose only event is `err`, closed right after.
    pub fn rejected(err: NodeError) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1, fresh channel: cannot be full.
        let _ = tx.try_send(Notification::error(err));
        Self::new(rx, CancellationToken::new())
    }

    pub async fn recv(&mut self) -> Option<Notification> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Stop delivery and release the producer.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
