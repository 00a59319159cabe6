//! RESTCONF protocol driver.
//!
//! [`ClientNode`] answers tree operations by issuing RESTCONF requests
//! through a [`ClientSupport`]. One instance serves one top-level operation
//! sequence and moves through these states:
//!
//! - **unattached**: nothing fetched yet. Navigation is answered with a
//!   single memoized `OPTIONS` probe and the driver hands itself back.
//! - **read mode**: the first non-navigational request fetches the target
//!   with a plain `GET`; later reads are served from that response.
//! - **edit mode**: `begin_edit` pre-fetches the target's configuration and
//!   layers a change buffer over it; `end_edit` sends the merged result with
//!   `PUT` (or `POST` for a new target). Edit mode takes precedence over a
//!   read handle once entered.
//!
//! Deletes, actions and subscriptions go straight to the wire.

use std::sync::Arc;

use async_trait::async_trait;
use confly_core::{
    ActionRequest, ChildRequest, EditBuffer, EditRequest, FieldRequest, JsonNode, ListEntry,
    ListRequest, Node, NodeError, NodeRef, Notification, NotifyRequest, Path, SUBSCRIPTION_CAPACITY,
    Subscription, qualify, unqualify,
};
use reqwest::Method;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::compliance::{ComplianceOptions, EDIT_PREFETCH_PARAMS};
use crate::error::Error;
use crate::events::StreamEvent;

// ── ClientSupport ────────────────────────────────────────────────────

/// The wire seam between the driver and an HTTP client.
///
/// `client_do` returns the response body, or `None` when the server sent
/// no content.
#[async_trait]
pub trait ClientSupport: Send + Sync {
    async fn client_do(
        &self,
        method: Method,
        params: &str,
        path: &Path,
        payload: Option<Value>,
    ) -> Result<Option<String>, Error>;

    async fn client_stream(
        &self,
        params: &str,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamEvent>, Error>;
}

// ── Driver state ─────────────────────────────────────────────────────

#[derive(Default)]
struct DriverState {
    read: Option<JsonNode>,
    edit: Option<EditBuffer>,
    /// Navigation already confirmed by an `OPTIONS` probe.
    found: bool,
    method: Option<Method>,
}

/// Tree node backed by a remote RESTCONF server.
///
/// Clones share state: navigation hands back a clone of the driver so the
/// whole sequence keeps talking to the same instance.
#[derive(Clone)]
pub struct ClientNode {
    support: Arc<dyn ClientSupport>,
    compliance: ComplianceOptions,
    state: Arc<Mutex<DriverState>>,
}

impl ClientNode {
    pub fn new(support: Arc<dyn ClientSupport>, compliance: ComplianceOptions) -> Self {
        Self {
            support,
            compliance,
            state: Arc::new(Mutex::new(DriverState::default())),
        }
    }

    fn this(&self) -> NodeRef {
        Arc::new(self.clone())
    }

    /// `OPTIONS` on the navigation target, at most once per instance.
    async fn valid_navigation(&self, target: &Path) -> Result<bool, NodeError> {
        let mut state = self.state.lock().await;
        if state.found {
            return Ok(true);
        }
        match self
            .support
            .client_do(Method::OPTIONS, "", target, None)
            .await
        {
            Ok(_) => {
                state.found = true;
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %target, "navigation target does not exist");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Node answering non-navigational requests: the edit buffer when an
    /// edit is open, otherwise the (lazily fetched) read handle.
    async fn handle(&self, path: &Path) -> Result<NodeRef, NodeError> {
        let mut state = self.state.lock().await;
        if let Some(edit) = &state.edit {
            return Ok(edit.node());
        }
        if let Some(read) = &state.read {
            return Ok(Arc::new(read.clone()));
        }
        let read = JsonNode::new(self.get(path, "").await?);
        state.read = Some(read.clone());
        Ok(Arc::new(read))
    }

    async fn get(&self, path: &Path, params: &str) -> Result<Value, NodeError> {
        let body = self
            .support
            .client_do(Method::GET, params, path, None)
            .await?;
        let Some(body) = body else {
            return Ok(Value::Null);
        };
        Ok(resource_content(path, unqualify(parse_body(&body)?)))
    }

    /// Outgoing JSON in the active encoding.
    fn encode(&self, path: &Path, value: Value) -> Value {
        if self.compliance.simplified {
            value
        } else {
            qualify(&path.module().ident, value)
        }
    }

    async fn request_action(
        &self,
        path: &Path,
        input: Option<Value>,
    ) -> Result<Option<NodeRef>, NodeError> {
        let module = &path.module().ident;
        let payload = input.map(|input| {
            let input = self.encode(path, input);
            if self.compliance.disable_action_wrapper {
                input
            } else {
                let mut wrapper = Map::new();
                wrapper.insert(format!("{module}:input"), input);
                Value::Object(wrapper)
            }
        });

        let Some(body) = self
            .support
            .client_do(Method::POST, "", path, payload)
            .await?
        else {
            return Ok(None);
        };
        let mut output = parse_body(&body)?;
        if !self.compliance.disable_action_wrapper {
            let key = format!("{module}:output");
            output = match output.as_object_mut().and_then(|o| o.remove(&key)) {
                Some(inner @ Value::Object(_)) => inner,
                _ => return Err(Error::MissingEnvelope { key }.into()),
            };
        }
        Ok(Some(Arc::new(JsonNode::new(unqualify(output)))))
    }
}

fn parse_body(body: &str) -> Result<Value, NodeError> {
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
        .into()
    })
}

/// Servers differ on whether a resource comes back bare or inside a member
/// named after itself (`{"x": {...}}`, `{"pets": [{...}]}` for one entry).
/// Strip the self-named member when the schema can't be read that way.
fn resource_content(path: &Path, value: Value) -> Value {
    let meta = path.meta();
    let Value::Object(mut obj) = value else {
        return value;
    };
    if obj.len() != 1 || meta.find(&meta.ident).is_some() {
        return Value::Object(obj);
    }
    match (meta.is_list(), path.key().is_some(), obj.remove(&meta.ident)) {
        // list entry: single-element array
        (true, true, Some(Value::Array(mut items))) if items.len() == 1 => items.remove(0),
        // whole list: keep the wrapper, lookups expect it
        (true, false, Some(items)) => {
            obj.insert(meta.ident.clone(), items);
            Value::Object(obj)
        }
        (false, _, Some(inner @ Value::Object(_))) => inner,
        (_, _, Some(other)) => {
            obj.insert(meta.ident.clone(), other);
            Value::Object(obj)
        }
        (_, _, None) => Value::Object(obj),
    }
}

// ── Node ─────────────────────────────────────────────────────────────

#[async_trait]
impl Node for ClientNode {
    async fn child(&self, r: ChildRequest) -> Result<Option<NodeRef>, NodeError> {
        if let Some(target) = &r.target {
            return Ok(self.valid_navigation(target).await?.then(|| self.this()));
        }
        if r.delete {
            self.support
                .client_do(Method::DELETE, "", &r.path(), None)
                .await?;
            return Ok(None);
        }
        let handle = self.handle(r.selection.path()).await?;
        handle.child(r).await
    }

    async fn next(&self, r: ListRequest) -> Result<Option<ListEntry>, NodeError> {
        if let Some(target) = &r.target {
            if !self.valid_navigation(target).await? {
                return Ok(None);
            }
            return Ok(Some(ListEntry {
                node: self.this(),
                key: r.key.unwrap_or_default(),
            }));
        }
        if r.delete && r.key.is_some() {
            self.support
                .client_do(Method::DELETE, "", &r.path(), None)
                .await?;
            return Ok(None);
        }
        let handle = self.handle(r.selection.path()).await?;
        handle.next(r).await
    }

    async fn read(&self, r: FieldRequest) -> Result<Option<Value>, NodeError> {
        if r.is_navigation() {
            return Ok(None);
        }
        let handle = self.handle(r.selection.path()).await?;
        handle.read(r).await
    }

    async fn write(&self, r: FieldRequest, value: Option<Value>) -> Result<(), NodeError> {
        let edit = self.state.lock().await.edit.as_ref().map(EditBuffer::node);
        match edit {
            Some(edit) => edit.write(r, value).await,
            None => {
                warn!(path = %r.path(), "write outside of an edit");
                Err(NodeError::unsupported("write outside of an edit", r.path()))
            }
        }
    }

    async fn action(&self, r: ActionRequest) -> Result<Option<NodeRef>, NodeError> {
        let input = match &r.input {
            Some(input) => Some(input.to_json().await?),
            None => None,
        };
        self.request_action(&r.path(), input).await
    }

    async fn notify(&self, r: NotifyRequest) -> Result<Subscription, NodeError> {
        let cancel = CancellationToken::new();
        let mut events = self
            .support
            .client_stream("", &r.path(), cancel.clone())
            .await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let notification = match event.payload {
                    Ok(payload) => Notification::new(
                        event.timestamp,
                        r.event(Arc::new(JsonNode::new(unqualify(payload)))),
                    ),
                    Err(err) => Notification {
                        event_time: event.timestamp,
                        event: Err(err.into()),
                    },
                };
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    sent = tx.send(notification) => if sent.is_err() { break },
                }
            }
        });
        Ok(Subscription::new(rx, cancel))
    }

    async fn begin_edit(&self, r: EditRequest) -> Result<(), NodeError> {
        if !r.edit_root || r.delete {
            return Ok(());
        }
        let method = if r.new { Method::POST } else { Method::PUT };
        let path = r.selection.path();
        let snapshot = self.get(path, EDIT_PREFETCH_PARAMS).await?;
        let edit = if method == Method::POST {
            EditBuffer::creating(snapshot)
        } else {
            EditBuffer::new(snapshot)
        };
        let mut state = self.state.lock().await;
        state.edit = Some(edit);
        state.method = Some(method);
        Ok(())
    }

    async fn end_edit(&self, r: EditRequest) -> Result<(), NodeError> {
        if !r.edit_root || r.delete {
            return Ok(());
        }
        let (edit, method) = {
            let mut state = self.state.lock().await;
            (state.edit.take(), state.method.take())
        };
        let (Some(edit), Some(method)) = (edit, method) else {
            return Err(NodeError::Protocol("edit ended without being started".into()));
        };
        let path = r.selection.path();
        // A creation carries only the new data; a replacement carries it all.
        let data = if method == Method::POST {
            edit.changes()
        } else {
            edit.merged()
        };
        let body = self.encode(path, data);
        self.support.client_do(method, "", path, Some(body)).await?;
        Ok(())
    }
}
