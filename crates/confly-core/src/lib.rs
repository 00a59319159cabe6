//! Schema-modeled data trees with a uniform operation interface.
//!
//! Everything in the confly workspace, local or remote, is a tree of
//! [`Node`]s addressed through [`Selection`]s:
//!
//! - **[`Node`]** — The capability set a tree node answers: child and list
//!   navigation, leaf read/write, actions, notifications and edit
//!   bracketing. Every capability defaults to [`NodeError::Unsupported`].
//!
//! - **[`Selection`]** / **[`Browser`]** — A node bound to its [`Path`] and
//!   the caller's [`Context`]. The user-facing operations (`find`, `get`,
//!   `set`, `delete`, `action`, `notifications`, `to_json`, `upsert_from`)
//!   live here.
//!
//! - **[`JsonNode`]** / **[`EditBuffer`]** — In-memory trees over
//!   `serde_json::Value`, used for decoded responses, action input/output and
//!   buffering changes during an edit.
//!
//! - **[`secure`]** — Path-scoped access control. [`Selection::with_role`]
//!   puts a selection behind a [`Guard`](secure::Guard) that hides or rejects
//!   operations the role's grants do not cover.

mod edit;
pub mod error;
pub mod json;
pub mod meta;
pub mod node;
pub mod overlay;
pub mod path;
pub mod secure;
pub mod selection;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::NodeError;
pub use json::{JsonNode, merge, qualify, unqualify};
pub use meta::{Definition, Kind};
pub use node::{
    ActionRequest, ChildRequest, EditRequest, FieldRequest, ListEntry, ListRequest, Node, NodeRef,
    Notification, NotifyRequest, SUBSCRIPTION_CAPACITY, Subscription,
};
pub use overlay::EditBuffer;
pub use path::Path;
pub use secure::{AccessControl, Permission, Role};
pub use selection::{Browser, Context, Selection};
