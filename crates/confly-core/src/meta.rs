// ── Schema definitions ──
//
// The shape of a compiled schema module as this crate consumes it. Parsing
// schema source text is someone else's job; whatever compiles it hands us a
// tree of `Definition`s, usually as JSON.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What kind of schema node a [`Definition`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Module,
    Container,
    List,
    Leaf,
    LeafList,
    Action,
    Notification,
}

/// One node of a compiled schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub ident: String,
    pub kind: Kind,

    /// Key leaf names, in order. Only meaningful for lists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<Definition>>,

    /// Action input parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Arc<Definition>>,

    /// Action output parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Arc<Definition>>,
}

impl Definition {
    fn new(ident: impl Into<String>, kind: Kind, children: Vec<Arc<Definition>>) -> Arc<Self> {
        Arc::new(Self {
            ident: ident.into(),
            kind,
            keys: Vec::new(),
            children,
            input: None,
            output: None,
        })
    }

    pub fn module(ident: impl Into<String>, children: Vec<Arc<Definition>>) -> Arc<Self> {
        Self::new(ident, Kind::Module, children)
    }

    pub fn container(ident: impl Into<String>, children: Vec<Arc<Definition>>) -> Arc<Self> {
        Self::new(ident, Kind::Container, children)
    }

    pub fn list(
        ident: impl Into<String>,
        keys: &[&str],
        children: Vec<Arc<Definition>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ident: ident.into(),
            kind: Kind::List,
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            children,
            input: None,
            output: None,
        })
    }

    pub fn leaf(ident: impl Into<String>) -> Arc<Self> {
        Self::new(ident, Kind::Leaf, Vec::new())
    }

    pub fn leaf_list(ident: impl Into<String>) -> Arc<Self> {
        Self::new(ident, Kind::LeafList, Vec::new())
    }

    pub fn notification(ident: impl Into<String>, children: Vec<Arc<Definition>>) -> Arc<Self> {
        Self::new(ident, Kind::Notification, children)
    }

    /// An action (or RPC when declared at module scope). `None` means the
    /// action takes no input / produces no output.
    pub fn action(
        ident: impl Into<String>,
        input: Option<Vec<Arc<Definition>>>,
        output: Option<Vec<Arc<Definition>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ident: ident.into(),
            kind: Kind::Action,
            keys: Vec::new(),
            children: Vec::new(),
            input: input.map(|c| Self::new("input", Kind::Container, c)),
            output: output.map(|c| Self::new("output", Kind::Container, c)),
        })
    }

    /// Find a direct child definition. A `module:` prefix on `ident` is ignored.
    pub fn find(&self, ident: &str) -> Option<&Arc<Definition>> {
        let ident = strip_prefix(ident);
        self.children.iter().find(|d| d.ident == ident)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf | Kind::LeafList)
    }

    pub fn is_list(&self) -> bool {
        self.kind == Kind::List
    }

    pub fn is_action(&self) -> bool {
        self.kind == Kind::Action
    }

    /// Definitions that hold data (everything except actions and notifications).
    pub fn data_children(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.children
            .iter()
            .filter(|d| !matches!(d.kind, Kind::Action | Kind::Notification))
    }
}

/// Strip a `module:` qualifier from a name.
pub fn strip_prefix(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn find_ignores_module_prefix() {
        let m = Definition::module(
            "birding",
            vec![Definition::leaf("count"), Definition::container("owner", vec![])],
        );
        assert_eq!(m.find("birding:count").unwrap().ident, "count");
        assert!(m.find("missing").is_none());
    }

    #[test]
    fn deserializes_compiled_module() {
        let json = serde_json::json!({
            "ident": "m",
            "kind": "module",
            "children": [
                {"ident": "x", "kind": "list", "keys": ["y"], "children": [
                    {"ident": "y", "kind": "leaf"}
                ]},
                {"ident": "go", "kind": "action", "input": {"ident": "input", "kind": "container"}}
            ]
        });
        let m: Definition = serde_json::from_value(json).unwrap();
        let x = m.find("x").unwrap();
        assert!(x.is_list());
        assert_eq!(x.keys, vec!["y".to_string()]);
        assert!(m.find("go").unwrap().input.is_some());
        assert_eq!(m.data_children().count(), 1);
    }
}
