// ── Paths ──
//
// Immutable chain from a module root to one schema definition, carrying list
// keys where a step addresses a list entry. Drives both URL construction and
// access-control matching.

use std::fmt;
use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use crate::error::NodeError;
use crate::meta::{Definition, Kind, strip_prefix};

/// Everything but RFC 3986 unreserved characters is escaped in key values.
const KEY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug)]
pub struct Path {
    parent: Option<Arc<Path>>,
    meta: Arc<Definition>,
    key: Option<Vec<Value>>,
}

impl Path {
    /// Root path of a module. The definition must be of kind [`Kind::Module`].
    pub fn root(module: Arc<Definition>) -> Arc<Self> {
        debug_assert_eq!(module.kind, Kind::Module);
        Arc::new(Self {
            parent: None,
            meta: module,
            key: None,
        })
    }

    pub fn child(self: &Arc<Self>, meta: &Arc<Definition>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            meta: Arc::clone(meta),
            key: None,
        })
    }

    /// Same step, addressing the list entry with `key`.
    pub fn with_key(self: &Arc<Self>, key: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            parent: self.parent.clone(),
            meta: Arc::clone(&self.meta),
            key: Some(key),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Path>> {
        self.parent.as_ref()
    }

    pub fn meta(&self) -> &Arc<Definition> {
        &self.meta
    }

    pub fn key(&self) -> Option<&[Value]> {
        self.key.as_deref()
    }

    /// The module this path is rooted in.
    pub fn module(&self) -> &Arc<Definition> {
        let mut p = self;
        while let Some(parent) = p.parent.as_deref() {
            p = parent;
        }
        &p.meta
    }

    /// `true` when the target is declared directly under the module.
    pub fn is_root_scoped(&self) -> bool {
        self.parent.as_ref().is_some_and(|p| p.parent.is_none())
    }

    /// Steps below the module root, outermost first.
    fn steps(&self) -> Vec<&Path> {
        let mut steps = Vec::new();
        let mut p = self;
        while let Some(parent) = p.parent.as_deref() {
            steps.push(p);
            p = parent;
        }
        steps.reverse();
        steps
    }

    /// `module/a/b` with list keys left out. This is the form access-control
    /// entries are written against.
    pub fn schema_path(&self) -> String {
        let mut s = self.module().ident.clone();
        for step in self.steps() {
            s.push('/');
            s.push_str(&step.meta.ident);
        }
        s
    }

    /// Resolve a relative path such as `owner/pets=rex/name` below this one.
    pub fn resolve(self: &Arc<Self>, rel: &str) -> Result<Arc<Path>, NodeError> {
        let mut p = Arc::clone(self);
        for seg in parse_segments(rel)? {
            let meta = p.meta.find(&seg.ident).ok_or_else(|| NodeError::InvalidPath {
                path: rel.into(),
                reason: format!("'{}' is not defined under '{}'", seg.ident, p.meta.ident),
            })?;
            p = p.child(meta);
            if let Some(key) = seg.key {
                if !p.meta.is_list() {
                    return Err(NodeError::InvalidPath {
                        path: rel.into(),
                        reason: format!("'{}' is not a list", seg.ident),
                    });
                }
                p = p.with_key(key);
            }
        }
        Ok(p)
    }
}

/// `a/b=k1,k2/c`, module excluded, keys as written.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_steps(f, value_text)
    }
}

impl Path {
    /// Like the `Display` form, with each key value percent-encoded so a key
    /// holding `/`, `,`, `?` or `%` stays inside its own segment.
    pub fn url_path(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_steps(&mut out, |v| {
            utf8_percent_encode(&value_text(v), KEY_VALUE).to_string()
        });
        out
    }

    fn write_steps(
        &self,
        f: &mut impl fmt::Write,
        key_text: impl Fn(&Value) -> String,
    ) -> fmt::Result {
        for (i, step) in self.steps().into_iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&step.meta.ident)?;
            if let Some(key) = &step.key {
                let parts: Vec<String> = key.iter().map(&key_text).collect();
                write!(f, "={}", parts.join(","))?;
            }
        }
        Ok(())
    }
}

/// One `ident[=key,...]` step of a relative path.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub ident: String,
    pub key: Option<Vec<Value>>,
}

pub fn parse_segments(rel: &str) -> Result<Vec<Segment>, NodeError> {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let (ident, key) = match s.split_once('=') {
                Some((ident, key)) => (
                    ident,
                    Some(key.split(',').map(|k| Value::String(k.into())).collect()),
                ),
                None => (s, None),
            };
            let ident = strip_prefix(ident);
            if ident.is_empty() {
                return Err(NodeError::InvalidPath {
                    path: rel.into(),
                    reason: "empty segment".into(),
                });
            }
            Ok(Segment {
                ident: ident.into(),
                key,
            })
        })
        .collect()
}

/// Text form of a leaf value: strings unquoted, everything else as JSON.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
