//! Schema module loading.
//!
//! A device's browser needs the compiled [`Definition`] of the module it
//! exposes. Module text comes from a [`SchemaSource`] (a local directory,
//! the server's schema endpoint, or a chain of both), is turned into a
//! definition by a [`ModuleParser`], and is cached per name in a
//! [`ModuleRegistry`] so concurrent first loads of the same module fetch
//! and parse it once.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use confly_core::{Definition, Kind};
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::client::RestconfClient;
use crate::error::Error;

// ── Sources ──────────────────────────────────────────────────────────

/// Where module text comes from.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Text of `<name><ext>`, or `None` if this source does not have it.
    async fn open(&self, name: &str, ext: &str) -> Result<Option<String>, Error>;
}

/// Module files in a local directory.
#[derive(Debug, Clone)]
pub struct LocalSchema {
    dir: PathBuf,
}

impl LocalSchema {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SchemaSource for LocalSchema {
    async fn open(&self, name: &str, ext: &str) -> Result<Option<String>, Error> {
        let file = self.dir.join(format!("{name}{ext}"));
        match tokio::fs::read_to_string(&file).await {
            Ok(text) => {
                debug!(file = %file.display(), "schema loaded from disk");
                Ok(Some(text))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Schema(format!("{}: {e}", file.display()))),
        }
    }
}

/// The server's own schema endpoint.
pub struct RemoteSchema {
    client: Arc<RestconfClient>,
}

impl RemoteSchema {
    pub fn new(client: Arc<RestconfClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SchemaSource for RemoteSchema {
    async fn open(&self, name: &str, ext: &str) -> Result<Option<String>, Error> {
        self.client.fetch_schema(name, ext).await
    }
}

/// Sources tried in order; the first one that has the module wins.
#[derive(Default)]
pub struct SchemaChain {
    sources: Vec<Box<dyn SchemaSource>>,
}

impl SchemaChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: impl SchemaSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

#[async_trait]
impl SchemaSource for SchemaChain {
    async fn open(&self, name: &str, ext: &str) -> Result<Option<String>, Error> {
        for source in &self.sources {
            if let Some(text) = source.open(name, ext).await? {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }
}

// ── Parsers ──────────────────────────────────────────────────────────

/// Turns module text into a compiled definition.
pub trait ModuleParser: Send + Sync {
    /// File extension this parser reads, including the dot.
    fn extension(&self) -> &str;

    fn parse(&self, name: &str, text: &str) -> Result<Definition, Error>;
}

/// Modules serialized as a JSON [`Definition`] tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModuleParser;

impl ModuleParser for JsonModuleParser {
    fn extension(&self) -> &str {
        ".json"
    }

    fn parse(&self, name: &str, text: &str) -> Result<Definition, Error> {
        let def: Definition = serde_json::from_str(text)
            .map_err(|e| Error::Schema(format!("module '{name}': {e}")))?;
        if def.kind != Kind::Module {
            return Err(Error::Schema(format!(
                "module '{name}': top-level definition is a {:?}, not a module",
                def.kind
            )));
        }
        if def.ident != name {
            return Err(Error::Schema(format!(
                "module '{name}': file declares module '{}'",
                def.ident
            )));
        }
        Ok(def)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Loaded modules by name.
///
/// Each name is loaded at most once. Callers racing on the same name wait
/// for the first load; a failed load leaves the slot empty so a later call
/// retries.
pub struct ModuleRegistry {
    source: Box<dyn SchemaSource>,
    parser: Box<dyn ModuleParser>,
    modules: DashMap<String, Arc<OnceCell<Arc<Definition>>>>,
}

impl ModuleRegistry {
    pub fn new(source: impl SchemaSource + 'static, parser: impl ModuleParser + 'static) -> Self {
        Self {
            source: Box::new(source),
            parser: Box::new(parser),
            modules: DashMap::new(),
        }
    }

    /// The module named `name`, loading it on first use.
    pub async fn load(&self, name: &str) -> Result<Arc<Definition>, Error> {
        // Clone the cell out so no map guard is held across the await.
        let cell = Arc::clone(
            self.modules
                .entry(name.to_owned())
                .or_default()
                .value(),
        );
        cell.get_or_try_init(|| async {
            let text = self
                .source
                .open(name, self.parser.extension())
                .await?
                .ok_or_else(|| Error::ModuleNotFound(name.to_owned()))?;
            let def = self.parser.parse(name, &text)?;
            info!(module = name, "schema module loaded");
            Ok::<_, Error>(Arc::new(def))
        })
        .await
        .cloned()
    }

    /// Register an already compiled module, replacing any loaded copy.
    pub fn insert(&self, module: Arc<Definition>) {
        let cell = OnceCell::new_with(Some(Arc::clone(&module)));
        self.modules.insert(module.ident.clone(), Arc::new(cell));
    }

    /// Names of the modules loaded so far, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .iter()
            .filter(|e| e.value().initialized())
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }
}
