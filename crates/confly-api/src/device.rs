// A connected RESTCONF device: one client, one module registry, and a
// browser per module backed by the protocol driver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use confly_core::{Browser, Definition, NodeRef};

use crate::address::Address;
use crate::client::RestconfClient;
use crate::compliance::ComplianceOptions;
use crate::driver::{ClientNode, ClientSupport};
use crate::error::Error;
use crate::schema::{JsonModuleParser, LocalSchema, ModuleRegistry, RemoteSchema, SchemaChain};
use crate::transport::{TlsMode, TransportConfig};

/// Everything needed to reach one device.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// RESTCONF base, e.g. `https://device:8443/restconf`.
    pub url: String,
    pub compliance: ComplianceOptions,
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Searched for module files before asking the server.
    pub schema_dir: Option<PathBuf>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            compliance: ComplianceOptions::default(),
            tls: TlsMode::default(),
            timeout: TransportConfig::default().timeout,
            schema_dir: None,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }
}

struct DeviceInner {
    client: Arc<RestconfClient>,
    registry: ModuleRegistry,
}

/// Handle to a remote device. Cheap to clone.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Set up the client and schema sources. No request is sent until a
    /// module or its data is needed.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, Error> {
        let address = Address::parse(&config.url)?;
        let client = Arc::new(RestconfClient::new(
            address,
            config.compliance,
            &config.transport(),
        )?);

        let mut chain = SchemaChain::new();
        if let Some(dir) = &config.schema_dir {
            chain = chain.with(LocalSchema::new(dir));
        }
        chain = chain.with(RemoteSchema::new(Arc::clone(&client)));

        Ok(Self {
            inner: Arc::new(DeviceInner {
                client,
                registry: ModuleRegistry::new(chain, JsonModuleParser),
            }),
        })
    }

    pub fn address(&self) -> &Address {
        self.inner.client.address()
    }

    pub fn compliance(&self) -> ComplianceOptions {
        self.inner.client.compliance()
    }

    pub fn client(&self) -> &Arc<RestconfClient> {
        &self.inner.client
    }

    /// Make a module available without fetching it.
    pub fn register(&self, module: Arc<Definition>) {
        self.inner.registry.insert(module);
    }

    /// Browser over `module`. Every root selection gets a fresh driver.
    pub async fn browser(&self, module: &str) -> Result<Browser, Error> {
        let def = self.inner.registry.load(module).await?;
        let client: Arc<dyn ClientSupport> = self.inner.client.clone();
        let compliance = self.compliance();
        Ok(Browser::new(def, move || {
            Arc::new(ClientNode::new(Arc::clone(&client), compliance)) as NodeRef
        }))
    }

    /// Modules loaded so far.
    pub fn modules(&self) -> Vec<String> {
        self.inner.registry.loaded()
    }

    /// Raw UI resource served by the device.
    pub async fn ui_resource(&self, resource: &str) -> Result<Vec<u8>, Error> {
        self.inner.client.fetch_ui(resource).await
    }
}
