// confly-api: Async RESTCONF client (protocol driver, event streams, schema loading)

pub mod address;
pub mod client;
pub mod compliance;
pub mod device;
pub mod driver;
pub mod error;
pub mod events;
pub mod schema;
pub mod transport;

pub use address::Address;
pub use client::RestconfClient;
pub use compliance::ComplianceOptions;
pub use device::{ConnectionConfig, Device};
pub use driver::{ClientNode, ClientSupport};
pub use error::Error;
pub use events::{EventError, SseDecoder, StreamEvent, decode_event};
pub use schema::{
    JsonModuleParser, LocalSchema, ModuleParser, ModuleRegistry, RemoteSchema, SchemaChain,
    SchemaSource,
};
pub use transport::{TlsMode, TransportConfig};
