// Async HTTP client for one RESTCONF server.
//
// Data:       {base}data/{module}:{path}
// Operations: {base}operations/{module}:{rpc}   (module-level RPCs)
// Schema:     {base}schema/{module}{ext}
// UI:         {base}ui/{resource}

use std::time::Duration;

use async_trait::async_trait;
use confly_core::Path;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::address::Address;
use crate::compliance::{ComplianceOptions, EVENT_STREAM, SIMPLIFIED_PARAM};
use crate::driver::ClientSupport;
use crate::error::Error;
use crate::events::{StreamEvent, spawn_event_stream};
use crate::transport::TransportConfig;

// ── Client ───────────────────────────────────────────────────────────

/// Wire transport for the protocol driver.
///
/// Holds the connection-wide, read-only pieces (HTTP client, endpoints,
/// compliance) and is shared by every driver instance of a device.
pub struct RestconfClient {
    http: reqwest::Client,
    address: Address,
    compliance: ComplianceOptions,
    timeout: Duration,
}

impl RestconfClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(
        address: Address,
        compliance: ComplianceOptions,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::from_reqwest(address, compliance, http, transport.timeout))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(
        address: Address,
        compliance: ComplianceOptions,
        http: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            address,
            compliance,
            timeout,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn compliance(&self) -> ComplianceOptions {
        self.compliance
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Request URL for `path`: `<data><module>:<path>`, or the operations
    /// endpoint for a module-level RPC unless RPCs may live under data.
    pub fn url_for(&self, path: &Path, params: &str) -> Result<Url, Error> {
        let endpoint = if path.meta().is_action()
            && path.is_root_scoped()
            && !self.compliance.allow_rpc_under_data
        {
            &self.address.operations
        } else {
            &self.address.data
        };
        let mut url = format!("{endpoint}{}:{}", path.module().ident, path.url_path());
        if !params.is_empty() {
            url.push('?');
            url.push_str(params);
        }
        Ok(Url::parse(&url)?)
    }

    // ── Response handling ────────────────────────────────────────────

    /// Body of a successful response, `None` when it is empty.
    async fn handle_response(resp: reqwest::Response) -> Result<Option<String>, Error> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(body))
        }
    }

    // ── Schema and UI endpoints ──────────────────────────────────────

    /// Text of `<schema>/<name><ext>`, `None` if the server does not have it.
    pub async fn fetch_schema(&self, name: &str, ext: &str) -> Result<Option<String>, Error> {
        let url = self.address.schema.join(&format!("{name}{ext}"))?;
        debug!("=> GET {url}");
        let resp = self.http.get(url).timeout(self.timeout).send().await?;
        match Self::handle_response(resp).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    /// Raw bytes of a resource under the UI endpoint.
    pub async fn fetch_ui(&self, resource: &str) -> Result<Vec<u8>, Error> {
        let url = self.address.ui.join(resource.trim_start_matches('/'))?;
        debug!("=> GET {url}");
        let resp = self.http.get(url).timeout(self.timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ClientSupport for RestconfClient {
    async fn client_do(
        &self,
        method: Method,
        params: &str,
        path: &Path,
        payload: Option<Value>,
    ) -> Result<Option<String>, Error> {
        let url = self.url_for(path, params)?;
        debug!("=> {method} {url}");

        let media_type = self.compliance.media_type();
        let mut req = self
            .http
            .request(method, url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, media_type)
            .header(ACCEPT, media_type);
        if let Some(payload) = payload {
            req = req.body(payload.to_string());
        }
        let resp = req.send().await?;
        Self::handle_response(resp).await
    }

    async fn client_stream(
        &self,
        params: &str,
        path: &Path,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<StreamEvent>, Error> {
        let mut url = self.url_for(path, params)?;
        if self.compliance.simplified {
            url.query_pairs_mut().append_key_only(SIMPLIFIED_PARAM);
        }
        debug!("<=> SSE {url}");

        let req = self.http.get(url).header(ACCEPT, EVENT_STREAM);
        Ok(spawn_event_stream(req, self.compliance, cancel))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use confly_core::Definition;

    use super::*;

    fn client(compliance: ComplianceOptions) -> RestconfClient {
        RestconfClient::from_reqwest(
            Address::parse("http://device:8080/restconf").unwrap(),
            compliance,
            reqwest::Client::new(),
            Duration::from_secs(5),
        )
    }

    fn module() -> Arc<Definition> {
        Definition::module(
            "car",
            vec![
                Definition::container(
                    "engine",
                    vec![Definition::action("start", None, None)],
                ),
                Definition::action("reset", None, None),
                Definition::list("tire", &["pos"], vec![Definition::leaf("pos")]),
            ],
        )
    }

    #[test]
    fn list_keys_are_percent_encoded() {
        let tire = Path::root(module()).resolve("tire=a?b").unwrap();
        let url = client(ComplianceOptions::STRICT)
            .url_for(&tire, "depth=1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://device:8080/restconf/data/car:tire=a%3Fb?depth=1"
        );
        assert_eq!(url.path(), "/restconf/data/car:tire=a%3Fb");
        assert_eq!(url.query(), Some("depth=1"));
    }

    #[test]
    fn data_urls_are_module_qualified() {
        let root = Path::root(module());
        let c = client(ComplianceOptions::STRICT);
        let url = c.url_for(&root.resolve("engine").unwrap(), "depth=1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://device:8080/restconf/data/car:engine?depth=1"
        );
        let url = c.url_for(&root.resolve("engine/start").unwrap(), "").unwrap();
        assert_eq!(
            url.as_str(),
            "http://device:8080/restconf/data/car:engine/start"
        );
    }

    #[test]
    fn module_level_rpc_uses_operations_endpoint() {
        let reset = Path::root(module()).resolve("reset").unwrap();
        assert_eq!(
            client(ComplianceOptions::STRICT)
                .url_for(&reset, "")
                .unwrap()
                .as_str(),
            "http://device:8080/restconf/operations/car:reset"
        );
        assert_eq!(
            client(ComplianceOptions::SIMPLIFIED)
                .url_for(&reset, "")
                .unwrap()
                .as_str(),
            "http://device:8080/restconf/data/car:reset"
        );
    }
}
