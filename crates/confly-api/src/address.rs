// Endpoint URLs of one RESTCONF server, all derived from a single base.
//
// Computed once per connection; every request URL is built from these.

use url::Url;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Base URL, always ending in `/`.
    pub base: Url,
    pub data: Url,
    pub operations: Url,
    pub schema: Url,
    pub ui: Url,
    pub stream: Url,
    /// `scheme://host[:port]`
    pub origin: String,
    /// Device id embedded in the base as `...=<id>/`, e.g. `restconf=dev1`.
    pub device_id: Option<String>,
}

impl Address {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = if raw.ends_with('/') {
            raw.to_owned()
        } else {
            format!("{raw}/")
        };
        let base = Url::parse(&raw)?;

        Ok(Self {
            data: base.join("data/")?,
            operations: base.join("operations/")?,
            schema: base.join("schema/")?,
            ui: base.join("ui/")?,
            stream: base.join("streams/")?,
            origin: base.origin().ascii_serialization(),
            device_id: find_device_id(&base),
            base,
        })
    }
}

/// Text after `=` in the last path segment that carries one.
fn find_device_id(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter_map(|seg| seg.split_once('=').map(|(_, id)| id))
        .next_back()
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}
