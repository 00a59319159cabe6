// Wire-format variants a RESTCONF server may expect.
//
// Some servers implement the IETF encoding strictly; others (including
// simplified deployments of the same stack) use plain JSON without module
// prefixes or envelopes. One `ComplianceOptions` value is fixed per
// connection and consulted at every wire decision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Media type of standard RESTCONF JSON.
pub const YANG_DATA_JSON: &str = "application/yang-data+json";

/// Media type used in simplified mode.
pub const PLAIN_JSON: &str = "application/json";

pub const EVENT_STREAM: &str = "text/event-stream";

/// Query parameter marking a subscription as simplified.
pub const SIMPLIFIED_PARAM: &str = "simplified";

/// Top-level key wrapping every event in standard mode.
pub const NOTIFICATION_WRAPPER: &str = "ietf-restconf:notification";

/// `eventTime` layout, e.g. `2024-03-01T10:20:30-05:00`.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Query of the pre-fetch issued when an edit starts.
pub const EDIT_PREFETCH_PARAMS: &str = "depth=1&content=config&with-defaults=trim";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ComplianceOptions {
    /// Plain JSON media type and unqualified member names.
    pub simplified: bool,

    /// Post module-level RPCs to the data endpoint instead of `operations/`.
    pub allow_rpc_under_data: bool,

    /// Events arrive bare instead of inside `ietf-restconf:notification`.
    pub disable_notification_wrapper: bool,

    /// Action input/output are sent bare instead of inside
    /// `<module>:input` / `<module>:output`.
    pub disable_action_wrapper: bool,
}

impl ComplianceOptions {
    /// IETF RESTCONF as written.
    pub const STRICT: Self = Self {
        simplified: false,
        allow_rpc_under_data: false,
        disable_notification_wrapper: false,
        disable_action_wrapper: false,
    };

    pub const SIMPLIFIED: Self = Self {
        simplified: true,
        allow_rpc_under_data: true,
        disable_notification_wrapper: true,
        disable_action_wrapper: true,
    };

    /// Value of both `Content-Type` and `Accept` on data requests.
    pub fn media_type(&self) -> &'static str {
        if self.simplified {
            PLAIN_JSON
        } else {
            YANG_DATA_JSON
        }
    }
}

impl fmt::Display for ComplianceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::STRICT => f.write_str("strict"),
            Self::SIMPLIFIED => f.write_str("simplified"),
            _ => write!(f, "{self:?}"),
        }
    }
}

impl FromStr for ComplianceOptions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "ietf" => Ok(Self::STRICT),
            "simplified" | "simple" => Ok(Self::SIMPLIFIED),
            other => Err(format!(
                "unknown compliance mode '{other}' (expected 'strict' or 'simplified')"
            )),
        }
    }
}
