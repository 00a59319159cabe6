//! Server-sent event stream decoding.
//!
//! A subscription is a long-lived `text/event-stream` response. [`SseDecoder`]
//! splits the byte stream into event payloads, [`decode_event`] turns one
//! payload into a [`StreamEvent`], and [`spawn_event_stream`] runs both in a
//! background task feeding a bounded channel until the server ends the
//! stream or the subscription is cancelled.
//!
//! A chunk that cannot be decoded is never dropped: it becomes an event
//! carrying an [`EventError`].

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::compliance::{ComplianceOptions, EVENT_TIME_FORMAT, NOTIFICATION_WRAPPER};

// ── Channel capacity ─────────────────────────────────────────────────

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ── StreamEvent ──────────────────────────────────────────────────────

/// Why an event could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("missing notification wrapper")]
    MissingWrapper,

    #[error("missing event payload")]
    MissingEvent,

    #[error("missing eventTime")]
    MissingEventTime,

    #[error("eventTime in wrong format '{0}'")]
    BadEventTime(String),

    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("event stream failed: {0}")]
    Stream(String),
}

/// One unit of subscription delivery.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub timestamp: DateTime<Utc>,
    pub payload: Result<Value, EventError>,
}

impl StreamEvent {
    fn failed(err: EventError) -> Self {
        Self {
            timestamp: Utc::now(),
            payload: Err(err),
        }
    }
}

impl From<EventError> for confly_core::NodeError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Stream(message) => Self::Transport {
                status: None,
                message,
            },
            other => Self::MalformedPayload(other.to_string()),
        }
    }
}

// ── SSE framing ──────────────────────────────────────────────────────

/// Incremental `text/event-stream` parser.
///
/// `data:` lines accumulate (joined by `\n`) until a blank line ends the
/// event. Comments and other fields (`event:`, `id:`, `retry:`) are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes; returns the payloads of every event they complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    /// End of stream: flush an event the server did not terminate.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.line(rest.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        if field == "data" {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_owned());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

// ── Event decoding ───────────────────────────────────────────────────

/// Decode one event payload.
///
/// With the notification wrapper enabled the payload must look like
/// `{"ietf-restconf:notification": {"eventTime": "...", "event": {...}}}`;
/// otherwise the whole payload is the event and its time is the time of
/// receipt.
pub fn decode_event(data: &str, compliance: ComplianceOptions) -> StreamEvent {
    let decoded = serde_json::from_str::<Value>(data)
        .map_err(|e| EventError::Malformed(e.to_string()))
        .and_then(|value| {
            if compliance.disable_notification_wrapper {
                Ok((Utc::now(), value))
            } else {
                unwrap_notification(value)
            }
        });
    match decoded {
        Ok((timestamp, event)) => StreamEvent {
            timestamp,
            payload: Ok(event),
        },
        Err(err) => StreamEvent::failed(err),
    }
}

fn unwrap_notification(mut value: Value) -> Result<(DateTime<Utc>, Value), EventError> {
    let Some(Value::Object(mut wrapper)) = value
        .as_object_mut()
        .and_then(|obj| obj.remove(NOTIFICATION_WRAPPER))
    else {
        return Err(EventError::MissingWrapper);
    };
    let event = match wrapper.remove("event") {
        Some(event @ Value::Object(_)) => event,
        _ => return Err(EventError::MissingEvent),
    };
    let Some(Value::String(time)) = wrapper.remove("eventTime") else {
        return Err(EventError::MissingEventTime);
    };
    let timestamp = DateTime::parse_from_str(&time, EVENT_TIME_FORMAT)
        .map_err(|_| EventError::BadEventTime(time.clone()))?
        .with_timezone(&Utc);
    Ok((timestamp, event))
}

// ── Background stream task ───────────────────────────────────────────

/// Send `request` and decode its event stream in a background task.
///
/// Connection failures and non-success statuses are delivered in-band as a
/// single failed event. Once `cancel` fires the task stops reading, drops
/// the response and closes the channel; nothing further is sent.
pub fn spawn_event_stream(
    request: reqwest::RequestBuilder,
    compliance: ComplianceOptions,
    cancel: CancellationToken,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        stream_loop(request, compliance, tx, cancel).await;
    });
    rx
}

async fn stream_loop(
    request: reqwest::RequestBuilder,
    compliance: ComplianceOptions,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        resp = request.send() => resp,
    };
    let response = match response {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!(status, "event stream rejected");
            fail(&tx, &cancel, format!("({status}) {body}")).await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "event stream connection failed");
            fail(&tx, &cancel, e.to_string()).await;
            return;
        }
    };

    info!(url = %response.url(), "event stream open");
    let mut bytes = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("event stream cancelled");
                break;
            }
            chunk = bytes.next() => match chunk {
                Some(Ok(chunk)) => {
                    for data in decoder.feed(&chunk) {
                        trace!(%data, "event");
                        if !deliver(&tx, &cancel, decode_event(&data, compliance)).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "event stream read failed");
                    fail(&tx, &cancel, e.to_string()).await;
                    break;
                }
                None => {
                    if let Some(data) = decoder.finish() {
                        deliver(&tx, &cancel, decode_event(&data, compliance)).await;
                    }
                    info!("event stream ended by server");
                    break;
                }
            }
        }
    }
}

async fn fail(tx: &mpsc::Sender<StreamEvent>, cancel: &CancellationToken, reason: String) {
    deliver(tx, cancel, StreamEvent::failed(EventError::Stream(reason))).await;
}

/// Returns `false` once the consumer is gone or cancellation was requested.
async fn deliver(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut d = SseDecoder::default();
        assert!(d.feed(b": keepalive\ndata: {\"a\"").is_empty());
        assert_eq!(d.feed(b":1}\n\ndata: x\r\n"), vec![r#"{"a":1}"#.to_string()]);
        assert_eq!(d.feed(b"data: y\n\n"), vec!["x\ny".to_string()]);
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn unterminated_event_flushed_at_end() {
        let mut d = SseDecoder::default();
        assert!(d.feed(b"event: update\nid: 7\ndata: last").is_empty());
        assert_eq!(d.finish(), Some("last".to_string()));
    }

    #[test]
    fn decodes_wrapped_event() {
        let data = json!({
            "ietf-restconf:notification": {
                "eventTime": "2024-03-01T10:20:30-05:00",
                "event": {"m:x": {"y": 1}}
            }
        })
        .to_string();
        let ev = decode_event(&data, ComplianceOptions::STRICT);
        assert_eq!(ev.payload.unwrap(), json!({"m:x": {"y": 1}}));
        assert_eq!(ev.timestamp.to_rfc3339(), "2024-03-01T15:20:30+00:00");
    }

    #[test]
    fn structural_violations_carry_reasons() {
        let strict = ComplianceOptions::STRICT;
        let reason = |data: &str| decode_event(data, strict).payload.unwrap_err();

        assert_eq!(reason(r#"{"unexpected":"shape"}"#), EventError::MissingWrapper);
        assert_eq!(
            reason(r#"{"ietf-restconf:notification":{"eventTime":"2024-03-01T10:20:30-05:00"}}"#),
            EventError::MissingEvent
        );
        assert_eq!(
            reason(r#"{"ietf-restconf:notification":{"event":{}}}"#),
            EventError::MissingEventTime
        );
        assert_eq!(
            reason(r#"{"ietf-restconf:notification":{"event":{},"eventTime":"yesterday"}}"#),
            EventError::BadEventTime("yesterday".into())
        );
        assert!(matches!(reason("{not json"), EventError::Malformed(_)));
        assert_eq!(
            EventError::BadEventTime("yesterday".into()).to_string(),
            "eventTime in wrong format 'yesterday'"
        );
    }

    #[test]
    fn unwrapped_mode_takes_whole_payload() {
        let ev = decode_event(r#"{"x":1}"#, ComplianceOptions::SIMPLIFIED);
        assert_eq!(ev.payload.unwrap(), json!({"x": 1}));
    }
}
