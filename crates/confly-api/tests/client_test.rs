#![allow(clippy::unwrap_used)]
// Integration tests for the RESTCONF driver against a wiremock server.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::{Mock, MockServer, ResponseTemplate};

use confly_api::{ComplianceOptions, ConnectionConfig, Device};
use confly_core::{Definition, Permission, Role, Selection};

// ── Helpers ─────────────────────────────────────────────────────────

fn car() -> Arc<Definition> {
    Definition::module(
        "car",
        vec![
            Definition::container(
                "engine",
                vec![
                    Definition::leaf("speed"),
                    Definition::leaf("mode"),
                    Definition::notification("overheat", vec![Definition::leaf("temp")]),
                ],
            ),
            Definition::list(
                "tire",
                &["pos"],
                vec![Definition::leaf("pos"), Definition::leaf("wear")],
            ),
            Definition::action(
                "reset",
                Some(vec![Definition::leaf("delay")]),
                Some(vec![Definition::leaf("ok")]),
            ),
            Definition::notification("alarm", vec![Definition::leaf("code")]),
        ],
    )
}

async fn setup(compliance: ComplianceOptions) -> (MockServer, Device) {
    let server = MockServer::start().await;
    let config = ConnectionConfig {
        compliance,
        ..ConnectionConfig::new(format!("{}/restconf", server.uri()))
    };
    let device = Device::connect(&config).unwrap();
    device.register(car());
    (server, device)
}

async fn root(device: &Device) -> Selection {
    device.browser("car").await.unwrap().root()
}

async fn mount_options(server: &MockServer, target: &str) {
    Mock::given(method("OPTIONS"))
        .and(path(format!("/restconf/data/car:{target}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

// ── Read tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_leaf_through_navigation() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;

    Mock::given(method("GET"))
        .and(path("/restconf/data/car:engine"))
        .and(header("accept", "application/yang-data+json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"car:engine": {"speed": 88}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = root(&device).await.find("engine").await.unwrap().unwrap();
    assert_eq!(engine.get("speed").await.unwrap(), Some(json!(88)));
    assert_eq!(engine.get("mode").await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_target_is_absent() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;

    Mock::given(method("OPTIONS"))
        .and(path("/restconf/data/car:engine"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let engine = root(&device).await.find("engine").await.unwrap();
    assert!(engine.is_none());
}

#[tokio::test]
async fn test_server_error_keeps_status() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;

    Mock::given(method("GET"))
        .and(path("/restconf/data/car:engine"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine on fire"))
        .mount(&server)
        .await;

    let engine = root(&device).await.find("engine").await.unwrap().unwrap();
    let err = engine.get("speed").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "(500) engine on fire");
}

#[tokio::test]
async fn test_export_list() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "tire").await;

    Mock::given(method("GET"))
        .and(path("/restconf/data/car:tire"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "car:tire": [
                {"pos": "fl", "wear": 10},
                {"pos": "fr", "wear": 12}
            ]
        })))
        .mount(&server)
        .await;

    let tires = root(&device).await.find("tire").await.unwrap().unwrap();
    assert_eq!(
        tires.to_json().await.unwrap(),
        json!([
            {"pos": "fl", "wear": 10},
            {"pos": "fr", "wear": 12}
        ])
    );
}

// ── Edit tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_leaf_prefetches_then_puts() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;

    Mock::given(method("GET"))
        .and(path("/restconf/data/car:engine"))
        .and(query_param("depth", "1"))
        .and(query_param("content", "config"))
        .and(query_param("with-defaults", "trim"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"car:engine": {"speed": 10, "mode": "eco"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/restconf/data/car:engine"))
        .and(header("content-type", "application/yang-data+json"))
        .and(body_json(json!({"car:speed": 20, "car:mode": "eco"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let engine = root(&device).await.find("engine").await.unwrap().unwrap();
    engine.set("speed", 20).await.unwrap();
}

#[tokio::test]
async fn test_read_only_role_is_refused_before_prefetch() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;
    for verb in ["GET", "PUT", "POST"] {
        Mock::given(method(verb))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
    }

    let reader = Role::new("reader").with_grant("car", Permission::Read);
    let engine = root(&device)
        .await
        .with_role(reader)
        .find("engine")
        .await
        .unwrap()
        .unwrap();
    let err = engine.set("speed", 20).await.unwrap_err();
    assert!(err.is_unauthorized(), "got {err}");
}

#[tokio::test]
async fn test_leaf_grant_allows_edit_under_read_only_parent() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;
    Mock::given(method("GET"))
        .and(path("/restconf/data/car:engine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"car:engine": {}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/restconf/data/car:engine"))
        .and(body_json(json!({"car:speed": 30})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let role = Role::new("driver")
        .with_grant("car", Permission::Read)
        .with_grant("car/engine/speed", Permission::Write);
    let engine = root(&device)
        .await
        .with_role(role)
        .find("engine")
        .await
        .unwrap()
        .unwrap();
    engine.set("speed", 30).await.unwrap();
}

#[tokio::test]
async fn test_delete_list_entry() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "tire=fl").await;

    Mock::given(method("DELETE"))
        .and(path("/restconf/data/car:tire=fl"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    root(&device).await.delete("tire=fl").await.unwrap();
}

// ── Action tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_module_rpc_goes_to_operations() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;

    Mock::given(method("POST"))
        .and(path("/restconf/operations/car:reset"))
        .and(body_json(json!({"car:input": {"car:delay": 5}})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"car:output": {"car:ok": true}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let output = root(&device)
        .await
        .action("reset", Some(json!({"delay": 5})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.get("ok").await.unwrap(), Some(json!(true)));
}

#[tokio::test]
async fn test_simplified_rpc_is_bare_under_data() {
    let (server, device) = setup(ComplianceOptions::SIMPLIFIED).await;

    Mock::given(method("POST"))
        .and(path("/restconf/data/car:reset"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"delay": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
        .expect(1)
        .mount(&server)
        .await;

    let output = root(&device)
        .await
        .action("reset", Some(json!({"delay": 5})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.get("ok").await.unwrap(), Some(json!(false)));
}

#[tokio::test]
async fn test_action_without_output_wrapper_fails() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;

    Mock::given(method("POST"))
        .and(path("/restconf/operations/car:reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let err = root(&device).await.action("reset", None).await.unwrap_err();
    assert!(
        err.to_string().contains("'car:output' missing in output wrapper"),
        "unexpected error: {err}"
    );
}

// ── Subscription tests ──────────────────────────────────────────────

#[tokio::test]
async fn test_event_stream_delivers_events_and_errors() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;

    let good = json!({
        "ietf-restconf:notification": {
            "eventTime": "2024-03-01T10:20:30+00:00",
            "event": {"car:temp": 130}
        }
    });
    let body = format!("data: {good}\n\ndata: {{\"bogus\":1}}\n\n");

    Mock::given(method("GET"))
        .and(path("/restconf/data/car:engine/overheat"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let engine = root(&device).await.find("engine").await.unwrap().unwrap();
    let mut sub = engine.notifications("overheat").await.unwrap();

    let first = sub.recv().await.unwrap();
    assert_eq!(first.event_time.to_rfc3339(), "2024-03-01T10:20:30+00:00");
    let event = first.event.unwrap();
    assert_eq!(event.get("temp").await.unwrap(), Some(json!(130)));

    let second = sub.recv().await.unwrap();
    assert!(second.is_error());
    assert_eq!(
        second.event.unwrap_err().to_string(),
        "malformed payload: missing notification wrapper"
    );

    assert!(sub.recv().await.is_none());
}

fn alarm_frame(code: u32) -> String {
    let event = json!({
        "ietf-restconf:notification": {
            "eventTime": "2024-03-01T10:20:30+00:00",
            "event": {"car:code": code}
        }
    });
    format!("data: {event}\n\n")
}

/// Serves one event stream that sends `first` and then stays open. The
/// receiver fires once the client hangs up.
async fn hold_stream(first: String) -> (String, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            head.extend_from_slice(&buf[..n]);
        }
        let reply = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/event-stream\r\n\
             Transfer-Encoding: chunked\r\n\r\n\
             {:x}\r\n{first}\r\n",
            first.len()
        );
        socket.write_all(reply.as_bytes()).await.unwrap();

        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    (format!("http://{addr}/restconf"), closed_rx)
}

#[tokio::test]
async fn test_cancel_closes_live_stream() {
    let (url, closed) = hold_stream(alarm_frame(7)).await;
    let device = Device::connect(&ConnectionConfig::new(url)).unwrap();
    device.register(car());

    let mut sub = root(&device).await.notifications("alarm").await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap();
    let event = first.event.unwrap();
    assert_eq!(event.get("code").await.unwrap(), Some(json!(7)));

    sub.cancel();
    assert!(sub.recv().await.is_none());
    tokio::time::timeout(Duration::from_secs(5), closed)
        .await
        .expect("connection still open after cancel")
        .unwrap();
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn test_cancel_drops_events_already_sent() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    let body = format!("{}{}{}", alarm_frame(1), alarm_frame(2), alarm_frame(3));
    Mock::given(method("GET"))
        .and(path("/restconf/data/car:alarm"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut sub = root(&device).await.notifications("alarm").await.unwrap();
    let first = sub.recv().await.unwrap().event.unwrap();
    assert_eq!(first.get("code").await.unwrap(), Some(json!(1)));

    sub.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn test_rejected_stream_is_delivered_in_band() {
    let (server, device) = setup(ComplianceOptions::STRICT).await;
    mount_options(&server, "engine").await;

    Mock::given(method("GET"))
        .and(path("/restconf/data/car:engine/overheat"))
        .respond_with(ResponseTemplate::new(403).set_body_string("no"))
        .mount(&server)
        .await;

    let engine = root(&device).await.find("engine").await.unwrap().unwrap();
    let mut sub = engine.notifications("overheat").await.unwrap();
    let event = sub.recv().await.unwrap();
    let err = event.event.unwrap_err();
    assert!(err.to_string().contains("(403) no"), "unexpected error: {err}");
    assert!(sub.recv().await.is_none());
}

// ── Schema tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_module_fetched_from_schema_endpoint_once() {
    let server = MockServer::start().await;
    let device = Device::connect(&ConnectionConfig::new(format!(
        "{}/restconf",
        server.uri()
    )))
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/restconf/schema/car.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(car().as_ref()))
        .expect(1)
        .mount(&server)
        .await;

    let browser = device.browser("car").await.unwrap();
    assert_eq!(browser.module().ident, "car");
    device.browser("car").await.unwrap();
    assert_eq!(device.modules(), vec!["car".to_string()]);
}

#[tokio::test]
async fn test_local_schema_dir_wins() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("car.json"),
        serde_json::to_string(car().as_ref()).unwrap(),
    )
    .unwrap();

    let config = ConnectionConfig {
        schema_dir: Some(dir.path().to_path_buf()),
        ..ConnectionConfig::new(format!("{}/restconf", server.uri()))
    };
    let device = Device::connect(&config).unwrap();
    device.browser("car").await.unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_module() {
    let server = MockServer::start().await;
    let device = Device::connect(&ConnectionConfig::new(format!(
        "{}/restconf",
        server.uri()
    )))
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/restconf/schema/boat.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = device.browser("boat").await.unwrap_err();
    assert!(matches!(err, confly_api::Error::ModuleNotFound(ref m) if m == "boat"));
}
