// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the complete webhook pipeline.
//!
//! Each test assembles an isolated broker (temp SQLite, temp socket
//! directory, ephemeral port) through the same wiring the `serve` command
//! uses. Tests are independent and order-insensitive.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use hookwire::app::Broker;
use hookwire_config::BrokerConfig;
use hookwire_pipeline::verify::sign;
use hookwire_test_utils::MockSession;
use hookwire_tunnel::{TunnelSupervisor, TunnelTimings};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

struct Harness {
    broker: Option<Broker>,
    addr: SocketAddr,
    socket_dir: tempfile::TempDir,
    cancel: CancellationToken,
    _db_dir: tempfile::TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(tweak: impl FnOnce(&mut BrokerConfig)) -> Self {
        let db_dir = tempfile::tempdir().unwrap();
        let socket_dir = tempfile::tempdir().unwrap();

        let mut config = BrokerConfig::default();
        config.ingress.port = 0;
        config.storage.database_path = db_dir
            .path()
            .join("hookwire.db")
            .to_string_lossy()
            .into_owned();
        config.sessions.socket_dir = socket_dir.path().to_string_lossy().into_owned();
        config.tunnel.support_dir = db_dir.path().to_string_lossy().into_owned();
        config.tunnel.config_path = db_dir
            .path()
            .join("cloudflared.yml")
            .to_string_lossy()
            .into_owned();
        tweak(&mut config);

        let cancel = CancellationToken::new();
        let broker = Broker::start(config, cancel.clone()).await.unwrap();
        let addr = broker.local_addr;
        Self {
            broker: Some(broker),
            addr,
            socket_dir,
            cancel,
            _db_dir: db_dir,
        }
    }

    fn broker(&self) -> &Broker {
        self.broker.as_ref().expect("broker running")
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Call a control-plane tool over JSON-RPC and return the result.
    async fn rpc(&self, tool: &str, arguments: Value) -> Value {
        let body: Value = reqwest::Client::new()
            .post(self.url("/mcp"))
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": tool, "arguments": arguments },
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(
            body.get("error").is_none(),
            "tool {tool} failed: {body}"
        );
        body["result"].clone()
    }

    async fn shutdown(mut self) {
        if let Some(broker) = self.broker.take() {
            broker.shutdown().await.unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn jq_available() -> bool {
    std::process::Command::new("jq")
        .arg("--version")
        .output()
        .is_ok()
}

// ---- Scenario 1: GitHub push with valid signature ----

#[tokio::test]
async fn github_push_with_valid_signature_is_injected() {
    if !jq_available() {
        eprintln!("jq not installed; skipping");
        return;
    }
    let harness = Harness::start().await;
    let session = MockSession::start(harness.socket_dir.path(), "agent-1").unwrap();

    let created = harness
        .rpc(
            "create_subscription",
            json!({
                "session_id": "agent-1",
                "service": "github",
                "hmac_secret": "abc",
                "hmac_header": "X-Hub-Signature-256",
                "summary_filter": "{branch: .ref}",
            }),
        )
        .await;
    let sub_id = created["id"].as_str().unwrap().to_string();

    let body = r#"{"ref":"refs/heads/main"}"#;
    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .header("X-Hub-Signature-256", format!("sha256={}", sign("abc", body.as_bytes())))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let accepted: Value = response.json().await.unwrap();
    assert_eq!(accepted["status"], "accepted");

    session.wait_for_lines(1).await;
    let values = session.received_values();
    assert_eq!(values.len(), 1);
    assert!(
        values[0].contains("<payload>\n{\"branch\":\"refs/heads/main\"}\n</payload>"),
        "frame was: {}",
        values[0]
    );

    let subs = harness.rpc("list_subscriptions", json!({})).await;
    let sub = &subs.as_array().unwrap()[0];
    assert_eq!(sub["event_count"], 1);

    let events = harness
        .broker()
        .store
        .list_events(&sub_id, 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].injected);

    harness.shutdown().await;
}

// ---- Scenario 2: invalid signature rejected ----

#[tokio::test]
async fn invalid_signature_is_rejected_and_logged() {
    let harness = Harness::start().await;
    let session = MockSession::start(harness.socket_dir.path(), "agent-1").unwrap();

    let created = harness
        .rpc(
            "create_subscription",
            json!({"session_id": "agent-1", "hmac_secret": "abc"}),
        )
        .await;
    let sub_id = created["id"].as_str().unwrap().to_string();

    // Signature over the original body, but the body changed in flight.
    let stale_signature = format!("sha256={}", sign("abc", b"{\"ref\":\"original\"}"));
    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .header("X-Hub-Signature-256", stale_signature)
        .body(r#"{"ref":"tampered"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let rejected: Value = response.json().await.unwrap();
    assert_eq!(rejected["error"], "invalid_signature");

    let events = harness
        .broker()
        .store
        .list_events(&sub_id, 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].verification_result.to_string(), "rejected");
    assert!(!events[0].injected);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.received_lines().is_empty());

    harness.shutdown().await;
}

// ---- Scenario 3: gate filter drops event ----

#[tokio::test]
async fn gate_filter_drop_leaves_no_trace() {
    if !jq_available() {
        eprintln!("jq not installed; skipping");
        return;
    }
    let harness = Harness::start().await;
    let session = MockSession::start(harness.socket_dir.path(), "agent-1").unwrap();

    let created = harness
        .rpc(
            "create_subscription",
            json!({
                "session_id": "agent-1",
                "jq_filter": r#".action == "opened" | select(.)"#,
            }),
        )
        .await;
    let sub_id = created["id"].as_str().unwrap().to_string();

    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .body(r#"{"action":"closed"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let store = &harness.broker().store;
    assert!(store.list_events(&sub_id, 10).await.unwrap().is_empty());
    assert!(store
        .list_queued_for_session("agent-1")
        .await
        .unwrap()
        .is_empty());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.received_lines().is_empty());

    harness.shutdown().await;
}

// ---- Scenario 4: offline session queues, then drains on appearance ----

#[tokio::test]
async fn offline_session_queues_and_drains_on_appearance() {
    let harness = Harness::start().await;

    let created = harness
        .rpc("create_subscription", json!({"session_id": "late-agent"}))
        .await;
    let sub_id = created["id"].as_str().unwrap().to_string();

    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .body(r#"{"n":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let store = &harness.broker().store;
    let events = store.list_events(&sub_id, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].injected);
    let queued = store.list_queued_for_session("late-agent").await.unwrap();
    assert_eq!(queued.len(), 1);
    assert!(queued[0].framed_payload.starts_with("<webhook-event"));

    // Session comes online; the watcher notices and the queue drains.
    let session = MockSession::start(harness.socket_dir.path(), "late-agent").unwrap();
    session.wait_for_lines(1).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let queued = store.list_queued_for_session("late-agent").await.unwrap();
        if queued.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "queue did not drain in time"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let events = store.list_events(&sub_id, 10).await.unwrap();
    assert!(events[0].injected);
    let sub = store.get_subscription(&sub_id).await.unwrap().unwrap();
    assert_eq!(sub.event_count, 1);

    harness.shutdown().await;
}

// ---- Scenario 5: rate limit ----

#[tokio::test]
async fn fourth_request_in_window_is_rate_limited() {
    let harness = Harness::start_with(|config| {
        config.ratelimit.max_requests = 3;
        config.ratelimit.window_secs = 60;
    })
    .await;

    let client = reqwest::Client::new();
    let url = harness.url("/webhook/no-such-subscription");
    for _ in 0..3 {
        let status = client.post(&url).body("{}").send().await.unwrap().status();
        assert_eq!(status, 404, "pre-cap requests see their normal outcome");
    }
    let status = client.post(&url).body("{}").send().await.unwrap().status();
    assert_eq!(status, 429);

    harness.shutdown().await;
}

// ---- Scenario 6: tunnel lifecycle through the control plane ----

#[tokio::test]
async fn quick_tunnel_starts_and_reports_url_through_rpc() {
    let db_dir = tempfile::tempdir().unwrap();
    let socket_dir = tempfile::tempdir().unwrap();

    let mut config = BrokerConfig::default();
    config.ingress.port = 0;
    config.storage.database_path = db_dir
        .path()
        .join("hookwire.db")
        .to_string_lossy()
        .into_owned();
    config.sessions.socket_dir = socket_dir.path().to_string_lossy().into_owned();
    config.tunnel.support_dir = db_dir.path().to_string_lossy().into_owned();
    config.tunnel.config_path = db_dir
        .path()
        .join("cloudflared.yml")
        .to_string_lossy()
        .into_owned();

    // Fake cloudflared that announces a quick-tunnel URL and stays up.
    let fake = db_dir.path().join("fake-cloudflared");
    std::fs::write(
        &fake,
        "#!/bin/sh\necho 'INF +  https://mock-tunnel-e2e.trycloudflare.com  +' >&2\nsleep 60\n",
    )
    .unwrap();
    std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

    let supervisor = TunnelSupervisor::new(config.tunnel.clone(), config.ingress.port)
        .with_binary(&fake)
        .with_timings(TunnelTimings {
            named_grace: Duration::from_millis(100),
            quick_timeout: Duration::from_secs(5),
            restart_backoff: Duration::from_millis(100),
            term_drain: Duration::from_millis(200),
        });

    let cancel = CancellationToken::new();
    let broker = Broker::start_with_tunnel(config, cancel.clone(), supervisor)
        .await
        .unwrap();
    let addr = broker.local_addr;

    let client = reqwest::Client::new();
    let rpc = |tool: &'static str, arguments: Value| {
        let client = client.clone();
        async move {
            let body: Value = client
                .post(format!("http://{addr}/mcp"))
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "tools/call",
                    "params": { "name": tool, "arguments": arguments },
                }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body
        }
    };

    let started = rpc("start_quick_tunnel", json!({})).await;
    assert_eq!(started["result"]["status"], "active");
    assert_eq!(
        started["result"]["public_url"],
        "https://mock-tunnel-e2e.trycloudflare.com"
    );

    // Subscriptions created now derive their URL from the tunnel.
    let created = rpc("create_subscription", json!({"session_id": "s"})).await;
    let webhook_url = created["result"]["webhook_url"].as_str().unwrap();
    assert!(webhook_url.starts_with("https://mock-tunnel-e2e.trycloudflare.com/webhook/"));

    let sub_id = created["result"]["id"].as_str().unwrap();
    let public = rpc(
        "get_public_webhook_url",
        json!({"subscription_id": sub_id}),
    )
    .await;
    assert_eq!(
        public["result"]["url"].as_str().unwrap(),
        format!("https://mock-tunnel-e2e.trycloudflare.com/webhook/{sub_id}")
    );

    let stopped = rpc("stop_tunnel", json!({})).await;
    assert_eq!(stopped["result"]["status"], "inactive");

    broker.shutdown().await.unwrap();
}

// ---- One-shot enforcement through the full stack ----

#[tokio::test]
async fn one_shot_subscription_removed_after_first_delivery() {
    let harness = Harness::start().await;
    let session = MockSession::start(harness.socket_dir.path(), "agent-1").unwrap();

    let created = harness
        .rpc(
            "create_subscription",
            json!({"session_id": "agent-1", "one_shot": true}),
        )
        .await;
    let sub_id = created["id"].as_str().unwrap().to_string();

    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    session.wait_for_lines(1).await;

    // The subscription retired itself after the successful delivery.
    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    harness.shutdown().await;
}

// ---- Paused subscriptions through the control plane ----

#[tokio::test]
async fn paused_subscription_rejects_deliveries() {
    let harness = Harness::start().await;

    let created = harness
        .rpc("create_subscription", json!({"session_id": "agent-1"}))
        .await;
    let sub_id = created["id"].as_str().unwrap().to_string();

    harness
        .rpc(
            "update_subscription",
            json!({"id": sub_id, "status": "paused"}),
        )
        .await;

    let response = reqwest::Client::new()
        .post(harness.url(&format!("/webhook/{sub_id}")))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "paused");

    harness.shutdown().await;
}

// ---- Restart durability of the queue ----

#[tokio::test]
async fn queued_events_survive_broker_restart() {
    let db_dir = tempfile::tempdir().unwrap();
    let socket_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("hookwire.db").to_string_lossy().into_owned();

    let make_config = || {
        let mut config = BrokerConfig::default();
        config.ingress.port = 0;
        config.storage.database_path = db_path.clone();
        config.sessions.socket_dir = socket_dir.path().to_string_lossy().into_owned();
        config.tunnel.support_dir = db_dir.path().to_string_lossy().into_owned();
        config.tunnel.config_path = db_dir
            .path()
            .join("cloudflared.yml")
            .to_string_lossy()
            .into_owned();
        config
    };

    // First broker: accept a delivery for an offline session, then stop.
    let cancel = CancellationToken::new();
    let broker = Broker::start(make_config(), cancel.clone()).await.unwrap();
    let addr = broker.local_addr;

    let created: Value = reqwest::Client::new()
        .post(format!("http://{addr}/mcp"))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "create_subscription", "arguments": {"session_id": "later"}},
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sub_id = created["result"]["id"].as_str().unwrap().to_string();

    reqwest::Client::new()
        .post(format!("http://{addr}/webhook/{sub_id}"))
        .body(r#"{"n":1}"#)
        .send()
        .await
        .unwrap();
    broker.shutdown().await.unwrap();

    // Second broker: the queue entry is still there and drains when the
    // session appears.
    let cancel = CancellationToken::new();
    let broker = Broker::start(make_config(), cancel.clone()).await.unwrap();
    assert_eq!(
        broker
            .store
            .list_queued_for_session("later")
            .await
            .unwrap()
            .len(),
        1
    );

    let session = MockSession::start(socket_dir.path(), "later").unwrap();
    session.wait_for_lines(1).await;
    assert!(session.received_values()[0].contains("{\"n\":1}"));

    broker.shutdown().await.unwrap();
}
