// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-plane tools: subscription CRUD, event payload fetch, and tunnel
//! control. Each tool takes a JSON arguments object and returns a JSON
//! result, so the dispatch layer stays uniform.

use async_trait::async_trait;
use hookwire_core::{HookwireError, SubscriptionStatus};
use hookwire_storage::{NewSubscription, Store};
use hookwire_tunnel::{TunnelMode, TunnelStatus, TunnelSupervisor};
use serde_json::{json, Value};
use std::time::Duration;

/// How long tunnel-start tools wait for activation before reporting the
/// in-flight status.
const TUNNEL_START_WAIT: Duration = Duration::from_secs(10);

/// Failure of one tool invocation.
#[derive(Debug)]
pub enum ToolError {
    /// Missing or ill-typed argument.
    InvalidArguments(String),
    /// Referenced entity does not exist.
    NotFound(String),
    /// Everything else; carries a human-readable message.
    Internal(String),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Internal(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<HookwireError> for ToolError {
    fn from(e: HookwireError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// A named control-plane operation with a uniform JSON signature.
#[async_trait]
pub trait ControlTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

// --- argument helpers ---

fn required_str(args: &Value, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required field: {key}")))
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// Three-way patch semantics for partial updates: an absent key keeps the
/// stored value, JSON `null` clears it, a string replaces it.
enum Patch {
    Keep,
    Clear,
    Set(String),
}

fn patch(args: &Value, key: &str) -> Patch {
    match args.get(key) {
        None => Patch::Keep,
        Some(Value::Null) => Patch::Clear,
        Some(Value::String(s)) if s.is_empty() => Patch::Clear,
        Some(Value::String(s)) => Patch::Set(s.clone()),
        Some(_) => Patch::Keep,
    }
}

fn apply(field: &mut Option<String>, p: Patch) {
    match p {
        Patch::Keep => {}
        Patch::Clear => *field = None,
        Patch::Set(value) => *field = Some(value),
    }
}

fn tunnel_status_json(status: &TunnelStatus) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("status".to_string(), json!(status.state.to_string()));
    if let Some(url) = &status.public_url {
        obj.insert("public_url".to_string(), json!(url));
    }
    Value::Object(obj)
}

// --- subscription tools ---

pub struct CreateSubscriptionTool {
    pub store: Store,
    pub supervisor: TunnelSupervisor,
    pub local_port: u16,
}

#[async_trait]
impl ControlTool for CreateSubscriptionTool {
    fn name(&self) -> &'static str {
        "create_subscription"
    }

    fn description(&self) -> &'static str {
        "Create a webhook subscription targeting a local session. A one_shot \
         subscription is deleted after its first successful delivery."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let session_id = required_str(&args, "session_id")?;

        // The id is allocated here so the webhook URL can embed it.
        let id = uuid::Uuid::new_v4().to_string();
        let base = self
            .supervisor
            .public_url()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.local_port));
        let webhook_url = format!("{base}/webhook/{id}");

        let sub = self
            .store
            .create_subscription(NewSubscription {
                id: Some(id),
                session_id,
                webhook_url,
                secret: optional_str(&args, "hmac_secret"),
                signature_header: optional_str(&args, "hmac_header"),
                display_name: optional_str(&args, "name"),
                service_tag: optional_str(&args, "service"),
                prompt: optional_str(&args, "prompt"),
                gate_expr: optional_str(&args, "jq_filter"),
                summary_expr: optional_str(&args, "summary_filter"),
                one_shot: optional_bool(&args, "one_shot").unwrap_or(false),
            })
            .await?;

        Ok(json!({ "id": sub.id, "webhook_url": sub.webhook_url }))
    }
}

pub struct ListSubscriptionsTool {
    pub store: Store,
}

#[async_trait]
impl ControlTool for ListSubscriptionsTool {
    fn name(&self) -> &'static str {
        "list_subscriptions"
    }

    fn description(&self) -> &'static str {
        "List subscriptions, optionally filtered by session_id."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let subs = match optional_str(&args, "session_id") {
            Some(session_id) => {
                self.store
                    .list_subscriptions_by_session(&session_id)
                    .await?
            }
            None => self.store.list_subscriptions().await?,
        };
        serde_json::to_value(subs)
            .map_err(|e| ToolError::Internal(format!("serialization failed: {e}")))
    }
}

pub struct UpdateSubscriptionTool {
    pub store: Store,
}

#[async_trait]
impl ControlTool for UpdateSubscriptionTool {
    fn name(&self) -> &'static str {
        "update_subscription"
    }

    fn description(&self) -> &'static str {
        "Update fields of a subscription. Absent fields keep their value; \
         null clears an optional field."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let id = required_str(&args, "id")?;
        let Some(mut sub) = self.store.get_subscription(&id).await? else {
            return Err(ToolError::NotFound(format!("subscription {id}")));
        };

        if let Some(session_id) = optional_str(&args, "session_id") {
            sub.session_id = session_id;
        }
        apply(&mut sub.service_tag, patch(&args, "service"));
        apply(&mut sub.display_name, patch(&args, "name"));
        apply(&mut sub.secret, patch(&args, "hmac_secret"));
        apply(&mut sub.signature_header, patch(&args, "hmac_header"));
        apply(&mut sub.prompt, patch(&args, "prompt"));
        apply(&mut sub.gate_expr, patch(&args, "jq_filter"));
        apply(&mut sub.summary_expr, patch(&args, "summary_filter"));
        if let Some(one_shot) = optional_bool(&args, "one_shot") {
            sub.one_shot = one_shot;
        }
        if let Some(status) = optional_str(&args, "status") {
            sub.status = status
                .parse::<SubscriptionStatus>()
                .map_err(ToolError::InvalidArguments)?;
        }

        let updated = self.store.update_subscription(sub).await?;
        serde_json::to_value(updated)
            .map_err(|e| ToolError::Internal(format!("serialization failed: {e}")))
    }
}

pub struct DeleteSubscriptionTool {
    pub store: Store,
}

#[async_trait]
impl ControlTool for DeleteSubscriptionTool {
    fn name(&self) -> &'static str {
        "delete_subscription"
    }

    fn description(&self) -> &'static str {
        "Delete a subscription and its events and queued deliveries. Idempotent."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let id = required_str(&args, "id")?;
        self.store.delete_subscription(&id).await?;
        Ok(json!({ "id": id, "deleted": true }))
    }
}

pub struct GetEventPayloadTool {
    pub store: Store,
}

#[async_trait]
impl ControlTool for GetEventPayloadTool {
    fn name(&self) -> &'static str {
        "get_event_payload"
    }

    fn description(&self) -> &'static str {
        "Fetch the full stored payload of one event."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let event_id = required_str(&args, "event_id")?;
        let Some(event) = self.store.get_event(&event_id).await? else {
            return Err(ToolError::NotFound(format!("event {event_id}")));
        };
        Ok(json!({ "event_id": event.id, "payload": event.payload }))
    }
}

pub struct GetPublicWebhookUrlTool {
    pub store: Store,
    pub supervisor: TunnelSupervisor,
}

#[async_trait]
impl ControlTool for GetPublicWebhookUrlTool {
    fn name(&self) -> &'static str {
        "get_public_webhook_url"
    }

    fn description(&self) -> &'static str {
        "The externally-reachable URL for a subscription, via the tunnel."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let subscription_id = required_str(&args, "subscription_id")?;
        if self
            .store
            .get_subscription(&subscription_id)
            .await?
            .is_none()
        {
            return Err(ToolError::NotFound(format!(
                "subscription {subscription_id}"
            )));
        }
        let Some(base) = self.supervisor.public_url() else {
            return Err(ToolError::Internal(
                "tunnel is not active; no public URL available".to_string(),
            ));
        };
        Ok(json!({ "url": format!("{base}/webhook/{subscription_id}") }))
    }
}

// --- tunnel tools ---

pub struct StartTunnelTool {
    pub supervisor: TunnelSupervisor,
}

#[async_trait]
impl ControlTool for StartTunnelTool {
    fn name(&self) -> &'static str {
        "start_tunnel"
    }

    fn description(&self) -> &'static str {
        "Start the named tunnel (requires a prepared cloudflared config)."
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        self.supervisor
            .start(TunnelMode::Named)
            .await
            .map_err(ToolError::from)?;
        let status = self.supervisor.wait_until_active(TUNNEL_START_WAIT).await;
        Ok(tunnel_status_json(&status))
    }
}

pub struct StartQuickTunnelTool {
    pub supervisor: TunnelSupervisor,
}

#[async_trait]
impl ControlTool for StartQuickTunnelTool {
    fn name(&self) -> &'static str {
        "start_quick_tunnel"
    }

    fn description(&self) -> &'static str {
        "Start an ephemeral quick tunnel (trycloudflare.com URL, no config)."
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        self.supervisor
            .start(TunnelMode::Quick)
            .await
            .map_err(ToolError::from)?;
        let status = self.supervisor.wait_until_active(TUNNEL_START_WAIT).await;
        Ok(tunnel_status_json(&status))
    }
}

pub struct StopTunnelTool {
    pub supervisor: TunnelSupervisor,
}

#[async_trait]
impl ControlTool for StopTunnelTool {
    fn name(&self) -> &'static str {
        "stop_tunnel"
    }

    fn description(&self) -> &'static str {
        "Stop the tunnel. The child is SIGTERMed, then killed after a drain period."
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        self.supervisor.stop();
        Ok(tunnel_status_json(&self.supervisor.status()))
    }
}

pub struct GetTunnelStatusTool {
    pub supervisor: TunnelSupervisor,
}

#[async_trait]
impl ControlTool for GetTunnelStatusTool {
    fn name(&self) -> &'static str {
        "get_tunnel_status"
    }

    fn description(&self) -> &'static str {
        "Current tunnel state and public URL."
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(tunnel_status_json(&self.supervisor.status()))
    }
}
