// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The control plane: tool-call dispatch plus notification fan-out.
//!
//! Tools are looked up in a registry keyed by name; every tool shares one
//! JSON-in/JSON-out signature. The notification side forwards every Store
//! change signal and every tunnel state transition as an SSE frame to all
//! registered streams.

pub mod hub;
pub mod tools;

use std::collections::HashMap;
use std::sync::Arc;

use hookwire_storage::Store;
use hookwire_tunnel::TunnelSupervisor;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use hub::{NotificationHub, SseFrame};
pub use tools::{ControlTool, ToolError};

use tools::{
    CreateSubscriptionTool, DeleteSubscriptionTool, GetEventPayloadTool,
    GetPublicWebhookUrlTool, GetTunnelStatusTool, ListSubscriptionsTool,
    StartQuickTunnelTool, StartTunnelTool, StopTunnelTool, UpdateSubscriptionTool,
};

/// Failure of one dispatch call, as seen by the RPC layer.
#[derive(Debug)]
pub enum DispatchError {
    /// No tool with that name.
    UnknownTool(String),
    /// The tool ran and failed.
    Tool(ToolError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::Tool(e) => write!(f, "{e}"),
        }
    }
}

/// Tool dispatch and notification fan-out for the `/mcp` surface.
#[derive(Clone)]
pub struct ControlPlane {
    tools: Arc<HashMap<&'static str, Arc<dyn ControlTool>>>,
    hub: NotificationHub,
    store: Store,
    supervisor: TunnelSupervisor,
}

impl ControlPlane {
    pub fn new(store: Store, supervisor: TunnelSupervisor, local_port: u16) -> Self {
        let all: Vec<Arc<dyn ControlTool>> = vec![
            Arc::new(CreateSubscriptionTool {
                store: store.clone(),
                supervisor: supervisor.clone(),
                local_port,
            }),
            Arc::new(ListSubscriptionsTool {
                store: store.clone(),
            }),
            Arc::new(UpdateSubscriptionTool {
                store: store.clone(),
            }),
            Arc::new(DeleteSubscriptionTool {
                store: store.clone(),
            }),
            Arc::new(GetEventPayloadTool {
                store: store.clone(),
            }),
            Arc::new(GetPublicWebhookUrlTool {
                store: store.clone(),
                supervisor: supervisor.clone(),
            }),
            Arc::new(StartTunnelTool {
                supervisor: supervisor.clone(),
            }),
            Arc::new(StartQuickTunnelTool {
                supervisor: supervisor.clone(),
            }),
            Arc::new(StopTunnelTool {
                supervisor: supervisor.clone(),
            }),
            Arc::new(GetTunnelStatusTool {
                supervisor: supervisor.clone(),
            }),
        ];

        let mut tools: HashMap<&'static str, Arc<dyn ControlTool>> = HashMap::new();
        for tool in all {
            tools.insert(tool.name(), tool);
        }
        info!(count = tools.len(), "control plane tools registered");

        Self {
            tools: Arc::new(tools),
            hub: NotificationHub::new(),
            store,
            supervisor,
        }
    }

    /// Invoke a tool by name.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value, DispatchError> {
        let Some(tool) = self.tools.get(name) else {
            return Err(DispatchError::UnknownTool(name.to_string()));
        };
        debug!(tool = name, "dispatching tool call");
        tool.invoke(args).await.map_err(DispatchError::Tool)
    }

    /// Registered tool names, sorted (diagnostics and tests).
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// The notification hub SSE streams register with.
    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Forward store change signals and tunnel transitions to the hub
    /// until `cancel` fires.
    pub fn spawn_notifiers(&self, cancel: CancellationToken) {
        let hub = self.hub.clone();
        let mut changes = self.store.subscribe_to_changes();
        let change_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = changes.recv() => {
                        match result {
                            Ok(_) => hub.broadcast(SseFrame::new(
                                "subscriptions_changed",
                                json!({}),
                            )),
                            // Lag is fine: the signal is coalescable.
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                                hub.broadcast(SseFrame::new("subscriptions_changed", json!({})));
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = change_cancel.cancelled() => break,
                }
            }
            debug!("store change notifier stopped");
        });

        let hub = self.hub.clone();
        let mut transitions = self.supervisor.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = transitions.recv() => {
                        match result {
                            Ok(status) => {
                                let mut data = serde_json::Map::new();
                                data.insert("status".to_string(), json!(status.state.to_string()));
                                if let Some(url) = status.public_url {
                                    data.insert("public_url".to_string(), json!(url));
                                }
                                hub.broadcast(SseFrame::new(
                                    "tunnel_status",
                                    Value::Object(data),
                                ));
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("tunnel transition notifier stopped");
        });
    }
}
