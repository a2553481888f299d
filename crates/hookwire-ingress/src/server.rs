// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress HTTP server built on axum.
//!
//! Binds to loopback only; trust for the control plane derives from that
//! binding, not from authentication. Routes: webhook ingestion, the
//! JSON-RPC control surface, and its SSE notification stream.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use hookwire_control::ControlPlane;
use hookwire_pipeline::Pipeline;
use hookwire_ratelimit::RateLimiter;
use hookwire_core::HookwireError;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;
use crate::rpc;
use crate::sse;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct IngressState {
    pub pipeline: Pipeline,
    pub control: ControlPlane,
    pub limiter: RateLimiter,
    /// Name reported by the health endpoint.
    pub broker_name: String,
}

/// Bind the loopback listener.
pub async fn bind(port: u16) -> Result<TcpListener, HookwireError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| HookwireError::Ingress {
            message: format!("failed to bind {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Assemble the router.
pub fn router(state: IngressState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhook/{subscription_id}", post(handlers::post_webhook))
        .route("/mcp", post(rpc::post_rpc).get(sse::get_stream))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `cancel` fires, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: IngressState,
    max_body_bytes: usize,
    cancel: CancellationToken,
) -> Result<(), HookwireError> {
    let addr = listener.local_addr().map_err(|e| HookwireError::Ingress {
        message: format!("listener has no local address: {e}"),
        source: Some(Box::new(e)),
    })?;
    info!(%addr, "ingress server listening");

    let app = router(state, max_body_bytes);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .map_err(|e| HookwireError::Ingress {
        message: format!("ingress server error: {e}"),
        source: Some(Box::new(e)),
    })
}
