// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-sent-events notification stream for GET /mcp.
//!
//! The stream registers with the control plane's notification hub and
//! relays frames until the client disconnects. The first write is the
//! comment line `: connected`, confirming liveness before any event
//! arrives.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use hookwire_ratelimit::Admission;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::handlers::client_ip;
use crate::server::IngressState;

/// GET /mcp
pub async fn get_stream(
    State(state): State<IngressState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let client = client_ip(&headers, peer);
    if state.limiter.check(&client) == Admission::Denied {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate_limited"})),
        )
            .into_response();
    }

    debug!(client = client.as_str(), "notification stream opened");
    let rx = state.control.hub().register();

    let frames = ReceiverStream::new(rx)
        .map(|frame| Ok::<Event, Infallible>(Event::default().event(frame.event).data(frame.data.to_string())));
    let connected =
        stream::once(async { Ok::<Event, Infallible>(Event::default().comment("connected")) });
    let events: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(connected.chain(frames));

    (
        [
            (HeaderName::from_static("cache-control"), "no-cache"),
            (HeaderName::from_static("connection"), "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}
