// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health and webhook ingestion handlers.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookwire_pipeline::PipelineOutcome;
use hookwire_ratelimit::{resolve_client_ip, Admission};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::server::IngressState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub server: String,
    pub timestamp: String,
}

/// GET /health
pub async fn get_health(State(state): State<IngressState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        server: state.broker_name.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// POST /webhook/{subscription_id}
///
/// Rate-limited per client IP, then handed to the pipeline. The HTTP
/// status reflects only the sender-visible outcome; delivery failures are
/// the broker's problem and still return 200.
pub async fn post_webhook(
    State(state): State<IngressState>,
    Path(subscription_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client = client_ip(&headers, peer);
    if state.limiter.check(&client) == Admission::Denied {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate_limited"})),
        )
            .into_response();
    }

    // Decouple processing from the request lifetime: a sender that hangs
    // up mid-flight must not cancel persistence or delivery.
    let header_map = lowercase_headers(&headers);
    let pipeline = state.pipeline.clone();
    let sub_id = subscription_id.clone();
    let outcome = tokio::spawn(async move {
        pipeline.handle_webhook(&sub_id, &header_map, &body).await
    })
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(subscription_id = subscription_id.as_str(), error = %e, "webhook task panicked");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal"})),
            )
                .into_response();
        }
    };

    match outcome {
        Ok(PipelineOutcome::Accepted) => {
            (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response()
        }
        Ok(PipelineOutcome::Rejected(reason)) => (
            StatusCode::FORBIDDEN,
            Json(json!({"error": reason.as_str()})),
        )
            .into_response(),
        Ok(PipelineOutcome::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "subscription_not_found"})),
        )
            .into_response(),
        Err(e) => {
            error!(subscription_id = subscription_id.as_str(), error = %e, "webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal"})),
            )
                .into_response()
        }
    }
}

/// Resolve the client IP per the documented header order.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    resolve_client_ip(
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok()),
        headers
            .get("cf-connecting-ip")
            .and_then(|v| v.to_str().ok()),
        Some(peer.ip()),
    )
}

/// Flatten a HeaderMap into lowercased name -> value pairs for the
/// pipeline's header-name lookups. Non-UTF-8 values are skipped.
pub fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}
