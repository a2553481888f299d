// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window rate limiting keyed by client IP.
//!
//! Each client gets one counter per window. Admission is denied when the
//! post-increment count exceeds the cap; the window resets on the first
//! admission after expiry. A background tick evicts entries whose window
//! has expired so the map does not grow with one-off senders.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

struct WindowEntry {
    started: Instant,
    count: u32,
}

/// Per-IP fixed-window counter.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record one request from `client` and decide admission.
    pub fn check(&self, client: &str) -> Admission {
        let now = Instant::now();
        let mut windows = self.lock();

        let entry = windows
            .entry(client.to_string())
            .or_insert(WindowEntry { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;

        if entry.count > self.max_requests {
            warn!(client, count = entry.count, "rate limit exceeded");
            Admission::Denied
        } else {
            Admission::Allowed
        }
    }

    /// Spawn the eviction tick, removing expired windows every window
    /// duration until `cancel` fires.
    pub fn spawn_eviction(&self, cancel: CancellationToken) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window);
            interval.tick().await; // skip the immediate tick
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        limiter.evict_expired();
                    }
                    _ = cancel.cancelled() => {
                        debug!("rate limiter eviction shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Drop entries whose window has fully expired.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        let window = self.window;
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, entry| now.duration_since(entry.started) < window);
        let evicted = before - windows.len();
        if evicted > 0 {
            debug!(evicted, remaining = windows.len(), "evicted expired rate windows");
        }
    }

    /// Number of tracked clients (for tests and diagnostics).
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowEntry>> {
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Resolve the client IP for a request.
///
/// Order: first comma-separated value of `X-Forwarded-For` (trimmed), then
/// `CF-Connecting-IP`, then the socket peer address, then `"unknown"`.
pub fn resolve_client_ip(
    forwarded_for: Option<&str>,
    cf_connecting_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> String {
    if let Some(xff) = forwarded_for {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(cf) = cf_connecting_ip {
        let cf = cf.trim();
        if !cf.is_empty() {
            return cf.to_string();
        }
    }
    if let Some(peer) = peer {
        return peer.to_string();
    }
    "unknown".to_string()
}
