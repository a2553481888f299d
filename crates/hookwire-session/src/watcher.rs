// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discover live session endpoints by watching the socket directory.
//!
//! A session is live iff `{session_id}.sock` exists in the watched
//! directory AND a connect attempt succeeds; a stale socket file left by a
//! crashed session is not live. Filesystem notification triggers an
//! immediate rescan when available; a periodic poll covers platforms where
//! the watcher cannot be created and liveness flips that produce no
//! filesystem event.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Liveness transition for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session transitioned absent -> live.
    Appeared(String),
    /// The session transitioned live -> absent. Informational.
    Disappeared(String),
}

/// Watches a directory of `{session_id}.sock` files and tracks the live set.
#[derive(Clone)]
pub struct SessionWatch {
    live: Arc<DashMap<String, ()>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionWatch {
    /// Start watching `socket_dir`, rescanning every `poll_interval` and on
    /// filesystem events. The background task runs until `cancel` fires.
    pub fn spawn(
        socket_dir: impl Into<PathBuf>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let socket_dir = socket_dir.into();
        let live: Arc<DashMap<String, ()>> = Arc::new(DashMap::new());
        let (events, _) = broadcast::channel(64);

        let watch = Self {
            live: live.clone(),
            events: events.clone(),
        };

        tokio::spawn(run_watch_loop(socket_dir, poll_interval, live, events, cancel));

        watch
    }

    /// Whether the session is currently live.
    pub fn is_live(&self, session_id: &str) -> bool {
        self.live.contains_key(session_id)
    }

    /// Snapshot of the currently-live session ids.
    pub fn live_set(&self) -> Vec<String> {
        self.live.iter().map(|e| e.key().clone()).collect()
    }

    /// Subscribe to appearance/disappearance events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

async fn run_watch_loop(
    socket_dir: PathBuf,
    poll_interval: Duration,
    live: Arc<DashMap<String, ()>>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
) {
    if let Err(e) = std::fs::create_dir_all(&socket_dir) {
        warn!(dir = %socket_dir.display(), error = %e, "cannot create socket directory");
    }

    // Bridge notify's callback thread into the async loop. The watcher must
    // stay alive for the duration of the task.
    let (fs_tx, mut fs_rx) = tokio::sync::mpsc::channel::<()>(8);
    let _watcher: Option<RecommendedWatcher> = match notify::recommended_watcher(
        move |res: Result<notify::Event, notify::Error>| {
            if res.is_ok() {
                let _ = fs_tx.try_send(());
            }
        },
    ) {
        Ok(mut watcher) => match watcher.watch(&socket_dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(dir = %socket_dir.display(), "filesystem watcher active");
                Some(watcher)
            }
            Err(e) => {
                warn!(error = %e, "watch registration failed; polling only");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "filesystem watcher unavailable; polling only");
            None
        }
    };

    let mut interval = tokio::time::interval(poll_interval);
    info!(dir = %socket_dir.display(), "session watch started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                rescan(&socket_dir, &live, &events).await;
            }
            Some(()) = fs_rx.recv() => {
                rescan(&socket_dir, &live, &events).await;
            }
            _ = cancel.cancelled() => {
                info!("session watch shutting down");
                break;
            }
        }
    }
}

/// Rebuild the live set from the directory contents, probing each socket.
async fn rescan(
    socket_dir: &PathBuf,
    live: &DashMap<String, ()>,
    events: &broadcast::Sender<SessionEvent>,
) {
    let mut current = HashSet::new();

    let entries = match std::fs::read_dir(socket_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %socket_dir.display(), error = %e, "socket directory unreadable");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sock") {
            continue;
        }
        let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if probe(&path).await {
            current.insert(session_id.to_string());
        }
    }

    // Diff against the previous set; mutate only after successful probes.
    for session_id in &current {
        if live.insert(session_id.clone(), ()).is_none() {
            info!(session_id = session_id.as_str(), "session appeared");
            let _ = events.send(SessionEvent::Appeared(session_id.clone()));
        }
    }
    let gone: Vec<String> = live
        .iter()
        .map(|e| e.key().clone())
        .filter(|id| !current.contains(id))
        .collect();
    for session_id in gone {
        live.remove(&session_id);
        info!(session_id = session_id.as_str(), "session disappeared");
        let _ = events.send(SessionEvent::Disappeared(session_id));
    }
}

/// Existence alone is insufficient: a connect must succeed.
async fn probe(path: &std::path::Path) -> bool {
    matches!(
        tokio::time::timeout(Duration::from_secs(1), UnixStream::connect(path)).await,
        Ok(Ok(_))
    )
}
