// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the hookwire workspace.
//!
//! [`MockSession`] plays the role of a local agent session: a Unix-socket
//! server that records every JSON line it receives. Probe connections that
//! send nothing are accepted and ignored, matching how real sessions
//! tolerate the watcher's liveness checks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// A recording session socket server.
pub struct MockSession {
    session_id: String,
    socket_path: PathBuf,
    received: Arc<Mutex<Vec<String>>>,
    accept_task: JoinHandle<()>,
}

impl MockSession {
    /// Bind `{session_id}.sock` in `dir` and start accepting connections.
    pub fn start(dir: &Path, session_id: &str) -> std::io::Result<Self> {
        let socket_path = dir.join(format!("{session_id}.sock"));
        let listener = UnixListener::bind(&socket_path)?;
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let sink = sink.clone();
                tokio::spawn(async move {
                    let mut reader = tokio::io::BufReader::new(stream);
                    let mut line = String::new();
                    while let Ok(n) = reader.read_line(&mut line).await {
                        if n == 0 {
                            break;
                        }
                        if let Ok(mut lines) = sink.lock() {
                            lines.push(line.trim_end_matches('\n').to_string());
                        }
                        line.clear();
                    }
                });
            }
        });

        Ok(Self {
            session_id: session_id.to_string(),
            socket_path,
            received,
            accept_task,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Lines received so far, newline terminators stripped.
    pub fn received_lines(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Decoded `value` fields of every received prompt line.
    pub fn received_values(&self) -> Vec<String> {
        self.received_lines()
            .iter()
            .filter_map(|line| {
                serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|v| v["value"].as_str().map(str::to_string))
            })
            .collect()
    }

    /// Wait until at least `count` lines have arrived, or panic after 5s.
    pub async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let lines = self.received_lines();
            if lines.len() >= count {
                return lines;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {count} lines on {}; got {}",
                    self.session_id,
                    lines.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop accepting and remove the socket file.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
