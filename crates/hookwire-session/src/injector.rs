// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deliver one framed message to one session over a Unix stream socket.
//!
//! The session reads newline-delimited JSON lines. The injector writes
//! exactly one line of the form `{"value": <string>, "mode": "prompt"}`
//! followed by `\n`; literal newlines inside the content become `\n`
//! escapes as part of ordinary JSON string encoding. No other framing.

use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hookwire_core::{HookwireError, InjectErrorKind};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Platform `sun_path` capacity, NUL terminator included.
#[cfg(target_os = "macos")]
const SUN_PATH_MAX: usize = 104;
#[cfg(not(target_os = "macos"))]
const SUN_PATH_MAX: usize = 108;

/// Delivers framed messages to session sockets under one directory.
#[derive(Clone)]
pub struct Injector {
    socket_dir: PathBuf,
    connect_timeout: Duration,
}

impl Injector {
    /// Create an injector for sockets named `{session_id}.sock` in `socket_dir`.
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            connect_timeout: Duration::from_secs(3),
        }
    }

    /// Override the connect/send timeout (default 3s).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The socket path for a session id.
    pub fn socket_path(&self, session_id: &str) -> PathBuf {
        self.socket_dir.join(format!("{session_id}.sock"))
    }

    /// Deliver `content` to the session as a single JSON line.
    ///
    /// Returns `Ok(true)` on a full send, `Ok(false)` when no socket file
    /// exists at call time, and an [`InjectErrorKind`]-classified error for
    /// OS-level failures.
    pub async fn inject(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<bool, HookwireError> {
        let path = self.socket_path(session_id);

        // sockaddr_un rejects long paths only at connect time with an
        // unhelpful errno; check up front.
        if path.as_os_str().as_bytes().len() + 1 > SUN_PATH_MAX {
            return Err(HookwireError::Inject {
                kind: InjectErrorKind::PathTooLong,
                message: format!(
                    "socket path {} exceeds the {SUN_PATH_MAX}-byte limit",
                    path.display()
                ),
            });
        }

        if !path.exists() {
            debug!(session_id, "no socket file present; delivery skipped");
            return Ok(false);
        }

        let line = frame_line(content);

        let mut stream = connect(&path, self.connect_timeout).await?;

        let send = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        };
        match tokio::time::timeout(self.connect_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(HookwireError::Inject {
                    kind: InjectErrorKind::SendFailed,
                    message: format!("send to {} failed: {e}", path.display()),
                });
            }
            Err(_) => {
                return Err(HookwireError::Inject {
                    kind: InjectErrorKind::SendFailed,
                    message: format!("send to {} timed out", path.display()),
                });
            }
        }

        debug!(session_id, bytes = line.len(), "message injected");
        Ok(true)
    }

    /// Call [`inject`](Self::inject) up to `max_attempts` times, sleeping
    /// `backoff` between attempts. Returns `true` on the first success and
    /// `false` once attempts are exhausted. Never returns an error.
    pub async fn inject_with_retry(
        &self,
        session_id: &str,
        content: &str,
        max_attempts: u32,
        backoff: Duration,
    ) -> bool {
        for attempt in 1..=max_attempts {
            match self.inject(session_id, content).await {
                Ok(true) => return true,
                Ok(false) => {
                    debug!(session_id, attempt, "socket absent; will retry");
                }
                Err(e) => {
                    warn!(session_id, attempt, error = %e, "inject attempt failed");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
            }
        }
        false
    }
}

/// Encode the socket-level JSON line for one prompt injection.
pub fn frame_line(content: &str) -> String {
    let mut line = serde_json::json!({
        "value": content,
        "mode": "prompt",
    })
    .to_string();
    line.push('\n');
    line
}

async fn connect(path: &Path, timeout: Duration) -> Result<UnixStream, HookwireError> {
    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            let kind = if e.kind() == std::io::ErrorKind::OutOfMemory {
                InjectErrorKind::SocketCreateFailed
            } else {
                InjectErrorKind::ConnectFailed
            };
            Err(HookwireError::Inject {
                kind,
                message: format!("connect to {} failed: {e}", path.display()),
            })
        }
        Err(_) => Err(HookwireError::Inject {
            kind: InjectErrorKind::ConnectFailed,
            message: format!("connect to {} timed out", path.display()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixListener;

    #[test]
    fn frame_line_is_single_json_line() {
        let line = frame_line("hello\nworld");
        assert!(line.ends_with('\n'));
        // The only literal newline is the terminator.
        assert_eq!(line.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["value"], "hello\nworld");
        assert_eq!(value["mode"], "prompt");
    }

    #[tokio::test]
    async fn inject_without_socket_file_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let injector = Injector::new(dir.path());
        let sent = injector.inject("ghost", "content").await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn inject_delivers_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sess-1.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line
        });

        let injector = Injector::new(dir.path());
        let sent = injector.inject("sess-1", "line one\nline two").await.unwrap();
        assert!(sent);

        let line = accept.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["value"], "line one\nline two");
        assert_eq!(value["mode"], "prompt");
    }

    #[tokio::test]
    async fn inject_to_stale_socket_classifies_connect_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        // Bind then drop the listener, leaving a stale socket file.
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let injector = Injector::new(dir.path());
        let err = injector.inject("stale", "content").await.unwrap_err();
        match err {
            HookwireError::Inject { kind, .. } => {
                assert_eq!(kind, InjectErrorKind::ConnectFailed);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn overlong_path_rejected_before_connect() {
        let dir = tempfile::tempdir().unwrap();
        let injector = Injector::new(dir.path());
        let long_id = "s".repeat(SUN_PATH_MAX);
        let err = injector.inject(&long_id, "content").await.unwrap_err();
        match err {
            HookwireError::Inject { kind, .. } => {
                assert_eq!(kind, InjectErrorKind::PathTooLong);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn retry_exhausts_and_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let injector = Injector::new(dir.path());
        let delivered = injector
            .inject_with_retry("ghost", "content", 2, Duration::from_millis(10))
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn retry_succeeds_once_socket_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.sock");
        let injector = Injector::new(dir.path());

        // Bind the socket after the first attempt has failed.
        let bind_path = path.clone();
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let listener = UnixListener::bind(&bind_path).unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line
        });

        let delivered = injector
            .inject_with_retry("late", "queued content", 5, Duration::from_millis(40))
            .await;
        assert!(delivered);
        let line = server.await.unwrap();
        assert!(line.contains("queued content"));
    }
}
