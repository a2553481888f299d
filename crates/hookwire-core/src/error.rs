// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the hookwire webhook broker.

use thiserror::Error;

/// The primary error type used across all hookwire crates.
#[derive(Debug, Error)]
pub enum HookwireError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Ingress server errors (bind failure, body read, malformed envelope).
    #[error("ingress error: {message}")]
    Ingress {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Filter evaluation errors (jq spawn failure, pipe I/O).
    #[error("filter error: {message}")]
    Filter {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Session injection errors, classified by OS-level failure kind.
    #[error("inject error ({kind:?}): {message}")]
    Inject {
        kind: InjectErrorKind,
        message: String,
    },

    /// Tunnel supervisor errors (spawn, download, URL discovery).
    #[error("tunnel error: {message}")]
    Tunnel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// OS-level failure kinds for a single injection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectErrorKind {
    /// The socket descriptor could not be created.
    SocketCreateFailed,
    /// The connect call failed (stale socket, refused, permission).
    ConnectFailed,
    /// The socket path exceeds the platform `sun_path` limit.
    PathTooLong,
    /// The write or flush failed after a successful connect.
    SendFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_kind() {
        let err = HookwireError::Inject {
            kind: InjectErrorKind::PathTooLong,
            message: "socket path is 130 bytes".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("PathTooLong"));
        assert!(rendered.contains("130 bytes"));
    }

    #[test]
    fn storage_error_wraps_source() {
        let err = HookwireError::Storage {
            source: Box::new(std::io::Error::other("disk gone")),
        };
        assert!(err.to_string().contains("disk gone"));
    }
}
