// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out of notification frames to connected SSE streams.
//!
//! Streams register an mpsc receiver; every broadcast walks the list and
//! prunes closed streams lazily on the failed send. A stream whose buffer
//! is full keeps its registration and simply misses the frame; the
//! notification channel is best-effort and coalescable.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

const STREAM_BUFFER: usize = 32;

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Wire rendering: `event: <name>\ndata: <json>\n\n`.
    pub fn render(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Registry of connected notification streams.
#[derive(Clone, Default)]
pub struct NotificationHub {
    streams: Arc<Mutex<Vec<mpsc::Sender<SseFrame>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream and return its receiving end.
    pub fn register(&self) -> mpsc::Receiver<SseFrame> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        self.lock().push(tx);
        rx
    }

    /// Fan a frame out to every registered stream.
    pub fn broadcast(&self, frame: SseFrame) {
        let mut streams = self.lock();
        let before = streams.len();
        streams.retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            // Full buffer: the client is slow, not gone. Drop the frame.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        let pruned = before - streams.len();
        if pruned > 0 {
            debug!(pruned, remaining = streams.len(), "pruned closed notification streams");
        }
    }

    /// Number of registered streams (tests and diagnostics).
    pub fn stream_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::Sender<SseFrame>>> {
        match self.streams.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
