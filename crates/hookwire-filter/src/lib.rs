// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! jq expression evaluation by subprocess.
//!
//! Expressions use stock jq semantics so that operators can paste the same
//! filters they would write in a shell one-liner; the engine deliberately
//! embeds no dialect of its own. Each evaluation spawns `jq -c <expr>` with
//! the payload on stdin, bounded by a per-call timeout, and classifies the
//! output. A failing child affects only its own evaluation.

use std::process::Stdio;
use std::time::Duration;

use hookwire_core::HookwireError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Result of evaluating an expression against a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The trimmed output the child produced.
    Produced(String),
    /// The child exited non-zero, or produced nothing, `false`, or `null`.
    Dropped,
}

/// Evaluates jq selection expressions against JSON payloads.
#[derive(Clone)]
pub struct JqEngine {
    jq_bin: String,
    timeout: Duration,
}

impl JqEngine {
    pub fn new(jq_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            jq_bin: jq_bin.into(),
            timeout,
        }
    }

    /// Run `expr` over `payload` and classify the output.
    ///
    /// Errors cover spawn failure, pipe I/O, and timeout; the caller decides
    /// how an error degrades (the gate stage treats it as dropped, the
    /// summary stage falls back to truncation).
    pub async fn evaluate(
        &self,
        expr: &str,
        payload: &[u8],
    ) -> Result<FilterOutcome, HookwireError> {
        let mut child = Command::new(&self.jq_bin)
            .arg("-c")
            .arg(expr)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HookwireError::Filter {
                message: format!("failed to spawn {}: {e}", self.jq_bin),
                source: Some(Box::new(e)),
            })?;

        // Feed the payload and close stdin so the child sees EOF.
        let mut stdin = child.stdin.take().ok_or_else(|| HookwireError::Filter {
            message: "child stdin unavailable".to_string(),
            source: None,
        })?;
        let payload = payload.to_vec();
        let feed = async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
            drop(stdin);
            Ok::<(), std::io::Error>(())
        };

        let run = async {
            feed.await.map_err(|e| HookwireError::Filter {
                message: format!("failed to write payload to jq: {e}"),
                source: Some(Box::new(e)),
            })?;
            child
                .wait_with_output()
                .await
                .map_err(|e| HookwireError::Filter {
                    message: format!("failed to collect jq output: {e}"),
                    source: Some(Box::new(e)),
                })
        };

        // kill_on_drop reaps the child if the timeout wins the race.
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HookwireError::Timeout {
                    duration: self.timeout,
                });
            }
        };

        if !output.status.success() {
            debug!(
                code = output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "jq exited non-zero; treating as dropped"
            );
            return Ok(FilterOutcome::Dropped);
        }

        let produced = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if produced.is_empty() || produced == "false" || produced == "null" {
            return Ok(FilterOutcome::Dropped);
        }
        Ok(FilterOutcome::Produced(produced))
    }
}
