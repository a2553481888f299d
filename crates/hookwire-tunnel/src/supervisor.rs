// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle supervision of the cloudflared child process.
//!
//! State machine: `Inactive -> Starting -> Active -> (Error -> Starting)*
//! -> Inactive`. An unexpected exit while Active schedules an automatic
//! restart; `stop` flips the state to Inactive *before* signalling the
//! child so the exit monitor does not restart it. Every transition is
//! broadcast to status subscribers.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hookwire_config::model::TunnelConfig;
use hookwire_core::HookwireError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binary;
use crate::config_file;

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Inactive,
    Starting,
    Active,
    Error,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Tunnel operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelMode {
    /// Prepared config file; stable hostname.
    Named,
    /// Ephemeral trycloudflare.com URL, no config required.
    Quick,
}

/// Snapshot of the supervisor's externally-visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelStatus {
    pub state: TunnelState,
    pub public_url: Option<String>,
    pub mode: Option<TunnelMode>,
}

/// Timing knobs, overridable in tests.
#[derive(Debug, Clone)]
pub struct TunnelTimings {
    /// Named mode: Starting -> Active after this grace period.
    pub named_grace: Duration,
    /// Quick mode: Starting -> Error if no URL appears in time.
    pub quick_timeout: Duration,
    /// Delay before the automatic restart after a crash.
    pub restart_backoff: Duration,
    /// SIGTERM -> SIGKILL escalation delay on stop.
    pub term_drain: Duration,
}

impl Default for TunnelTimings {
    fn default() -> Self {
        Self {
            named_grace: Duration::from_secs(5),
            quick_timeout: Duration::from_secs(30),
            restart_backoff: Duration::from_secs(2),
            term_drain: Duration::from_secs(5),
        }
    }
}

struct Inner {
    state: TunnelState,
    mode: Option<TunnelMode>,
    public_url: Option<String>,
    pid: Option<i32>,
    /// Bumped on every start/stop; stale monitors compare and bail.
    generation: u64,
}

/// Runs and monitors the tunnel child process.
#[derive(Clone)]
pub struct TunnelSupervisor {
    config: TunnelConfig,
    local_port: u16,
    inner: Arc<Mutex<Inner>>,
    status_tx: broadcast::Sender<TunnelStatus>,
    http: reqwest::Client,
    timings: TunnelTimings,
    binary_override: Option<PathBuf>,
}

impl TunnelSupervisor {
    pub fn new(config: TunnelConfig, local_port: u16) -> Self {
        let (status_tx, _) = broadcast::channel(32);
        Self {
            config,
            local_port,
            inner: Arc::new(Mutex::new(Inner {
                state: TunnelState::Inactive,
                mode: None,
                public_url: None,
                pid: None,
                generation: 0,
            })),
            status_tx,
            http: reqwest::Client::new(),
            timings: TunnelTimings::default(),
            binary_override: None,
        }
    }

    /// Use a fixed binary path instead of discovery/download.
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_override = Some(path.into());
        self
    }

    /// Override the default timings.
    pub fn with_timings(mut self, timings: TunnelTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Current status snapshot.
    pub fn status(&self) -> TunnelStatus {
        let inner = self.lock();
        TunnelStatus {
            state: inner.state,
            public_url: inner.public_url.clone(),
            mode: inner.mode,
        }
    }

    /// The public base URL, when one is known.
    pub fn public_url(&self) -> Option<String> {
        self.lock().public_url.clone()
    }

    /// Subscribe to state-transition broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<TunnelStatus> {
        self.status_tx.subscribe()
    }

    /// Start the tunnel in the given mode.
    ///
    /// A no-op returning the current status when already Starting or
    /// Active. Binary resolution or spawn failure surfaces on this call
    /// and leaves the state at Error.
    pub async fn start(&self, mode: TunnelMode) -> Result<TunnelStatus, HookwireError> {
        let generation = {
            let mut inner = self.lock();
            match inner.state {
                TunnelState::Starting | TunnelState::Active => {
                    return Ok(TunnelStatus {
                        state: inner.state,
                        public_url: inner.public_url.clone(),
                        mode: inner.mode,
                    });
                }
                TunnelState::Inactive | TunnelState::Error => {}
            }
            inner.generation += 1;
            inner.state = TunnelState::Starting;
            inner.mode = Some(mode);
            inner.public_url = match mode {
                TunnelMode::Named => config_file::public_url_from_config(
                    std::path::Path::new(&self.config.config_path),
                ),
                TunnelMode::Quick => None,
            };
            inner.generation
        };
        self.notify();
        info!(?mode, "tunnel starting");

        let binary = match &self.binary_override {
            Some(path) => path.clone(),
            None => {
                match binary::locate_or_download(
                    std::path::Path::new(&self.config.support_dir),
                    &self.http,
                )
                .await
                {
                    Ok(path) => path,
                    Err(e) => {
                        self.fail(generation, "binary unavailable");
                        return Err(e);
                    }
                }
            }
        };

        let mut command = Command::new(&binary);
        match mode {
            TunnelMode::Named => {
                command
                    .arg("tunnel")
                    .arg("--config")
                    .arg(&self.config.config_path)
                    .arg("run");
            }
            TunnelMode::Quick => {
                command
                    .arg("tunnel")
                    .arg("--url")
                    .arg(format!("http://127.0.0.1:{}", self.local_port));
            }
        }
        command
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.fail(generation, "spawn failed");
                return Err(HookwireError::Tunnel {
                    message: format!("failed to spawn {}: {e}", binary.display()),
                    source: Some(Box::new(e)),
                });
            }
        };

        {
            let mut inner = self.lock();
            inner.pid = child.id().map(|pid| pid as i32);
        }

        // Scan both pipes: cloudflared logs its banner and URLs to stderr.
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output(self.clone(), generation, mode, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(self.clone(), generation, mode, stderr));
        }

        // Starting -> Active by grace period (Named) or URL discovery with
        // a deadline (Quick).
        match mode {
            TunnelMode::Named => {
                let sup = self.clone();
                let grace = self.timings.named_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let activated = {
                        let mut inner = sup.lock();
                        if inner.generation == generation
                            && inner.state == TunnelState::Starting
                        {
                            inner.state = TunnelState::Active;
                            true
                        } else {
                            false
                        }
                    };
                    if activated {
                        info!("tunnel active");
                        sup.notify();
                    }
                });
            }
            TunnelMode::Quick => {
                let sup = self.clone();
                let deadline = self.timings.quick_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(deadline).await;
                    let timed_out = {
                        let mut inner = sup.lock();
                        if inner.generation == generation
                            && inner.state == TunnelState::Starting
                        {
                            inner.state = TunnelState::Error;
                            inner.pid.take()
                        } else {
                            None
                        }
                    };
                    if let Some(pid) = timed_out {
                        warn!("quick tunnel produced no URL in time");
                        terminate(pid);
                        sup.notify();
                    }
                });
            }
        }

        tokio::spawn(monitor_child(self.clone(), child, generation, mode));

        Ok(self.status())
    }

    /// Stop the tunnel.
    ///
    /// The state moves to Inactive before the child is signalled, so the
    /// exit monitor observes an intentional stop and does not restart.
    /// SIGTERM first; SIGKILL after the drain period if still alive.
    pub fn stop(&self) {
        let pid = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = TunnelState::Inactive;
            inner.mode = None;
            inner.public_url = None;
            inner.pid.take()
        };
        self.notify();

        let Some(pid) = pid else {
            return;
        };
        info!(pid, "stopping tunnel");
        terminate(pid);

        let drain = self.timings.term_drain;
        tokio::spawn(async move {
            tokio::time::sleep(drain).await;
            if kill(Pid::from_raw(pid), None).is_ok() {
                warn!(pid, "tunnel ignored SIGTERM; killing");
                let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            }
        });
    }

    /// Wait until the state is Active, or until the timeout elapses.
    /// Returns the status at that moment either way.
    pub async fn wait_until_active(&self, timeout: Duration) -> TunnelStatus {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.status();
            if status.state == TunnelState::Active {
                return status;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return status;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    return self.status();
                }
            }
        }
    }

    /// Periodic health probe of the public URL. Three consecutive failures
    /// force a restart.
    pub fn spawn_health_check(&self, cancel: CancellationToken) {
        let sup = self.clone();
        let interval_duration = Duration::from_secs(self.config.health_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.tick().await;
            let mut consecutive_failures = 0u32;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let status = sup.status();
                        let (TunnelState::Active, Some(url)) = (status.state, status.public_url) else {
                            consecutive_failures = 0;
                            continue;
                        };
                        let healthy = sup
                            .http
                            .get(&url)
                            .timeout(Duration::from_secs(10))
                            .send()
                            .await
                            .is_ok();
                        if healthy {
                            consecutive_failures = 0;
                        } else {
                            consecutive_failures += 1;
                            warn!(url = url.as_str(), consecutive_failures, "tunnel health check failed");
                            if consecutive_failures >= 3 {
                                consecutive_failures = 0;
                                sup.force_restart().await;
                            }
                        }
                    }
                    _ = cancel.cancelled() => {
                        debug!("tunnel health check shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Kill the child and start over in the same mode.
    async fn force_restart(&self) {
        let (pid, mode) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = TunnelState::Error;
            (inner.pid.take(), inner.mode)
        };
        self.notify();
        if let Some(pid) = pid {
            terminate(pid);
        }
        tokio::time::sleep(self.timings.restart_backoff).await;
        if let Some(mode) = mode {
            warn!(?mode, "forcing tunnel restart");
            if let Err(e) = boxed_start(self.clone(), mode).await {
                warn!(error = %e, "tunnel restart failed");
            }
        }
    }

    fn fail(&self, generation: u64, reason: &str) {
        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.state = TunnelState::Error;
                inner.pid = None;
            }
        }
        warn!(reason, "tunnel start failed");
        self.notify();
    }

    fn notify(&self) {
        let _ = self.status_tx.send(self.status());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn terminate(pid: i32) {
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM delivery failed (already gone?)");
    }
}

/// Box the start future so restart paths do not create an infinitely
/// recursive future type.
fn boxed_start(
    sup: TunnelSupervisor,
    mode: TunnelMode,
) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<TunnelStatus, HookwireError>> + Send>,
> {
    Box::pin(async move { sup.start(mode).await })
}

/// Read one child pipe to completion, scanning for URL announcements.
async fn scan_output<R: AsyncRead + Unpin + Send + 'static>(
    sup: TunnelSupervisor,
    generation: u64,
    mode: TunnelMode,
    pipe: R,
) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = line.as_str(), "cloudflared");
        match mode {
            TunnelMode::Quick => {
                if let Some(url) = config_file::quick_url_from_output(&line) {
                    let activated = {
                        let mut inner = sup.lock();
                        if inner.generation == generation
                            && inner.state == TunnelState::Starting
                        {
                            inner.public_url = Some(url.clone());
                            inner.state = TunnelState::Active;
                            true
                        } else {
                            false
                        }
                    };
                    if activated {
                        info!(url = url.as_str(), "quick tunnel active");
                        sup.notify();
                    }
                }
            }
            TunnelMode::Named => {
                // Only the fallback URL: a hostname from the config wins.
                if let Some(url) = config_file::fallback_url_from_output(&line) {
                    let updated = {
                        let mut inner = sup.lock();
                        if inner.generation == generation && inner.public_url.is_none() {
                            inner.public_url = Some(url.clone());
                            true
                        } else {
                            false
                        }
                    };
                    if updated {
                        info!(url = url.as_str(), "tunnel URL discovered from output");
                        sup.notify();
                    }
                }
            }
        }
    }
}

/// Await child exit; restart on an unexpected death while Active.
async fn monitor_child(
    sup: TunnelSupervisor,
    mut child: Child,
    generation: u64,
    mode: TunnelMode,
) {
    let exit = child.wait().await;

    let was_active = {
        let mut inner = sup.lock();
        if inner.generation != generation {
            // Intentional stop or a newer start owns the state now.
            return;
        }
        let was_active = inner.state == TunnelState::Active;
        inner.state = TunnelState::Error;
        inner.pid = None;
        was_active
    };
    warn!(?exit, was_active, "tunnel child exited unexpectedly");
    sup.notify();

    if !was_active {
        return;
    }

    tokio::time::sleep(sup.timings.restart_backoff).await;
    let still_current = sup.lock().generation == generation;
    if still_current {
        if let Err(e) = boxed_start(sup.clone(), mode).await {
            warn!(error = %e, "automatic tunnel restart failed");
        }
    }
}
