// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker assembly: construct every component, wire the background tasks,
//! and run the ingress server.
//!
//! All cross-component handles are passed through constructors; there are
//! no process-global singletons. Long-lived tasks (session watch, drain
//! listener, rate-limit eviction, tunnel health check, notification
//! forwarding, retention sweep) all select on one cancellation token.

use std::net::SocketAddr;
use std::time::Duration;

use hookwire_config::BrokerConfig;
use hookwire_control::ControlPlane;
use hookwire_core::HookwireError;
use hookwire_filter::JqEngine;
use hookwire_ingress::IngressState;
use hookwire_pipeline::Pipeline;
use hookwire_ratelimit::RateLimiter;
use hookwire_session::{Injector, SessionEvent, SessionWatch};
use hookwire_storage::Store;
use hookwire_tunnel::TunnelSupervisor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
#[cfg(not(target_env = "msvc"))]
const MEMORY_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// A fully-wired broker with its ingress server running.
pub struct Broker {
    pub store: Store,
    pub pipeline: Pipeline,
    pub control: ControlPlane,
    pub supervisor: TunnelSupervisor,
    pub watch: SessionWatch,
    /// Bound ingress address (useful when the configured port is 0).
    pub local_addr: SocketAddr,
    cancel: CancellationToken,
    server_task: JoinHandle<Result<(), HookwireError>>,
}

impl Broker {
    /// Build and start a broker with a default tunnel supervisor.
    pub async fn start(
        config: BrokerConfig,
        cancel: CancellationToken,
    ) -> Result<Self, HookwireError> {
        let supervisor =
            TunnelSupervisor::new(config.tunnel.clone(), config.ingress.port);
        Self::start_with_tunnel(config, cancel, supervisor).await
    }

    /// Build and start a broker around a caller-supplied supervisor
    /// (tests inject a fake tunnel binary this way).
    pub async fn start_with_tunnel(
        config: BrokerConfig,
        cancel: CancellationToken,
        supervisor: TunnelSupervisor,
    ) -> Result<Self, HookwireError> {
        let store = Store::open(&config.storage.database_path).await?;

        // Startup recovery: queued entries survive restarts and drain on
        // the next session appearance.
        for (session_id, pending) in store.queued_counts_by_session().await? {
            info!(
                session_id = session_id.as_str(),
                pending, "queued events awaiting session"
            );
        }

        let injector = Injector::new(config.sessions.socket_dir.clone());
        let filter = JqEngine::new(
            config.filter.jq_bin.clone(),
            Duration::from_millis(config.filter.timeout_ms),
        );
        let pipeline = Pipeline::new(store.clone(), injector, filter);

        let watch = SessionWatch::spawn(
            config.sessions.socket_dir.clone(),
            WATCH_POLL_INTERVAL,
            cancel.clone(),
        );
        spawn_drain_listener(watch.clone(), pipeline.clone(), cancel.clone());

        let limiter = RateLimiter::new(
            config.ratelimit.max_requests,
            Duration::from_secs(config.ratelimit.window_secs),
        );
        limiter.spawn_eviction(cancel.clone());

        supervisor.spawn_health_check(cancel.clone());

        let control =
            ControlPlane::new(store.clone(), supervisor.clone(), config.ingress.port);
        control.spawn_notifiers(cancel.clone());

        if config.retention.days > 0 {
            spawn_retention_sweep(store.clone(), config.retention.days, cancel.clone());
        } else {
            info!("event retention sweep disabled");
        }

        {
            let warn_mb = config.broker.memory_warn_mb;
            let mem_cancel = cancel.clone();
            tokio::spawn(async move {
                memory_monitor(warn_mb, mem_cancel).await;
            });
            info!(warn_mb, "memory monitor started");
        }

        let listener = hookwire_ingress::bind(config.ingress.port).await?;
        let local_addr = listener.local_addr().map_err(|e| HookwireError::Ingress {
            message: format!("listener has no local address: {e}"),
            source: Some(Box::new(e)),
        })?;

        let state = IngressState {
            pipeline: pipeline.clone(),
            control: control.clone(),
            limiter,
            broker_name: config.broker.name.clone(),
        };
        let max_body = config.ingress.max_body_bytes;
        let server_cancel = cancel.clone();
        let server_task = tokio::spawn(async move {
            hookwire_ingress::serve(listener, state, max_body, server_cancel).await
        });

        info!(%local_addr, "broker started");
        Ok(Self {
            store,
            pipeline,
            control,
            supervisor,
            watch,
            local_addr,
            cancel,
            server_task,
        })
    }

    /// Run until cancelled, then shut everything down in order: ingress
    /// drains, the watcher and background tasks stop, the tunnel stops via
    /// its own state machine, and the store checkpoints and closes.
    pub async fn run_to_completion(self) -> Result<(), HookwireError> {
        self.cancel.cancelled().await;
        self.shutdown().await
    }

    /// Stop the broker now.
    pub async fn shutdown(self) -> Result<(), HookwireError> {
        self.cancel.cancel();
        match self.server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "ingress server exited with error"),
            Err(e) => warn!(error = %e, "ingress server task panicked"),
        }
        self.supervisor.stop();
        self.store.close().await?;
        info!("broker shutdown complete");
        Ok(())
    }
}

/// Forward session appearances to the pipeline's drain loop.
fn spawn_drain_listener(
    watch: SessionWatch,
    pipeline: Pipeline,
    cancel: CancellationToken,
) {
    let mut events = watch.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = events.recv() => {
                    match result {
                        Ok(SessionEvent::Appeared(session_id)) => {
                            match pipeline.drain_session(&session_id).await {
                                Ok(0) => {}
                                Ok(drained) => {
                                    info!(session_id = session_id.as_str(), drained, "queued events delivered");
                                }
                                Err(e) => {
                                    error!(session_id = session_id.as_str(), error = %e, "drain failed");
                                }
                            }
                        }
                        Ok(SessionEvent::Disappeared(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "drain listener lagged behind session events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    });
}

/// Hourly prune of events older than the retention window.
fn spawn_retention_sweep(store: Store, days: u32, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match run_retention_sweep(&store, days).await {
                        Ok(0) => {}
                        Ok(pruned) => info!(pruned, days, "old events pruned"),
                        Err(e) => warn!(error = %e, "retention sweep failed"),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    });
}

/// Background task that monitors heap usage via jemalloc stats and logs a
/// warning when allocation exceeds the configured threshold. Stats reads
/// fall back to zero if jemalloc is not the active allocator (as in test
/// binaries).
#[cfg(not(target_env = "msvc"))]
async fn memory_monitor(warn_mb: u64, cancel: CancellationToken) {
    let warn_bytes = warn_mb as usize * 1024 * 1024;
    let mut interval = tokio::time::interval(MEMORY_MONITOR_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // jemalloc snapshots stats lazily; advance the epoch first.
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);

                if allocated > warn_bytes {
                    warn!(
                        allocated_mb = allocated / (1024 * 1024),
                        resident_mb = resident / (1024 * 1024),
                        threshold_mb = warn_mb,
                        "memory pressure: heap above warning threshold"
                    );
                }
            }
            _ = cancel.cancelled() => {
                info!("memory monitor shutting down");
                break;
            }
        }
    }
}

/// Stub memory monitor for MSVC (no jemalloc).
#[cfg(target_env = "msvc")]
async fn memory_monitor(_warn_mb: u64, cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Prune events received more than `days` days ago.
pub async fn run_retention_sweep(store: &Store, days: u32) -> Result<usize, HookwireError> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(i64::from(days)))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    store.prune_events_older_than(&cutoff).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookwire_core::VerificationResult;
    use hookwire_storage::NewSubscription;

    #[tokio::test]
    async fn retention_sweep_prunes_only_old_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("r.db").to_str().unwrap())
            .await
            .unwrap();
        let sub = store
            .create_subscription(NewSubscription {
                session_id: "s".to_string(),
                webhook_url: "u".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .log_event(&sub.id, "{}", VerificationResult::Accepted, true)
            .await
            .unwrap();

        // A fresh event is inside any positive retention window.
        let pruned = run_retention_sweep(&store, 30).await.unwrap();
        assert_eq!(pruned, 0);
        assert_eq!(store.list_events(&sub.id, 10).await.unwrap().len(), 1);
    }
}
