//! Startup orchestration.
//!
//! # Responsibilities
//! - Absorb signals while the cluster subsystem is starting
//! - Cancel startup on interrupt or terminate
//! - Run the LAN and WAN joins, in order, after a successful start
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The watcher owns the signal stream and hands it back when retired, so
//!   the control loop's consumption can never overlap with it
//! - A LAN join failure aborts before the WAN join is attempted
//! - Joins are not retried here; background retry belongs to the subsystem

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::cluster::{Cluster, JoinError, StartError};
use crate::config::AgentConfig;
use crate::lifecycle::signals::{ShutdownSignal, SignalStream};
use crate::observability::metrics;
use crate::ui::StartupUi;

/// Watches signals delivered before the cluster subsystem is running.
///
/// Nothing is running yet, so there is nothing to shut down: interrupt and
/// terminate cancel startup, hangup is rejected, broken pipe is ignored.
pub struct PreStartWatcher {
    handle: JoinHandle<SignalStream>,
    stop: oneshot::Sender<()>,
}

impl PreStartWatcher {
    /// Spawn the watcher. It owns `signals` until [`PreStartWatcher::stop`]
    /// and flips `cancel` when an interrupt or terminate arrives.
    pub fn spawn(signals: SignalStream, cancel: watch::Sender<bool>) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(watch_startup(signals, cancel, stop_rx));
        Self {
            handle,
            stop: stop_tx,
        }
    }

    /// Retire the watcher and take the signal stream back.
    pub async fn stop(self) -> SignalStream {
        let _ = self.stop.send(());
        self.handle.await.expect("pre-start watcher panicked")
    }
}

async fn watch_startup(
    mut signals: SignalStream,
    cancel: watch::Sender<bool>,
    mut stop: oneshot::Receiver<()>,
) -> SignalStream {
    loop {
        tokio::select! {
            _ = &mut stop => return signals,
            sig = signals.recv() => match sig {
                Some(ShutdownSignal::BrokenPipeIgnored) => continue,
                Some(sig @ ShutdownSignal::Hangup) => {
                    tracing::error!(signal = %sig, "cannot reload before agent started");
                }
                Some(sig) => {
                    tracing::info!(signal = %sig, "Caught signal, aborting startup");
                    let _ = cancel.send(true);
                    return signals;
                }
                None => return signals,
            }
        }
    }
}

/// Start the subsystem while the pre-start watcher absorbs signals.
///
/// The watcher is fully retired before this returns, whatever the outcome, so
/// the caller may hand the returned stream straight to the control loop.
pub async fn start_cluster<C: Cluster>(
    node: &mut C,
    signals: SignalStream,
) -> (SignalStream, Result<(), StartError>) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let watcher = PreStartWatcher::spawn(signals, cancel_tx);
    let result = node.start(cancel_rx).await;
    let signals = watcher.stop().await;
    (signals, result)
}

/// Contact the configured LAN peers; any failure is fatal to startup.
pub async fn startup_join<C: Cluster>(
    node: &C,
    ui: &StartupUi,
    config: &AgentConfig,
) -> Result<(), JoinError> {
    if config.join.start_join_lan.is_empty() {
        return Ok(());
    }

    ui.output("Joining cluster...");
    let count = node.join_lan(&config.join.start_join_lan).await?;
    metrics::record_join("lan", count);
    tracing::info!(peer_count = count, "Join completed. Initial agents synced");
    Ok(())
}

/// Contact the configured WAN peers; runs only after the LAN join succeeded.
pub async fn startup_join_wan<C: Cluster>(
    node: &C,
    ui: &StartupUi,
    config: &AgentConfig,
) -> Result<(), JoinError> {
    if config.join.start_join_wan.is_empty() {
        return Ok(());
    }

    ui.output("Joining -wan cluster...");
    let count = node.join_wan(&config.join.start_join_wan).await?;
    metrics::record_join("wan", count);
    tracing::info!(peer_count = count, "Join -wan completed. Initial agents synced");
    Ok(())
}
