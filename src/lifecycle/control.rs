//! Post-start control loop.
//!
//! # Responsibilities
//! - Multiplex signals, subsystem events, and shutdown requests
//! - Drive configuration reloads on hangup
//! - Decide between graceful and forced exit
//!
//! # Design Decisions
//! - One event is serviced per iteration; no two transitions overlap
//! - Fatal subsystem events exit immediately, bypassing the graceful path
//! - The active config snapshot is replaced wholesale, never mutated
//! - Phase changes are published on a watch channel; background tasks signal
//!   the loop over channels instead of touching shared state

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::cluster::{Cluster, ClusterEvents};
use crate::config::AgentConfig;
use crate::lifecycle::shutdown::graceful_leave;
use crate::lifecycle::signals::{ShutdownSignal, SignalStream};
use crate::observability::metrics;

/// Phase of the agent lifecycle. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    NotStarted,
    Starting,
    Joining,
    Running,
    ReloadInProgress,
    GracefulLeave,
    Terminated,
}

/// The post-start state machine. Owns the signal stream and the subsystem
/// event receivers; runs until it produces the process exit code.
pub struct ControlLoop<C: Cluster> {
    node: Arc<C>,
    config: Arc<AgentConfig>,
    signals: SignalStream,
    events: ClusterEvents,
    shutdown_requests: mpsc::Receiver<()>,
    phase: watch::Sender<LifecyclePhase>,
}

impl<C: Cluster> ControlLoop<C> {
    pub fn new(
        node: Arc<C>,
        config: Arc<AgentConfig>,
        signals: SignalStream,
        events: ClusterEvents,
        shutdown_requests: mpsc::Receiver<()>,
        phase: watch::Sender<LifecyclePhase>,
    ) -> Self {
        Self {
            node,
            config,
            signals,
            events,
            shutdown_requests,
            phase,
        }
    }

    /// Run until termination; returns the process exit code.
    pub async fn run(mut self) -> i32 {
        self.phase.send_replace(LifecyclePhase::Running);
        let code = self.next_exit().await;
        self.phase.send_replace(LifecyclePhase::Terminated);
        code
    }

    async fn next_exit(&mut self) -> i32 {
        loop {
            let signal = tokio::select! {
                sig = self.signals.recv() => match sig {
                    Some(sig) => sig,
                    None => {
                        tracing::error!("Signal stream closed unexpectedly");
                        return 1;
                    }
                },
                Some(err) = self.events.retry_join_failed.recv() => {
                    tracing::error!(error = %err, "Retry join failed");
                    return 1;
                }
                Some(()) = self.events.failed.recv() => {
                    // The subsystem logs the underlying error itself.
                    return 1;
                }
                Some(()) = self.events.shutdown.recv() => {
                    tracing::info!("Cluster subsystem is already down");
                    return 0;
                }
                Some(()) = self.shutdown_requests.recv() => ShutdownSignal::Interrupt,
            };

            metrics::record_signal(signal);
            match signal {
                ShutdownSignal::BrokenPipeIgnored => continue,
                ShutdownSignal::Hangup => {
                    tracing::info!(signal = %signal, "Caught signal");
                    self.reload().await;
                }
                sig => {
                    tracing::info!(signal = %sig, "Caught signal");
                    if !self.graceful_permitted(sig) {
                        tracing::info!("Graceful shutdown disabled. Exiting");
                        return 1;
                    }

                    self.phase.send_replace(LifecyclePhase::GracefulLeave);
                    let timeout =
                        Duration::from_secs(self.config.shutdown.graceful_timeout_secs);
                    return graceful_leave(Arc::clone(&self.node), &mut self.signals, timeout)
                        .await;
                }
            }
        }
    }

    /// Reload configuration against the running subsystem. A failure keeps
    /// the previous snapshot; the loop keeps running either way.
    async fn reload(&mut self) {
        self.phase.send_replace(LifecyclePhase::ReloadInProgress);
        match self.node.reload_config().await {
            Ok(()) => {
                self.config = self.node.config();
                metrics::record_reload(true);
            }
            Err(err) => {
                tracing::error!(error = %err, "Reload config failed");
                metrics::record_reload(false);
            }
        }
        self.phase.send_replace(LifecyclePhase::Running);
    }

    fn graceful_permitted(&self, signal: ShutdownSignal) -> bool {
        match signal {
            ShutdownSignal::Interrupt => !self.config.shutdown.skip_leave_on_interrupt,
            ShutdownSignal::Terminate => self.config.shutdown.leave_on_terminate,
            ShutdownSignal::Hangup | ShutdownSignal::BrokenPipeIgnored => false,
        }
    }
}
