//! Graceful shutdown protocol.
//!
//! # Responsibilities
//! - Ask the subsystem to leave the cluster, in the background
//! - Race completion against a timeout and a second signal
//!
//! # Design Decisions
//! - First arrival wins; losing outcomes are abandoned, not awaited
//! - A leave error disarms the completion branch only; the timeout and
//!   second-signal branches still decide the exit code
//! - Broken pipe does not count as a second signal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::cluster::Cluster;
use crate::lifecycle::signals::{ShutdownSignal, SignalStream};

/// Ask the cluster subsystem to leave, then wait for the first of:
/// completion (exit 0), a second signal (exit 1), or the timeout (exit 1).
pub async fn graceful_leave<C: Cluster>(
    node: Arc<C>,
    signals: &mut SignalStream,
    timeout: Duration,
) -> i32 {
    tracing::info!("Gracefully shutting down agent...");

    let (done_tx, mut done_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Err(err) = node.leave().await {
            tracing::error!(error = %err, "Error on leave");
            return;
        }
        let _ = done_tx.send(());
    });

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut leave_disarmed = false;
    let mut signals_closed = false;

    loop {
        tokio::select! {
            sig = signals.recv(), if !signals_closed => match sig {
                Some(ShutdownSignal::BrokenPipeIgnored) => continue,
                Some(sig) => {
                    tracing::info!(signal = %sig, "Caught second signal, exiting");
                    return 1;
                }
                None => signals_closed = true,
            },
            () = &mut deadline => {
                tracing::info!("Timeout on graceful leave. Exiting");
                return 1;
            }
            res = &mut done_rx, if !leave_disarmed => match res {
                Ok(()) => {
                    tracing::info!("Graceful exit completed");
                    return 0;
                }
                // The leave task hit an error and logged it; only the
                // timeout and second-signal outcomes remain.
                Err(_) => leave_disarmed = true,
            },
        }
    }
}
