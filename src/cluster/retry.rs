//! Background retry join with exponential backoff.
//!
//! # Responsibilities
//! - Keep contacting configured peers after startup until one join succeeds
//! - Report exhaustion as a fatal event; the controller never retries itself
//!
//! # Design Decisions
//! - Jittered backoff prevents thundering herd after a cluster-wide restart
//! - retry_max = 0 retries forever

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::{mpsc, watch};

use crate::cluster::node::{contact_pool, Pool};
use crate::cluster::JoinError;
use crate::config::JoinConfig;

/// Calculate exponential backoff delay with jitter (0 to 10% of the delay).
pub fn calculate_backoff(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    jitter: &mut impl Rng,
) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter_ms = if jitter_range > 0 {
        jitter.gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter_ms)
}

/// Contact the retry peers until a join lands or the attempts run out.
///
/// Exhaustion is reported on `retry_tx` exactly once; a successful join ends
/// the task silently apart from an info log.
pub(crate) async fn run_retry_join(
    join: JoinConfig,
    local_name: String,
    advertise: String,
    peers: Arc<DashMap<String, String>>,
    retry_tx: mpsc::Sender<JoinError>,
    mut stop: watch::Receiver<bool>,
    mut rng: StdRng,
) {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match contact_pool(&local_name, &advertise, Pool::Lan, &join.retry_join, &peers).await {
            Ok(contacted) => {
                tracing::info!(peers = contacted, attempt, "Retry join completed");
                return;
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "Retry join attempt failed");
                if join.retry_max != 0 && attempt >= join.retry_max {
                    let exhausted = JoinError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    };
                    let _ = retry_tx.send(exhausted).await;
                    return;
                }
            }
        }

        let delay = calculate_backoff(attempt, join.retry_interval_ms, join.retry_max_delay_ms, &mut rng);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = crate::cluster::cancelled(&mut stop) => {
                tracing::debug!("Retry join stopped");
                return;
            }
        }
    }
}
