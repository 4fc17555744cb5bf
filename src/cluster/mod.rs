//! Cluster subsystem boundary.
//!
//! # Data Flow
//! ```text
//! lifecycle controller
//!     → Cluster trait (start, joins, start_sync, leave, reload)
//!     → Node (TCP listener, peer tables, retry join)
//!
//! Node background tasks
//!     → ClusterEvents channels (retry failure, internal failure, shutdown)
//!     → control loop (single consumer, receivers moved in once)
//! ```
//!
//! # Design Decisions
//! - The controller never reaches into membership internals; it drives the
//!   trait and reacts to the event channels
//! - Event receivers are handed over at construction, making single-consumer
//!   ownership explicit
//! - Dropped event senders quietly disable their control-loop branch

pub mod node;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::AgentConfig;

pub use node::Node;

/// The cluster subsystem failed to come up.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("failed to bind cluster listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("startup aborted by signal")]
    Aborted,

    #[error("cluster subsystem already started")]
    AlreadyStarted,
}

/// A join attempt reached no peers, or the background retry gave up.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no peers could be contacted ({attempted} addresses tried): {last}")]
    NoPeers { attempted: usize, last: String },

    #[error("join retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("cluster subsystem is not started")]
    NotStarted,
}

/// A graceful departure could not be initiated.
#[derive(Debug, Error)]
pub enum LeaveError {
    #[error("cluster subsystem is not started")]
    NotStarted,

    #[error("node has already left the cluster")]
    AlreadyLeft,
}

/// A configuration reload was rejected; the old snapshot stays active.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("agent was started without a configuration file")]
    NoConfigSource,

    #[error(transparent)]
    Load(#[from] crate::config::ConfigError),
}

/// Entry points the lifecycle controller drives on the cluster subsystem.
#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    /// Start the subsystem. `cancel` flips to true when startup must abort;
    /// implementations observe it at their await points and return
    /// [`StartError::Aborted`] promptly instead of hanging.
    async fn start(&mut self, cancel: watch::Receiver<bool>) -> Result<(), StartError>;

    /// Contact the given LAN peers once; returns how many were reached.
    async fn join_lan(&self, addrs: &[String]) -> Result<usize, JoinError>;

    /// Contact the given WAN peers once; returns how many were reached.
    async fn join_wan(&self, addrs: &[String]) -> Result<usize, JoinError>;

    /// Mark initial registration as complete so waiting peers proceed.
    fn start_sync(&self);

    /// Ask the subsystem to depart the cluster cleanly.
    async fn leave(&self) -> Result<(), LeaveError>;

    /// Re-read configuration from the source the agent was started with.
    async fn reload_config(&self) -> Result<(), ReloadError>;

    /// Current configuration snapshot.
    fn config(&self) -> Arc<AgentConfig>;
}

/// Event sources the subsystem exposes to the control loop.
///
/// Receivers move into the loop once; there is never a second consumer.
pub struct ClusterEvents {
    /// The background retry join gave up. Fatal.
    pub retry_join_failed: mpsc::Receiver<JoinError>,

    /// The subsystem hit an unrecoverable internal error. Fatal.
    pub failed: mpsc::Receiver<()>,

    /// The subsystem went down on its own; the process exits cleanly.
    pub shutdown: mpsc::Receiver<()>,
}

/// Sender half of [`ClusterEvents`], held by subsystem internals.
#[derive(Clone)]
pub struct EventSenders {
    pub retry_join_failed: mpsc::Sender<JoinError>,
    pub failed: mpsc::Sender<()>,
    pub shutdown: mpsc::Sender<()>,
}

impl ClusterEvents {
    /// Create the event channel pair shared between a subsystem and the
    /// control loop.
    pub fn channel() -> (EventSenders, ClusterEvents) {
        let (retry_tx, retry_rx) = mpsc::channel(1);
        let (failed_tx, failed_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            EventSenders {
                retry_join_failed: retry_tx,
                failed: failed_tx,
                shutdown: shutdown_tx,
            },
            ClusterEvents {
                retry_join_failed: retry_rx,
                failed: failed_rx,
                shutdown: shutdown_rx,
            },
        )
    }
}

/// Wait until `cancel` flips to true. A dropped sender is not a
/// cancellation; this never resolves once the sender is gone.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
