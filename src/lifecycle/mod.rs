//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Start cluster under cancel token → LAN join → WAN join
//!     → registration complete
//!
//! Control (control.rs):
//!     Signal / subsystem event → single multiplexed wait → one transition
//!
//! Shutdown (shutdown.rs):
//!     Leave in background → first of completion / second signal / timeout
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → shutdown (graceful per config)
//!     SIGHUP → config reload
//!     SIGPIPE → ignored
//! ```
//!
//! # Design Decisions
//! - Ordered startup: watcher first, then start, then joins, then the loop
//! - The signal stream has exactly one owner at a time, transferred by move
//! - Fatal subsystem events bypass the graceful path entirely
//! - Shutdown has a timeout: forced exit after the deadline

pub mod control;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use control::{ControlLoop, LifecyclePhase};
pub use signals::{ShutdownSignal, SignalStream};
