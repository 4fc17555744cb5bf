//! meshd, a cluster-member agent daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                      MESHD                       │
//!                        │                                                  │
//!     OS signals         │  ┌──────────┐  pre-start   ┌─────────────────┐   │
//!     ───────────────────┼─▶│  signal  │─────────────▶│ pre-start       │   │
//!     (INT/TERM/HUP/PIPE)│  │  stream  │              │ watcher         │   │
//!                        │  └────┬─────┘              └────────┬────────┘   │
//!                        │       │ handoff                     │ cancel     │
//!                        │       ▼                             ▼            │
//!                        │  ┌──────────────┐   events   ┌──────────────┐    │
//!                        │  │ control loop │◀───────────│ cluster node │◀───┼──── peers
//!                        │  └──────┬───────┘            └──────────────┘    │
//!                        │         │ leave / timeout / second signal        │
//!                        │         ▼                                        │
//!                        │  ┌──────────────┐                                │
//!                        │  │   graceful   │                                │
//!                        │  │   shutdown   │                                │
//!                        │  └──────────────┘                                │
//!                        └──────────────────────────────────────────────────┘
//! ```
//!
//! The `agent` command sequences startup: configuration is loaded and
//! validated, the cluster subsystem starts under a cancellable token, LAN and
//! WAN joins run in order, and only then does the post-start control loop take
//! ownership of the signal stream.

use std::process;

use meshd::commands;
use meshd::entropy;

#[tokio::main]
async fn main() {
    // Seeded exactly once here; components that need randomness borrow it.
    let mut rng = entropy::seed();

    let registry = commands::registry();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = commands::dispatch(&registry, args, &mut rng).await;

    process::exit(code);
}
