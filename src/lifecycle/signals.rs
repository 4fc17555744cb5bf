//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM, SIGHUP, SIGPIPE)
//! - Translate signals to internal events
//! - Deliver them as one buffered stream with a single owner
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The stream moves between consumers; exactly one reads it at any time
//! - SIGPIPE is delivered as BrokenPipeIgnored so consumers can skip it
//!   without a platform check

use tokio::sync::mpsc;

/// Buffer depth of the signal stream.
const SIGNAL_BUFFER: usize = 10;

/// A signal translated to a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT. Requests shutdown; graceful unless configured otherwise.
    Interrupt,
    /// SIGTERM. Requests shutdown; forced unless configured otherwise.
    Terminate,
    /// SIGHUP. Requests a live configuration reload once running.
    Hangup,
    /// SIGPIPE. Never causes a phase transition.
    BrokenPipeIgnored,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShutdownSignal::Interrupt => "interrupt",
            ShutdownSignal::Terminate => "terminate",
            ShutdownSignal::Hangup => "hangup",
            ShutdownSignal::BrokenPipeIgnored => "broken-pipe",
        };
        f.write_str(name)
    }
}

/// Buffered stream of translated OS signals.
///
/// Ownership of the stream is the right to consume signals: the pre-start
/// watcher holds it during startup and hands it back before the control loop
/// begins, so no two consumers ever race for a delivery.
pub struct SignalStream {
    rx: mpsc::Receiver<ShutdownSignal>,
}

impl SignalStream {
    /// Subscribe to the process signal set.
    #[cfg(unix)]
    pub fn subscribe() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        for (kind, translated) in [
            (SignalKind::interrupt(), ShutdownSignal::Interrupt),
            (SignalKind::terminate(), ShutdownSignal::Terminate),
            (SignalKind::hangup(), ShutdownSignal::Hangup),
            (SignalKind::pipe(), ShutdownSignal::BrokenPipeIgnored),
        ] {
            let mut source = signal(kind)?;
            let tx = tx.clone();
            tokio::spawn(async move {
                while source.recv().await.is_some() {
                    if tx.send(translated).await.is_err() {
                        return;
                    }
                }
            });
        }
        Ok(Self { rx })
    }

    /// Subscribe to the process signal set. Only Ctrl+C maps to a signal on
    /// non-unix targets.
    #[cfg(not(unix))]
    pub fn subscribe() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                    return;
                }
            }
        });
        Ok(Self { rx })
    }

    /// Stream fed by the given channel instead of the OS; used in tests and
    /// by embedders that inject their own events.
    pub fn from_channel(rx: mpsc::Receiver<ShutdownSignal>) -> Self {
        Self { rx }
    }

    /// Receive the next signal. `None` means every source is gone.
    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        self.rx.recv().await
    }
}
