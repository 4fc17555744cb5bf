//! Shared test helpers: a scripted cluster subsystem and a manual signal feed.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use meshd::cluster::{
    Cluster, ClusterEvents, EventSenders, JoinError, LeaveError, ReloadError, StartError,
};
use meshd::config::AgentConfig;
use meshd::lifecycle::control::{ControlLoop, LifecyclePhase};
use meshd::lifecycle::signals::{ShutdownSignal, SignalStream};

/// How the scripted `start()` behaves.
#[derive(Clone, Copy)]
pub enum StartBehavior {
    /// Complete successfully after the delay.
    CompleteAfter(Duration),
    /// Block until the cancel token flips, then report the abort.
    WaitForCancel,
}

/// How the scripted `leave()` behaves.
#[derive(Clone, Copy)]
pub enum LeaveBehavior {
    /// Complete successfully after the delay.
    CompleteAfter(Duration),
    /// Return an error after the delay.
    FailAfter(Duration),
    /// Never return.
    Hang,
}

/// A scripted stand-in for the cluster subsystem.
pub struct ScriptedCluster {
    config: Mutex<Arc<AgentConfig>>,
    reload_script: Mutex<VecDeque<Option<AgentConfig>>>,
    start_behavior: StartBehavior,
    leave_behavior: LeaveBehavior,
    pub leave_calls: AtomicUsize,
    pub start_sync_calls: AtomicUsize,
    pub join_lan_calls: Mutex<Vec<Vec<String>>>,
    pub join_wan_calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCluster {
    pub fn new(config: AgentConfig) -> (Self, ClusterEvents, EventSenders) {
        let (senders, events) = ClusterEvents::channel();
        let cluster = Self {
            config: Mutex::new(Arc::new(config)),
            reload_script: Mutex::new(VecDeque::new()),
            start_behavior: StartBehavior::CompleteAfter(Duration::ZERO),
            leave_behavior: LeaveBehavior::CompleteAfter(Duration::ZERO),
            leave_calls: AtomicUsize::new(0),
            start_sync_calls: AtomicUsize::new(0),
            join_lan_calls: Mutex::new(Vec::new()),
            join_wan_calls: Mutex::new(Vec::new()),
        };
        (cluster, events, senders)
    }

    pub fn with_start(mut self, behavior: StartBehavior) -> Self {
        self.start_behavior = behavior;
        self
    }

    pub fn with_leave(mut self, behavior: LeaveBehavior) -> Self {
        self.leave_behavior = behavior;
        self
    }

    /// Queue the outcome of the next `reload_config` call: a new snapshot on
    /// success, `None` for a failure.
    pub fn script_reload(&self, outcome: Option<AgentConfig>) {
        self.reload_script.lock().unwrap().push_back(outcome);
    }

    pub fn leave_count(&self) -> usize {
        self.leave_calls.load(Ordering::SeqCst)
    }
}

async fn wait_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Cluster for ScriptedCluster {
    async fn start(&mut self, mut cancel: watch::Receiver<bool>) -> Result<(), StartError> {
        match self.start_behavior {
            StartBehavior::CompleteAfter(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(()),
                    _ = wait_cancel(&mut cancel) => Err(StartError::Aborted),
                }
            }
            StartBehavior::WaitForCancel => {
                wait_cancel(&mut cancel).await;
                Err(StartError::Aborted)
            }
        }
    }

    async fn join_lan(&self, addrs: &[String]) -> Result<usize, JoinError> {
        self.join_lan_calls.lock().unwrap().push(addrs.to_vec());
        Ok(addrs.len())
    }

    async fn join_wan(&self, addrs: &[String]) -> Result<usize, JoinError> {
        self.join_wan_calls.lock().unwrap().push(addrs.to_vec());
        Ok(addrs.len())
    }

    fn start_sync(&self) {
        self.start_sync_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn leave(&self) -> Result<(), LeaveError> {
        self.leave_calls.fetch_add(1, Ordering::SeqCst);
        match self.leave_behavior {
            LeaveBehavior::CompleteAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            LeaveBehavior::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(LeaveError::AlreadyLeft)
            }
            LeaveBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn reload_config(&self) -> Result<(), ReloadError> {
        let scripted = self.reload_script.lock().unwrap().pop_front();
        match scripted {
            Some(Some(new_config)) => {
                *self.config.lock().unwrap() = Arc::new(new_config);
                Ok(())
            }
            Some(None) => Err(ReloadError::NoConfigSource),
            None => Ok(()),
        }
    }

    fn config(&self) -> Arc<AgentConfig> {
        Arc::clone(&self.config.lock().unwrap())
    }
}

/// A signal stream fed by hand.
pub fn signal_stream() -> (mpsc::Sender<ShutdownSignal>, SignalStream) {
    let (tx, rx) = mpsc::channel(10);
    (tx, SignalStream::from_channel(rx))
}

/// Default test configuration: graceful on interrupt, forced on terminate.
pub fn test_config() -> AgentConfig {
    AgentConfig::default()
}

/// Wire a control loop around a scripted cluster.
pub struct Harness {
    pub cluster: Arc<ScriptedCluster>,
    pub signals: mpsc::Sender<ShutdownSignal>,
    pub senders: EventSenders,
    pub shutdown_requests: mpsc::Sender<()>,
    pub phase: watch::Receiver<LifecyclePhase>,
    pub exit: tokio::task::JoinHandle<i32>,
}

impl Harness {
    pub fn spawn(cluster: ScriptedCluster, events: ClusterEvents, senders: EventSenders) -> Self {
        let config = cluster.config();
        let cluster = Arc::new(cluster);
        let (signal_tx, signals) = signal_stream();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (phase_tx, phase_rx) = watch::channel(LifecyclePhase::NotStarted);

        let control = ControlLoop::new(
            Arc::clone(&cluster),
            config,
            signals,
            events,
            shutdown_rx,
            phase_tx,
        );
        let exit = tokio::spawn(control.run());

        Self {
            cluster,
            signals: signal_tx,
            senders,
            shutdown_requests: shutdown_tx,
            phase: phase_rx,
            exit,
        }
    }

    pub async fn send(&self, signal: ShutdownSignal) {
        self.signals.send(signal).await.unwrap();
    }

    /// Wait until the published phase equals `expected`.
    pub async fn wait_for_phase(&mut self, expected: LifecyclePhase) {
        loop {
            if *self.phase.borrow() == expected {
                return;
            }
            self.phase.changed().await.unwrap();
        }
    }

    pub async fn exit_code(self) -> i32 {
        self.exit.await.unwrap()
    }
}
