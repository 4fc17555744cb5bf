//! Agent command: run the cluster-member daemon.
//!
//! # Responsibilities
//! - Load configuration (file plus flag overrides) and bring up observability
//! - Sequence startup: cluster start, LAN join, WAN join, registration
//! - Hand the signal stream to the control loop and surface its exit code

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::sync::{mpsc, watch};

use crate::cluster::{Cluster, Node};
use crate::commands::Command;
use crate::config::{loader, AgentConfig};
use crate::entropy::SeededRng;
use crate::lifecycle::control::{ControlLoop, LifecyclePhase};
use crate::lifecycle::signals::SignalStream;
use crate::lifecycle::startup;
use crate::observability;
use crate::ui::StartupUi;
use crate::update::UpdateChecker;

#[derive(Parser, Debug, Default)]
#[command(
    name = "meshd agent",
    about = "Runs a meshd agent",
    long_about = "Starts the meshd agent and runs until an interrupt is received. \
                  The agent represents a single node in a cluster."
)]
struct AgentArgs {
    /// Path of the TOML configuration file.
    #[arg(long = "config-file")]
    config_file: Option<PathBuf>,

    /// LAN peer to join at startup; may be given multiple times.
    #[arg(long = "join")]
    join: Vec<String>,

    /// WAN peer to join at startup; may be given multiple times.
    #[arg(long = "join-wan")]
    join_wan: Vec<String>,

    /// Node name; defaults to the hostname.
    #[arg(long = "node")]
    node: Option<String>,

    /// Cluster bind address.
    #[arg(long = "bind")]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Emit logs as JSON and suppress the startup output.
    #[arg(long = "log-json")]
    log_json: bool,

    /// Data directory for agent state.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,
}

/// Runs the agent until a shutdown condition produces an exit code.
pub struct AgentCommand {
    shutdown_trigger: mpsc::Sender<()>,
    shutdown_requests: Option<mpsc::Receiver<()>>,
    phase: watch::Sender<LifecyclePhase>,
}

impl AgentCommand {
    pub fn new() -> Self {
        let (shutdown_trigger, shutdown_requests) = mpsc::channel(1);
        let (phase, _) = watch::channel(LifecyclePhase::NotStarted);
        Self {
            shutdown_trigger,
            shutdown_requests: Some(shutdown_requests),
            phase,
        }
    }

    /// Handle that asks a running agent to shut down as if interrupted.
    pub fn shutdown_trigger(&self) -> mpsc::Sender<()> {
        self.shutdown_trigger.clone()
    }

    /// Observe lifecycle phase transitions.
    pub fn phase_watch(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    fn load(args: &AgentArgs) -> Result<AgentConfig, loader::ConfigError> {
        let mut config = match &args.config_file {
            Some(path) => loader::load_file(path)?,
            None => AgentConfig::default(),
        };

        if let Some(node) = &args.node {
            config.node.name = node.clone();
        }
        if let Some(bind) = &args.bind {
            config.network.bind_address = bind.clone();
        }
        if let Some(level) = &args.log_level {
            config.observability.log_level = level.clone();
        }
        if args.log_json {
            config.observability.log_json = true;
        }
        if let Some(dir) = &args.data_dir {
            config.data_dir = Some(dir.clone());
        }
        config.join.start_join_lan.extend(args.join.iter().cloned());
        config
            .join
            .start_join_wan
            .extend(args.join_wan.iter().cloned());

        loader::finish(config)
    }

    async fn run_agent(
        &mut self,
        args: &AgentArgs,
        config: AgentConfig,
        rng: &mut SeededRng,
    ) -> i32 {
        let ui = StartupUi::new(config.observability.log_json);
        let node_id = config
            .node
            .id
            .map(|id| id.to_string())
            .unwrap_or_default();

        ui.output("Starting meshd agent...");
        ui.info(&format!("     Version: 'v{}'", env!("CARGO_PKG_VERSION")));
        ui.info(&format!("     Node ID: '{}'", node_id));
        ui.info(&format!("   Node name: '{}'", config.node.name));
        ui.info(&format!("  Datacenter: '{}'", config.node.datacenter));
        ui.info(&format!("   Bind Addr: '{}'", config.network.bind_address));
        ui.info(&format!("  Advertised: '{}'", config.advertise_address()));
        ui.output("");
        ui.output("Log data will now stream in as it occurs:");

        let signals = match SignalStream::subscribe() {
            Ok(signals) => signals,
            Err(err) => {
                tracing::error!(error = %err, "Failed to subscribe to signals");
                return 1;
            }
        };

        let config = Arc::new(config);
        let (mut node, events) = Node::new(
            (*config).clone(),
            args.config_file.clone(),
            rng.derive(),
        );

        self.phase.send_replace(LifecyclePhase::Starting);
        let (signals, started) = startup::start_cluster(&mut node, signals).await;
        if let Err(err) = started {
            tracing::error!(error = %err, "Error starting agent");
            return 1;
        }

        if config.update_check.enabled {
            UpdateChecker::new(
                config.update_check.endpoint.clone(),
                env!("CARGO_PKG_VERSION").to_string(),
                config.signature_file(),
            )
            .spawn(rng.rng());
        }

        let node = Arc::new(node);

        self.phase.send_replace(LifecyclePhase::Joining);
        if let Err(err) = startup::startup_join(node.as_ref(), &ui, &config).await {
            tracing::error!(error = %err, "Join failed");
            return 1;
        }
        if let Err(err) = startup::startup_join_wan(node.as_ref(), &ui, &config).await {
            tracing::error!(error = %err, "Join -wan failed");
            return 1;
        }

        node.start_sync();
        ui.output("meshd agent running!");

        let shutdown_requests = match self.shutdown_requests.take() {
            Some(requests) => requests,
            None => {
                tracing::error!("Agent command ran twice");
                return 1;
            }
        };

        ControlLoop::new(
            node,
            Arc::clone(&config),
            signals,
            events,
            shutdown_requests,
            self.phase.clone(),
        )
        .run()
        .await
    }
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for AgentCommand {
    fn synopsis(&self) -> &'static str {
        "Runs a meshd agent"
    }

    async fn run(&mut self, args: Vec<String>, rng: &mut SeededRng) -> i32 {
        let args =
            match AgentArgs::try_parse_from(std::iter::once("agent".to_string()).chain(args)) {
                Ok(args) => args,
                Err(err) => {
                    let _ = err.print();
                    return if err.use_stderr() { 1 } else { 0 };
                }
            };

        let config = match Self::load(&args) {
            Ok(config) => config,
            Err(err) => {
                StartupUi::new(false).error(&err.to_string());
                return 1;
            }
        };

        if let Err(err) = observability::logging::init(&config.observability) {
            StartupUi::new(false).error(&err.to_string());
            return 1;
        }
        tracing::debug!(
            securely_seeded = rng.securely_seeded(),
            "Random generator seeded"
        );

        if config.observability.metrics_enabled {
            match config.observability.metrics_address.parse() {
                Ok(addr) => observability::metrics::init_metrics(addr),
                Err(_) => tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        let code = self.run_agent(&args, config, rng).await;
        tracing::info!(code, "Exit code");
        code
    }
}
