//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Root configuration for the agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Node identity (name, id, datacenter).
    pub node: NodeIdentityConfig,

    /// Cluster networking (bind and advertise addresses).
    pub network: NetworkConfig,

    /// Startup and background join behavior.
    pub join: JoinConfig,

    /// Shutdown behavior (graceful leave policy and timeout).
    pub shutdown: ShutdownConfig,

    /// Background update check settings.
    pub update_check: UpdateCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Data directory for state the agent persists (signature file).
    pub data_dir: Option<PathBuf>,
}

/// Node identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NodeIdentityConfig {
    /// Node name, unique within the cluster.
    pub name: String,

    /// Node id; generated at load time when absent.
    pub id: Option<Uuid>,

    /// Datacenter this node belongs to.
    pub datacenter: String,
}

impl Default for NodeIdentityConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            id: None,
            datacenter: "dc1".to_string(),
        }
    }
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "meshd-node".to_string())
}

/// Cluster networking configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the cluster listener binds to (e.g. "0.0.0.0:8301").
    pub bind_address: String,

    /// Address advertised to peers; defaults to the bind address.
    pub advertise_address: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8301".to_string(),
            advertise_address: None,
        }
    }
}

/// Join configuration for startup and background retry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct JoinConfig {
    /// LAN peers contacted once at startup. A failure here is fatal.
    pub start_join_lan: Vec<String>,

    /// WAN peers contacted once at startup, after the LAN join.
    pub start_join_wan: Vec<String>,

    /// Peers the background retry-join task keeps contacting after startup.
    pub retry_join: Vec<String>,

    /// Maximum retry-join attempts before the failure is reported as fatal.
    /// Zero means retry forever.
    pub retry_max: u32,

    /// Base delay between retry-join attempts in milliseconds.
    pub retry_interval_ms: u64,

    /// Cap on the backoff delay between retry-join attempts in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            start_join_lan: Vec::new(),
            start_join_wan: Vec::new(),
            retry_join: Vec::new(),
            retry_max: 0,
            retry_interval_ms: 30_000,
            retry_max_delay_ms: 300_000,
        }
    }
}

/// Shutdown behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Exit immediately on interrupt instead of leaving gracefully.
    pub skip_leave_on_interrupt: bool,

    /// Leave gracefully on terminate; off, terminate exits immediately.
    pub leave_on_terminate: bool,

    /// How long a graceful leave may take before the agent gives up.
    pub graceful_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            skip_leave_on_interrupt: false,
            leave_on_terminate: false,
            graceful_timeout_secs: 15,
        }
    }
}

/// Background update check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpdateCheckConfig {
    /// Enable the periodic update check.
    pub enabled: bool,

    /// Endpoint queried for release information.
    pub endpoint: String,

    /// Omit the anonymous signature file from check requests.
    pub disable_anonymous_signature: bool,
}

impl Default for UpdateCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://checkpoint.meshd.io".to_string(),
            disable_anonymous_signature: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON; also suppresses the human startup output.
    pub log_json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl AgentConfig {
    /// Address peers should use to reach this node.
    pub fn advertise_address(&self) -> &str {
        self.network
            .advertise_address
            .as_deref()
            .unwrap_or(&self.network.bind_address)
    }

    /// Path of the anonymous signature file, when one is configured.
    pub fn signature_file(&self) -> Option<PathBuf> {
        if self.update_check.disable_anonymous_signature {
            return None;
        }
        self.data_dir.as_ref().map(|d| d.join("update-signature"))
    }
}
