//! Library for the meshd cluster-member agent daemon.

pub mod cluster;
pub mod commands;
pub mod config;
pub mod entropy;
pub mod lifecycle;
pub mod observability;
pub mod ui;
pub mod update;

pub use cluster::{Cluster, ClusterEvents, Node};
pub use config::schema::AgentConfig;
pub use lifecycle::control::ControlLoop;
pub use lifecycle::signals::{ShutdownSignal, SignalStream};
