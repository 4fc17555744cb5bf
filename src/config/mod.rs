//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → CLI flag overrides (agent command)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On SIGHUP:
//!     node reloads from the original file
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<AgentConfig>
//!     → the control loop adopts the new snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A failed reload leaves the previous snapshot untouched

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AgentConfig;
pub use schema::JoinConfig;
pub use schema::ShutdownConfig;
