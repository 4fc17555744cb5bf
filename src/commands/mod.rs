//! Command registry and dispatch.
//!
//! # Design Decisions
//! - The registry is an explicit table built once at process start and passed
//!   to the dispatcher; nothing registers itself at load time
//! - Each command parses its own flags with clap
//! - Unknown commands print the usage listing and fail

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::entropy::SeededRng;

pub mod agent;
pub mod validate;
pub mod version;

/// A runnable subcommand.
#[async_trait]
pub trait Command: Send {
    /// One-line description shown in the usage listing.
    fn synopsis(&self) -> &'static str;

    /// Run with the arguments after the command name; returns the exit code.
    async fn run(&mut self, args: Vec<String>, rng: &mut SeededRng) -> i32;
}

/// Constructor for a command instance.
pub type Factory = fn() -> Box<dyn Command>;

fn agent_factory() -> Box<dyn Command> {
    Box::new(agent::AgentCommand::new())
}

fn validate_factory() -> Box<dyn Command> {
    Box::new(validate::ValidateCommand)
}

fn version_factory() -> Box<dyn Command> {
    Box::new(version::VersionCommand)
}

/// Build the table of available commands.
pub fn registry() -> BTreeMap<&'static str, Factory> {
    let mut commands: BTreeMap<&'static str, Factory> = BTreeMap::new();
    commands.insert("agent", agent_factory);
    commands.insert("validate", validate_factory);
    commands.insert("version", version_factory);
    commands
}

/// Route `args` to a registered command; returns the process exit code.
pub async fn dispatch(
    registry: &BTreeMap<&'static str, Factory>,
    args: Vec<String>,
    rng: &mut SeededRng,
) -> i32 {
    let Some(first) = args.first() else {
        print_usage(registry);
        return 1;
    };

    let name = match first.as_str() {
        "-h" | "--help" | "help" => {
            print_usage(registry);
            return 0;
        }
        "-v" | "--version" => "version",
        other => other,
    };

    let Some(factory) = registry.get(name) else {
        eprintln!("Unknown command: {:?}", name);
        print_usage(registry);
        return 1;
    };

    let mut command = factory();
    command.run(args[1..].to_vec(), rng).await
}

fn print_usage(registry: &BTreeMap<&'static str, Factory>) {
    eprintln!("Usage: meshd <command> [options]");
    eprintln!();
    eprintln!("Available commands:");
    for (name, factory) in registry {
        eprintln!("    {:<10} {}", name, factory().synopsis());
    }
}
