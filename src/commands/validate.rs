//! Configuration validation command.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;

use crate::commands::Command;
use crate::config::loader;
use crate::entropy::SeededRng;

#[derive(Parser, Debug)]
#[command(
    name = "meshd validate",
    about = "Performs a basic sanity test on a meshd configuration file"
)]
struct ValidateArgs {
    /// Path of the TOML configuration file to check.
    config_file: PathBuf,
}

/// Validates a configuration file without starting an agent.
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    fn synopsis(&self) -> &'static str {
        "Validate a configuration file"
    }

    async fn run(&mut self, args: Vec<String>, _rng: &mut SeededRng) -> i32 {
        let args = match ValidateArgs::try_parse_from(
            std::iter::once("validate".to_string()).chain(args),
        ) {
            Ok(args) => args,
            Err(err) => {
                let _ = err.print();
                return if err.use_stderr() { 1 } else { 0 };
            }
        };

        match loader::load_config(&args.config_file) {
            Ok(_) => {
                println!("Configuration is valid!");
                0
            }
            Err(err) => {
                eprintln!("Configuration is invalid: {}", err);
                1
            }
        }
    }
}
