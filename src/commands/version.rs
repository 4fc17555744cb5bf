//! Version command.

use async_trait::async_trait;

use crate::commands::Command;
use crate::entropy::SeededRng;

/// Prints the agent version.
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    fn synopsis(&self) -> &'static str {
        "Prints the meshd version"
    }

    async fn run(&mut self, _args: Vec<String>, _rng: &mut SeededRng) -> i32 {
        println!("meshd v{}", env!("CARGO_PKG_VERSION"));
        0
    }
}
