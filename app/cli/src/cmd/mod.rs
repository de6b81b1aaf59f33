//! CLI argument parsing and command dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod cp;
pub mod list;
pub mod pull;
pub mod push;
pub mod rm;
pub mod run;

/// Tusk local model runtime.
#[derive(Parser, Debug)]
#[command(name = "tusk", about = "Run and manage local language models")]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse and dispatch the CLI command.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Run(cmd) => cmd.run().await,
            Command::Pull(cmd) => cmd.run().await,
            Command::Push(cmd) => cmd.run().await,
            Command::List(cmd) => cmd.run(),
            Command::Rm(cmd) => cmd.run(),
            Command::Cp(cmd) => cmd.run(),
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chat with a model, interactively or one-shot.
    Run(run::Run),
    /// Pull a model from a registry.
    Pull(pull::Pull),
    /// Push a model to a registry.
    Push(push::Push),
    /// List installed models.
    List(list::List),
    /// Remove an installed model.
    Rm(rm::Rm),
    /// Copy a model to a new name.
    Cp(cp::Cp),
}
