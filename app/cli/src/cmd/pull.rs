//! `tusk pull` fetches a model from a registry.

use anyhow::Result;
use clap::Args;
use registry::{Client, RegistryOptions};
use std::io::Write as _;
use std::sync::Arc;
use store::ModelStore;
use tcore::{ModelName, Progress};

/// Pull a model from a registry.
#[derive(Args, Debug)]
pub struct Pull {
    /// The model to pull.
    pub model: String,

    /// Allow plain-http registries.
    #[arg(long)]
    pub insecure: bool,
}

impl Pull {
    pub async fn run(self) -> Result<()> {
        let name = ModelName::parse(&self.model)?;
        let store = ModelStore::from_env();
        let client = Client::new(
            store.clone(),
            RegistryOptions {
                insecure: self.insecure,
                ..RegistryOptions::default()
            },
        )?;

        let leftovers = client.pull(&name, Arc::new(print_progress)).await?;
        store.delete_unused_layers(&leftovers)?;
        Ok(())
    }
}

/// Render progress events on one updating line per status
pub fn print_progress(p: Progress) {
    match (p.total, p.completed) {
        (Some(total), Some(completed)) if total > 0 => {
            let percent = completed * 100 / total;
            print!("\r{}: {percent:>3}%", p.status);
            if completed >= total {
                println!();
            }
            let _ = std::io::stdout().flush();
        }
        _ => println!("{}", p.status),
    }
}
