//! `tusk push` uploads a model to a registry.

use super::pull::print_progress;
use anyhow::Result;
use clap::Args;
use registry::{Client, RegistryOptions};
use std::sync::Arc;
use store::ModelStore;
use tcore::ModelName;

/// Push a model to a registry.
#[derive(Args, Debug)]
pub struct Push {
    /// The model to push.
    pub model: String,

    /// Allow plain-http registries.
    #[arg(long)]
    pub insecure: bool,
}

impl Push {
    pub async fn run(self) -> Result<()> {
        let name = ModelName::parse(&self.model)?;
        let client = Client::new(
            ModelStore::from_env(),
            RegistryOptions {
                insecure: self.insecure,
                ..RegistryOptions::default()
            },
        )?;

        client.push(&name, Arc::new(print_progress)).await
    }
}
