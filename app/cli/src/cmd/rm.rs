//! `tusk rm` removes installed models.

use anyhow::Result;
use clap::Args;
use store::ModelStore;
use tcore::ModelName;

/// Remove an installed model.
#[derive(Args, Debug)]
pub struct Rm {
    /// The models to remove.
    #[arg(required = true)]
    pub models: Vec<String>,
}

impl Rm {
    pub fn run(self) -> Result<()> {
        let store = ModelStore::from_env();
        for model in &self.models {
            let name = ModelName::parse(model)?;
            store.delete_manifest(&name)?;
            println!("deleted '{model}'");
        }

        store.prune_layers()?;
        let manifests = store.manifests_dir();
        if manifests.exists() {
            store::prune_directory(&manifests)?;
        }
        Ok(())
    }
}
