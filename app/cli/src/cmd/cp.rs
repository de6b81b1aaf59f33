//! `tusk cp` copies a model to a new name.

use anyhow::Result;
use clap::Args;
use store::ModelStore;
use tcore::ModelName;

/// Copy a model to a new name.
#[derive(Args, Debug)]
pub struct Cp {
    /// The source model.
    pub source: String,

    /// The destination name.
    pub destination: String,
}

impl Cp {
    pub fn run(self) -> Result<()> {
        let store = ModelStore::from_env();
        let src = ModelName::parse(&self.source)?;
        let dst = ModelName::parse(&self.destination)?;
        store.copy_model(&src, &dst)?;
        println!("copied '{}' to '{}'", src.short(), dst.short());
        Ok(())
    }
}
