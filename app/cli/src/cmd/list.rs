//! `tusk list` prints installed models.

use anyhow::Result;
use clap::Args;
use store::ModelStore;

/// List installed models.
#[derive(Args, Debug)]
pub struct List {}

impl List {
    pub fn run(self) -> Result<()> {
        let store = ModelStore::from_env();
        println!("{:<48} {:>10}", "NAME", "SIZE");
        for (name, manifest) in store.list()? {
            let size: u64 = manifest.layers.iter().map(|l| l.size).sum();
            println!("{name:<48} {:>10}", human_size(size));
        }
        Ok(())
    }
}

/// Bytes rendered with a binary unit suffix
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
