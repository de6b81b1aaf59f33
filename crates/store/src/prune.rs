//! Empty-directory cleanup

use anyhow::Result;
use std::fs;
use std::path::Path;

/// Recursively remove empty directories under `path`, including `path`
/// itself once drained.
///
/// Symlinks are never traversed or removed.
pub fn prune_directory(path: &Path) -> Result<()> {
    let info = fs::symlink_metadata(path)?;
    if !info.is_dir() || info.file_type().is_symlink() {
        return Ok(());
    }

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && !entry.file_type()?.is_symlink() {
            prune_directory(&entry.path())?;
        }
    }

    if fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
    }
    Ok(())
}
