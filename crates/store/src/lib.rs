//! Content-addressed model package store
//!
//! Blobs live under `blobs/sha256-<hex>`; manifests under
//! `manifests/<host>/<namespace>/<name>/<tag>`. Writers stage into `.partial`
//! sentinels and rename atomically; readers open blobs by path only after
//! prune passes complete.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tcore::{Digest, DigestReader, Manifest, ModelName};
use tracing::{debug, info, warn};

pub use crate::prune::prune_directory;

mod prune;

/// Subdirectories of a directory, sorted by name
fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The model package store rooted at a models directory
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    /// Open a store at the given root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store at the environment-configured root
    pub fn from_env() -> Self {
        Self::new(tcore::env::models_dir())
    }

    /// The store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The blobs directory
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// The manifests directory
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    /// The path a blob with this digest lives at
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blobs_dir().join(digest.filename())
    }

    /// Validate a raw digest string and resolve its blob path
    pub fn blob_path_checked(&self, digest: &str) -> Result<PathBuf> {
        let digest = Digest::parse(digest)?;
        Ok(self.blob_path(&digest))
    }

    /// The staging path used while a blob is being written
    pub fn partial_path(&self, digest: &Digest) -> PathBuf {
        self.blobs_dir().join(format!("{}.partial", digest.filename()))
    }

    /// Whether a verified blob of the given size is already present
    pub fn has_blob(&self, digest: &Digest, size: u64) -> bool {
        fs::metadata(self.blob_path(digest))
            .map(|m| m.is_file() && m.len() == size)
            .unwrap_or(false)
    }

    /// The manifest file path for a model name
    pub fn manifest_path(&self, name: &ModelName) -> PathBuf {
        self.manifests_dir().join(name.manifest_rel_path())
    }

    /// Read and decode a manifest, returning its computed digest.
    ///
    /// The file streams through a SHA-256 tee while decoding, so the digest
    /// covers exactly the installed bytes.
    pub fn get_manifest(&self, name: &ModelName) -> Result<(Manifest, Digest)> {
        let path = self.manifest_path(name);
        let file = fs::File::open(&path)
            .with_context(|| format!("open manifest {}", path.display()))?;

        let mut reader = DigestReader::new(file);
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;

        let manifest: Manifest = serde_json::from_slice(&raw)
            .with_context(|| format!("decode manifest {}", path.display()))?;
        Ok((manifest, reader.digest()))
    }

    /// Install a manifest atomically: temp file, fsync, rename into place
    pub fn write_manifest(&self, name: &ModelName, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path(name);
        let dir = path.parent().expect("manifest path has a parent");
        fs::create_dir_all(dir)?;

        // append rather than swap an "extension": tags may contain dots
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let raw = serde_json::to_vec(manifest)?;
        {
            let mut file = fs::File::create(&tmp)?;
            use std::io::Write;
            file.write_all(&raw)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("install manifest {}", path.display()))?;
        Ok(())
    }

    /// Copy a manifest from one fully-qualified name to another.
    ///
    /// Self-copy is a no-op.
    pub fn copy_model(&self, src: &ModelName, dst: &ModelName) -> Result<()> {
        if !src.is_fully_qualified() {
            bail!("source model name {src} is not fully qualified");
        }
        if !dst.is_fully_qualified() {
            bail!("destination model name {dst} is not fully qualified");
        }

        let srcpath = self.manifest_path(src);
        let dstpath = self.manifest_path(dst);
        if srcpath == dstpath {
            return Ok(());
        }

        fs::create_dir_all(dstpath.parent().expect("manifest path has a parent"))?;
        fs::copy(&srcpath, &dstpath)
            .with_context(|| format!("copy {} to {}", srcpath.display(), dstpath.display()))?;
        Ok(())
    }

    /// Remove a model's manifest
    pub fn delete_manifest(&self, name: &ModelName) -> Result<()> {
        let path = self.manifest_path(name);
        fs::remove_file(&path)
            .with_context(|| format!("remove manifest {}", path.display()))?;
        Ok(())
    }

    /// Enumerate installed manifests.
    ///
    /// With `ignore_corrupt`, undecodable files are skipped with a warning
    /// rather than failing the enumeration; prune passes rely on this so a
    /// broken manifest cannot pin freshly-orphaned blobs.
    pub fn manifests(&self, ignore_corrupt: bool) -> Result<Vec<Manifest>> {
        let mut found = Vec::new();
        let dir = self.manifests_dir();
        if !dir.exists() {
            return Ok(found);
        }

        let mut stack = vec![dir];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    stack.push(path);
                    continue;
                }

                match fs::read(&path)
                    .map_err(anyhow::Error::from)
                    .and_then(|raw| serde_json::from_slice(&raw).map_err(Into::into))
                {
                    Ok(manifest) => found.push(manifest),
                    Err(err) if ignore_corrupt => {
                        warn!(path = %path.display(), %err, "skipping corrupt manifest");
                    }
                    Err(err) => {
                        return Err(err.context(format!("decode manifest {}", path.display())))
                    }
                }
            }
        }

        Ok(found)
    }

    /// Enumerate installed models as `host/namespace/name:tag` plus their
    /// manifests, skipping corrupt entries
    pub fn list(&self) -> Result<Vec<(String, Manifest)>> {
        let mut found = Vec::new();
        let root = self.manifests_dir();
        if !root.exists() {
            return Ok(found);
        }

        for host in read_dirs(&root)? {
            for namespace in read_dirs(&host)? {
                for name in read_dirs(&namespace)? {
                    for entry in fs::read_dir(&name)? {
                        let entry = entry?;
                        if !entry.file_type()?.is_file() {
                            continue;
                        }
                        let raw = fs::read(entry.path())?;
                        let manifest: Manifest = match serde_json::from_slice(&raw) {
                            Ok(m) => m,
                            Err(err) => {
                                warn!(path = %entry.path().display(), %err, "skipping corrupt manifest");
                                continue;
                            }
                        };
                        let display = format!(
                            "{}/{}/{}:{}",
                            file_name(&host),
                            file_name(&namespace),
                            file_name(&name),
                            entry.file_name().to_string_lossy(),
                        );
                        found.push((display, manifest));
                    }
                }
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Delete every candidate blob not referenced by an installed manifest.
    ///
    /// Returns the number of blobs removed. Per-file removal failures are
    /// logged and skipped so one stubborn file cannot block the pass.
    pub fn delete_unused_layers(&self, candidates: &HashSet<Digest>) -> Result<usize> {
        let mut unused = candidates.clone();
        for manifest in self.manifests(true)? {
            for digest in manifest.digests() {
                unused.remove(digest);
            }
        }

        let mut removed = 0;
        for digest in &unused {
            let path = self.blob_path(digest);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(%digest, "removed unused blob");
                    removed += 1;
                }
                Err(err) => info!(path = %path.display(), %err, "couldn't remove blob"),
            }
        }
        Ok(removed)
    }

    /// Sweep the blobs directory: malformed filenames are deleted outright,
    /// well-formed ones are removed if no manifest references them
    pub fn prune_layers(&self) -> Result<usize> {
        let dir = self.blobs_dir();
        if !dir.exists() {
            return Ok(0);
        }

        let mut candidates = HashSet::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            // in-flight writers hold a .partial sentinel; leave theirs alone
            if name.ends_with(".partial") || name.ends_with(".part") {
                continue;
            }

            match Digest::from_filename(&name) {
                Ok(digest) => {
                    candidates.insert(digest);
                }
                Err(_) => {
                    if let Err(err) = fs::remove_file(entry.path()) {
                        warn!(blob = %name, %err, "couldn't remove malformed blob");
                    }
                }
            }
        }

        info!(total = candidates.len(), "pruning blobs");
        let removed = self.delete_unused_layers(&candidates)?;
        info!(removed, "pruned unused blobs");
        Ok(removed)
    }
}
