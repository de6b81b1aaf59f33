//! Resumable parallel blob downloads

use crate::{Client, ProgressFn};
use anyhow::{bail, Context, Result};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tcore::{Digest, ModelName, Progress};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Bytes per ranged request
const CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Ranged requests in flight per blob
const CHUNK_PARALLELISM: usize = 8;

/// On-disk record of which chunks of a blob have landed.
///
/// Lives next to the staging file as a `.part` side-car so an interrupted
/// pull resumes with only the missing ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkJournal {
    /// Total blob size in bytes
    pub total: u64,

    /// The chunk split used when the journal was created
    pub chunk_size: u64,

    /// Per-chunk completion flags
    pub completed: Vec<bool>,
}

impl ChunkJournal {
    /// A fresh journal for a blob of the given size
    pub fn new(total: u64) -> Self {
        let chunks = total.div_ceil(CHUNK_SIZE).max(1) as usize;
        Self {
            total,
            chunk_size: CHUNK_SIZE,
            completed: vec![false; chunks],
        }
    }

    /// Load a journal from disk
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).context("decode chunk journal")
    }

    /// Persist the journal
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    /// The inclusive byte range of chunk `i`
    pub fn range(&self, i: usize) -> (u64, u64) {
        let start = i as u64 * self.chunk_size;
        let end = ((i as u64 + 1) * self.chunk_size).min(self.total) - 1;
        (start, end)
    }

    /// Indexes of chunks still to download
    pub fn pending(&self) -> Vec<usize> {
        self.completed
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
            .collect()
    }

    /// Bytes already landed
    pub fn completed_bytes(&self) -> u64 {
        self.completed
            .iter()
            .enumerate()
            .filter(|(_, done)| **done)
            .map(|(i, _)| {
                let (start, end) = self.range(i);
                end - start + 1
            })
            .sum()
    }

    /// Whether every chunk has landed
    pub fn is_complete(&self) -> bool {
        self.completed.iter().all(|d| *d)
    }
}

impl Client {
    /// Download one blob into the store, resuming from any existing journal.
    ///
    /// Returns true on a cache hit. The digest is verified before the blob
    /// is renamed into its final path; a mismatch fails the pull and leaves
    /// the journal in place.
    pub(crate) async fn download_blob(
        &self,
        name: &ModelName,
        digest: &Digest,
        size: u64,
        progress: ProgressFn,
    ) -> Result<bool> {
        let status = format!("pulling {}", &digest.hex()[..12.min(digest.hex().len())]);

        if self.store().has_blob(digest, size) {
            progress(Progress {
                status,
                digest: Some(digest.clone()),
                total: Some(size),
                completed: Some(size),
            });
            return Ok(true);
        }

        std::fs::create_dir_all(self.store().blobs_dir())?;
        let staging = self.store().partial_path(digest);
        let journal_path = journal_path(&staging);

        let journal = match ChunkJournal::load(&journal_path) {
            Ok(journal) if journal.total == size && staging.exists() => {
                debug!(%digest, "resuming interrupted download");
                journal
            }
            _ => {
                let journal = ChunkJournal::new(size);
                // preallocate so positional chunk writes cannot race the
                // file length
                let file = std::fs::File::create(&staging)?;
                file.set_len(size)?;
                journal.save(&journal_path)?;
                journal
            }
        };

        let url = format!(
            "{}/v2/{}/blobs/{}",
            name.base_url(),
            name.repository(),
            digest
        );

        let done = Arc::new(AtomicU64::new(journal.completed_bytes()));
        progress(Progress {
            status: status.clone(),
            digest: Some(digest.clone()),
            total: Some(size),
            completed: Some(done.load(Ordering::Relaxed)),
        });

        let pending = journal.pending();
        let journal = Arc::new(Mutex::new(journal));

        futures_util::stream::iter(pending.into_iter().map(|i| {
            let url = url.clone();
            let status = status.clone();
            let staging = staging.clone();
            let journal_path = journal_path.clone();
            let journal = journal.clone();
            let done = done.clone();
            let progress = progress.clone();
            let digest = digest.clone();

            async move {
                let (start, end) = journal.lock().await.range(i);
                self.download_chunk(&url, &staging, start, end, |n| {
                    let completed = done.fetch_add(n, Ordering::Relaxed) + n;
                    progress(Progress {
                        status: status.clone(),
                        digest: Some(digest.clone()),
                        total: Some(size),
                        completed: Some(completed),
                    });
                })
                .await
                .with_context(|| format!("chunk {i} of {digest}"))?;

                let mut journal = journal.lock().await;
                journal.completed[i] = true;
                journal.save(&journal_path)?;
                Ok::<_, anyhow::Error>(())
            }
        }))
        .buffer_unordered(CHUNK_PARALLELISM)
        .try_collect::<Vec<_>>()
        .await?;

        let computed = file_digest(staging.clone()).await?;
        if computed != *digest {
            bail!("digest mismatch for {digest}: downloaded {computed}; file a bug report");
        }

        std::fs::remove_file(&journal_path).ok();
        std::fs::rename(&staging, self.store().blob_path(digest))?;
        debug!(%digest, "blob download complete");
        Ok(false)
    }

    /// Fetch one ranged chunk and write it at its offset
    async fn download_chunk(
        &self,
        url: &str,
        staging: &Path,
        start: u64,
        end: u64,
        mut on_bytes: impl FnMut(u64),
    ) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            RANGE,
            HeaderValue::from_str(&format!("bytes={start}-{end}"))
                .expect("range header is ascii"),
        );

        let resp = self
            .request(Method::GET, url.to_string(), headers, None, &[])
            .await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(staging)
            .await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;

        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            on_bytes(chunk.len() as u64);
        }
        file.flush().await?;

        let expected = end - start + 1;
        if written != expected {
            warn!(url, start, end, written, "short chunk read");
            bail!("short read: got {written} of {expected} bytes");
        }
        Ok(())
    }
}

/// The `.part` journal path for a staging file
pub(crate) fn journal_path(staging: &Path) -> PathBuf {
    staging.with_extension("part")
}

/// Hash a file on a blocking thread
async fn file_digest(path: PathBuf) -> Result<Digest> {
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 1 << 20];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest::from_sha256(hasher.finalize().as_slice()))
    })
    .await?
}
