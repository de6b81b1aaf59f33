//! Blob uploads through the distribution session endpoints

use crate::{Client, ProgressFn};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use std::io::{Read, Seek, SeekFrom};
use tcore::{Layer, ModelName, Progress};
use tracing::debug;

/// Blobs up to this size upload in one `PUT`
const MONOLITHIC_LIMIT: u64 = 100 * 1024 * 1024;

/// Bytes per `PATCH` for chunked uploads
const UPLOAD_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

impl Client {
    /// Upload one blob, skipping when the registry already has it
    pub(crate) async fn upload_blob(
        &self,
        name: &ModelName,
        layer: &Layer,
        progress: ProgressFn,
    ) -> Result<()> {
        let digest = &layer.digest;
        let status = format!("pushing {}", &digest.hex()[..12.min(digest.hex().len())]);

        let head_url = format!(
            "{}/v2/{}/blobs/{}",
            name.base_url(),
            name.repository(),
            digest
        );
        let head = self
            .request(
                Method::HEAD,
                head_url,
                HeaderMap::new(),
                None,
                &[StatusCode::NOT_FOUND],
            )
            .await?;
        if head.status().is_success() {
            debug!(%digest, "blob already on registry");
            progress(Progress {
                status,
                digest: Some(digest.clone()),
                total: Some(layer.size),
                completed: Some(layer.size),
            });
            return Ok(());
        }

        let session_url = format!(
            "{}/v2/{}/blobs/uploads/",
            name.base_url(),
            name.repository()
        );
        let resp = self
            .request(Method::POST, session_url, HeaderMap::new(), None, &[])
            .await
            .context("create upload session")?;
        let location = self.resolve_location(name, resp.headers())?;

        let path = self.store().blob_path(digest);
        let size = std::fs::metadata(&path)
            .with_context(|| format!("stat blob {}", path.display()))?
            .len();

        if size < MONOLITHIC_LIMIT {
            self.upload_monolithic(&location, &path, digest.as_str(), size, &status, &progress)
                .await?;
        } else {
            self.upload_chunked(&location, &path, digest.as_str(), size, &status, &progress)
                .await?;
        }

        Ok(())
    }

    /// One-shot `PUT` upload for small blobs
    async fn upload_monolithic(
        &self,
        location: &str,
        path: &std::path::Path,
        digest: &str,
        size: u64,
        status: &str,
        progress: &ProgressFn,
    ) -> Result<()> {
        let body = tokio::fs::read(path).await?;
        let url = finalize_url(location, digest);
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        let resp = self
            .request(
                Method::PUT,
                url,
                headers,
                Some(body),
                &[StatusCode::CONFLICT],
            )
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            debug!(digest, "blob already exists, skipping upload");
        }

        progress(Progress {
            status: status.to_string(),
            digest: None,
            total: Some(size),
            completed: Some(size),
        });
        Ok(())
    }

    /// Chunked `PATCH` upload following the session's moving location
    async fn upload_chunked(
        &self,
        location: &str,
        path: &std::path::Path,
        digest: &str,
        size: u64,
        status: &str,
        progress: &ProgressFn,
    ) -> Result<()> {
        let mut location = location.to_string();
        let mut offset = 0u64;
        let path = path.to_path_buf();

        while offset < size {
            let len = UPLOAD_CHUNK_SIZE.min(size - offset);
            let chunk = read_chunk(path.clone(), offset, len).await?;

            let mut headers = HeaderMap::new();
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            headers.insert(
                CONTENT_RANGE,
                HeaderValue::from_str(&format!("{}-{}", offset, offset + len - 1))
                    .expect("content range is ascii"),
            );

            let resp = self
                .request(Method::PATCH, location.clone(), headers, Some(chunk), &[])
                .await
                .with_context(|| format!("upload chunk at {offset}"))?;
            if let Some(next) = resp.headers().get(LOCATION) {
                location = next.to_str()?.to_string();
            }

            offset += len;
            progress(Progress {
                status: status.to_string(),
                digest: None,
                total: Some(size),
                completed: Some(offset),
            });
        }

        let resp = self
            .request(
                Method::PUT,
                finalize_url(&location, digest),
                HeaderMap::new(),
                None,
                &[StatusCode::CONFLICT],
            )
            .await
            .context("finalize upload")?;
        if resp.status() == StatusCode::CONFLICT {
            debug!(digest, "blob already exists, skipping finalize");
        }
        Ok(())
    }

    /// Resolve the session location header, which may be relative
    fn resolve_location(&self, name: &ModelName, headers: &HeaderMap) -> Result<String> {
        let location = headers
            .get(LOCATION)
            .context("upload session missing location")?
            .to_str()?;
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(location.to_string());
        }
        Ok(format!("{}{}", name.base_url(), location))
    }
}

/// Append the digest query parameter to a session URL
fn finalize_url(location: &str, digest: &str) -> String {
    let sep = if location.contains('?') { '&' } else { '?' };
    format!("{location}{sep}digest={digest}")
}

/// Read one chunk of a file on a blocking thread
async fn read_chunk(path: std::path::PathBuf, offset: u64, len: u64) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    })
    .await?
}
