//! Registry client speaking the OCI distribution protocol
//!
//! Pulls resolve a remote manifest and download its blobs with ranged,
//! resumable, parallel requests; pushes upload blobs through the session
//! endpoints and install the manifest last. Transient failures retry with
//! capped exponential backoff; `401` challenges are recovered once by
//! bearer-token refresh. Cancellation is structural: dropping the returned
//! future aborts at the next await point and the chunk journal keeps
//! partial downloads resumable.

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use store::ModelStore;
use tcore::manifest::MANIFEST_MEDIA_TYPE;
use tcore::{Digest, Layer, Manifest, ModelName, Progress};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use crate::download::ChunkJournal;

mod download;
mod upload;

pub mod auth;
pub mod retry;

/// Progress callback shared across parallel chunk transfers
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Connection settings for a registry
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Allow plain-http registries
    pub insecure: bool,

    /// Basic-auth username
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// A pre-issued bearer token
    pub token: Option<String>,
}

/// A client bound to one local store
pub struct Client {
    http: reqwest::Client,
    store: ModelStore,
    opts: RegistryOptions,
    /// Bearer token refreshed through auth challenges
    token: Mutex<Option<String>>,
}

impl Client {
    /// Build a client over the given store
    pub fn new(store: ModelStore, opts: RegistryOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        let token = Mutex::new(opts.token.clone());
        Ok(Self {
            http,
            store,
            opts,
            token,
        })
    }

    /// The backing store
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Pull a model: fetch the remote manifest, download every blob, and
    /// install the manifest atomically.
    ///
    /// Returns the digests that only the previously-installed version
    /// referenced; pruning them is the caller's explicit step.
    pub async fn pull(&self, name: &ModelName, progress: ProgressFn) -> Result<HashSet<Digest>> {
        let mut candidate_delete = HashSet::new();
        match self.store.get_manifest(name) {
            Ok((old, _)) => candidate_delete.extend(old.digests().cloned()),
            Err(err) if is_not_found(&err) => {}
            Err(err) => warn!(%name, %err, "pulling over a bad existing manifest"),
        }

        self.check_scheme(name)?;

        progress(Progress::status("pulling manifest"));
        let manifest = self.pull_manifest(name).await?;

        for layer in manifest.digests_with_sizes() {
            self.download_blob(name, &layer.digest, layer.size, progress.clone())
                .await?;
            candidate_delete.remove(&layer.digest);
        }

        progress(Progress::status("verifying sha256 digest"));
        progress(Progress::status("writing manifest"));
        self.store.write_manifest(name, &manifest)?;
        progress(Progress::status("success"));

        Ok(candidate_delete)
    }

    /// Push a model: upload every blob, then the manifest
    pub async fn push(&self, name: &ModelName, progress: ProgressFn) -> Result<()> {
        progress(Progress::status("retrieving manifest"));
        self.check_scheme(name)?;

        let (manifest, _) = self.store.get_manifest(name)?;

        for layer in manifest.digests_with_sizes() {
            self.upload_blob(name, &layer, progress.clone()).await?;
        }

        progress(Progress::status("pushing manifest"));
        let url = format!(
            "{}/v2/{}/manifests/{}",
            name.base_url(),
            name.repository(),
            name.tag
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(MANIFEST_MEDIA_TYPE));
        let body = serde_json::to_vec(&manifest)?;
        self.request(Method::PUT, url, headers, Some(body), &[])
            .await?;

        progress(Progress::status("success"));
        Ok(())
    }

    /// Fetch and decode the remote manifest
    async fn pull_manifest(&self, name: &ModelName) -> Result<Manifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            name.base_url(),
            name.repository(),
            name.tag
        );
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_MEDIA_TYPE));

        let resp = self
            .request(Method::GET, url, headers, None, &[])
            .await
            .context("pull model manifest")?;
        let manifest = resp.json::<Manifest>().await?;
        Ok(manifest)
    }

    /// Reject plain http unless explicitly allowed
    fn check_scheme(&self, name: &ModelName) -> Result<()> {
        if name.scheme == "http" && !self.opts.insecure {
            bail!("insecure protocol http");
        }
        Ok(())
    }

    /// Issue one request with retry, backoff, and auth recovery.
    ///
    /// Statuses listed in `allow` are returned to the caller instead of
    /// being treated as errors.
    pub(crate) async fn request(
        &self,
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
        allow: &[StatusCode],
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        let mut refreshed = false;

        loop {
            let mut req = self
                .http
                .request(method.clone(), &url)
                .headers(headers.clone());

            if let Some(token) = self.token.lock().await.clone() {
                req = req.header(AUTHORIZATION, format!("Bearer {token}"));
            } else if let (Some(user), Some(pass)) = (&self.opts.username, &self.opts.password) {
                req = req.basic_auth(user, Some(pass));
            }
            if let Some(body) = body.clone() {
                req = req.body(body);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    attempt += 1;
                    if attempt >= retry::MAX_ATTEMPTS {
                        return Err(err).with_context(|| format!("{method} {url}"));
                    }
                    let delay = retry::backoff(attempt - 1);
                    debug!(%url, %err, ?delay, "network error, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() || allow.contains(&status) {
                return Ok(resp);
            }

            match status {
                StatusCode::UNAUTHORIZED if !refreshed => {
                    let challenge = resp
                        .headers()
                        .get("www-authenticate")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned)
                        .context("unauthorized with no auth challenge")?;
                    self.refresh_token(&challenge).await?;
                    refreshed = true;
                }
                StatusCode::UNAUTHORIZED => bail!("unauthorized: {method} {url}"),
                StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt >= retry::MAX_ATTEMPTS {
                        bail!("rate limited after {attempt} attempts: {url}");
                    }
                    let delay = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(retry::retry_after)
                        .unwrap_or_else(|| retry::backoff(attempt - 1));
                    tokio::time::sleep(delay).await;
                }
                status if status.is_server_error() => {
                    attempt += 1;
                    if attempt >= retry::MAX_ATTEMPTS {
                        bail!("{status} after {attempt} attempts: {url}");
                    }
                    tokio::time::sleep(retry::backoff(attempt - 1)).await;
                }
                status => {
                    let body = resp.text().await.unwrap_or_default();
                    bail!("{method} {url}: {status}: {body}");
                }
            }
        }
    }

    /// Recover from a `401` by fetching a token per the bearer challenge
    async fn refresh_token(&self, challenge: &str) -> Result<()> {
        let challenge = auth::Challenge::parse(challenge)?;
        let mut req = self.http.get(challenge.token_url());
        if let (Some(user), Some(pass)) = (&self.opts.username, &self.opts.password) {
            req = req.basic_auth(user, Some(pass));
        }

        let resp = req.send().await.context("token endpoint")?;
        if !resp.status().is_success() {
            bail!("token endpoint returned {}", resp.status());
        }
        let token = resp.json::<auth::TokenResponse>().await?.token()?;
        *self.token.lock().await = Some(token);
        Ok(())
    }
}

/// Layer-shaped view over a manifest's blobs, config last
trait ManifestBlobs {
    fn digests_with_sizes(&self) -> Vec<Layer>;
}

impl ManifestBlobs for Manifest {
    fn digests_with_sizes(&self) -> Vec<Layer> {
        let mut layers = self.layers.clone();
        layers.push(self.config.clone());
        layers
    }
}

/// Whether an error bottoms out in file-not-found
fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}
