//! Runner speaking newline-delimited JSON to the local server

use super::{ChatChunk, ChatRequest, CreateRequest, ModelEntry, Runner, ShowResponse};
use anyhow::{bail, Context, Result};
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::trace;

/// A runner bound to one server base URL
#[derive(Debug, Clone)]
pub struct HttpRunner {
    client: reqwest::Client,
    base: String,
}

impl HttpRunner {
    /// Connect to an explicit base URL
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Connect to the environment-configured server
    pub fn from_env() -> Self {
        Self::new(tcore::env::server_url())
    }

    async fn post_json<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{url}: {status}: {body}");
        }
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

impl Runner for HttpRunner {
    async fn list(&self) -> Result<Vec<ModelEntry>> {
        let url = format!("{}/api/tags", self.base);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Ok(resp.json::<ListResponse>().await?.models)
    }

    async fn show(&self, model: &str) -> Result<ShowResponse> {
        let resp = self
            .post_json("/api/show", &serde_json::json!({ "model": model }))
            .await?;
        Ok(resp.json().await?)
    }

    async fn create(&self, req: &CreateRequest) -> Result<()> {
        self.post_json("/api/create", req).await?;
        Ok(())
    }

    async fn load(&self, model: &str) -> Result<()> {
        // an empty chat request loads the model and returns immediately
        self.post_json(
            "/api/chat",
            &serde_json::json!({ "model": model, "messages": [] }),
        )
        .await?;
        Ok(())
    }

    fn chat(&self, req: ChatRequest) -> impl Stream<Item = Result<ChatChunk>> + Send {
        let client = self.client.clone();
        let url = format!("{}/api/chat", self.base);

        try_stream! {
            let resp = client
                .post(&url)
                .json(&req)
                .send()
                .await
                .with_context(|| format!("POST {url}"))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                Err(anyhow::anyhow!("{url}: {status}: {body}"))?;
                return;
            }

            // chunks arrive as one JSON object per line; a partial line is
            // carried until its newline lands
            let mut buffer = String::new();
            let mut stream = resp.bytes_stream();
            while let Some(part) = stream.next().await {
                let part = part?;
                buffer.push_str(&String::from_utf8_lossy(&part));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    trace!(line, "chat chunk");
                    let chunk: ChatChunk = serde_json::from_str(line)
                        .with_context(|| format!("bad chat chunk: {line}"))?;
                    let done = chunk.done;
                    yield chunk;
                    if done {
                        return;
                    }
                }
            }
        }
    }
}
