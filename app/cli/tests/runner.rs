//! Tests driving the runner abstraction with a mock backend.

use anyhow::Result;
use futures_core::Stream;
use futures_util::StreamExt;
use tcore::Message;
use tusk_cli::runner::{ChatChunk, ChatRequest, CreateRequest, ModelEntry, Runner, ShowResponse};

/// A canned backend for exercising stream consumers.
struct MockRunner {
    chunks: Vec<&'static str>,
}

impl Runner for MockRunner {
    async fn list(&self) -> Result<Vec<ModelEntry>> {
        Ok(vec![ModelEntry {
            name: "tiny:latest".into(),
            size: 42,
        }])
    }

    async fn show(&self, model: &str) -> Result<ShowResponse> {
        Ok(ShowResponse {
            system: format!("system for {model}"),
            ..ShowResponse::default()
        })
    }

    async fn create(&self, req: &CreateRequest) -> Result<()> {
        anyhow::ensure!(!req.model.is_empty(), "model name required");
        Ok(())
    }

    async fn load(&self, _model: &str) -> Result<()> {
        Ok(())
    }

    fn chat(&self, _req: ChatRequest) -> impl Stream<Item = Result<ChatChunk>> + Send {
        let chunks: Vec<Result<ChatChunk>> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, content)| {
                Ok(ChatChunk {
                    message: Message::assistant(*content),
                    done: i == self.chunks.len() - 1,
                })
            })
            .collect();
        futures_util::stream::iter(chunks)
    }
}

#[tokio::test]
async fn chat_chunks_arrive_in_order_with_terminal_done() {
    let runner = MockRunner {
        chunks: vec!["Hel", "lo", "!"],
    };

    let stream = runner.chat(ChatRequest::default());
    futures_util::pin_mut!(stream);

    let mut content = String::new();
    let mut done_seen = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert!(!done_seen, "chunk after done");
        content.push_str(&chunk.message.content);
        done_seen = chunk.done;
    }

    assert_eq!(content, "Hello!");
    assert!(done_seen);
}

#[tokio::test]
async fn list_and_show_round_trip() {
    let runner = MockRunner { chunks: vec![] };
    let models = runner.list().await.unwrap();
    assert_eq!(models[0].name, "tiny:latest");

    let show = runner.show("tiny:latest").await.unwrap();
    assert_eq!(show.system, "system for tiny:latest");
}

#[test]
fn chat_request_serializes_compactly() {
    let req = ChatRequest {
        model: "tiny".into(),
        messages: vec![Message::user("hi")],
        ..ChatRequest::default()
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["model"], "tiny");
    assert_eq!(json["messages"][0]["role"], "user");
    // empty options and absent format stay off the wire
    assert!(json.get("options").is_none());
    assert!(json.get("format").is_none());
}

#[test]
fn chat_chunk_deserializes_stream_line() {
    let chunk: ChatChunk = serde_json::from_str(
        r#"{"message":{"role":"assistant","content":"hi"},"done":false}"#,
    )
    .unwrap();
    assert_eq!(chunk.message.content, "hi");
    assert!(!chunk.done);

    let done: ChatChunk =
        serde_json::from_str(r#"{"message":{"role":"assistant","content":""},"done":true}"#)
            .unwrap();
    assert!(done.done);
}
