//! `tusk run` chats with a model.

use crate::repl::Repl;
use crate::runner::{ChatRequest, HttpRunner, Runner};
use anyhow::Result;
use clap::Args;
use futures_util::StreamExt;
use std::io::Write as _;
use tcore::Message;

/// Chat with a model, interactively or one-shot.
#[derive(Args, Debug)]
pub struct Run {
    /// The model to run.
    pub model: String,

    /// One-shot prompt; omit for an interactive session.
    pub prompt: Option<String>,
}

impl Run {
    pub async fn run(self) -> Result<()> {
        let runner = HttpRunner::from_env();

        match self.prompt {
            Some(prompt) => one_shot(&runner, &self.model, &prompt).await,
            None => {
                let mut repl = Repl::new(runner, self.model)?;
                repl.run().await
            }
        }
    }
}

/// Stream a single completion to stdout
async fn one_shot(runner: &impl Runner, model: &str, prompt: &str) -> Result<()> {
    let req = ChatRequest {
        model: model.to_string(),
        messages: vec![Message::user(prompt)],
        ..ChatRequest::default()
    };

    let stream = runner.chat(req);
    futures_util::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        print!("{}", chunk.message.content);
        std::io::stdout().flush()?;
        if chunk.done {
            break;
        }
    }
    println!();
    Ok(())
}
