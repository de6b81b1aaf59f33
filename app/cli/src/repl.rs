//! Interactive chat REPL
//!
//! A line-oriented state machine: commands start with `/`, `"""` opens a
//! multi-line block, and completed plain input becomes a user message sent
//! through the session's runner as a streaming chat.

use crate::runner::{ChatRequest, CreateRequest, Runner};
use anyhow::Result;
use futures_util::StreamExt;
use regex::Regex;
use rustyline::error::ReadlineError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;
use tcore::{format_params, Message, Role};

/// Which multi-line capture is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiline {
    /// No block open
    None,
    /// Capturing a prompt
    Prompt,
    /// Capturing a system message via `/set system """`
    System,
}

/// A `/show` subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTopic {
    Info,
    License,
    Modelfile,
    Parameters,
    System,
    Template,
}

/// What the loop should do after a line was handled
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Keep reading
    Continue,
    /// Print text and keep reading
    Output(String),
    /// Send the buffered input as a user message
    Submit,
    /// List installed models
    List,
    /// Switch to another model, clearing the conversation
    Load(String),
    /// Save the session as a new model
    Save(String),
    /// Display model information
    Show(ShowTopic),
    /// Enable or disable line history
    SetHistory(bool),
    /// Leave the REPL
    Exit,
}

/// The mutable session state behind the prompt
#[derive(Debug)]
pub struct Session {
    /// The active model
    pub model: String,

    /// Conversation history, assistant replies included
    pub messages: Vec<Message>,

    /// The session system message
    pub system: String,

    /// Session parameter overrides
    pub options: BTreeMap<String, Value>,

    /// Output format constraint
    pub format: Option<String>,

    /// Word-wrap terminal output
    pub wordwrap: bool,

    /// Print generation stats after each reply
    pub verbose: bool,

    /// Whether image paths are accepted as input
    pub multimodal: bool,

    buffer: String,
    multiline: Multiline,
}

impl Session {
    /// A fresh session for the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: String::new(),
            options: BTreeMap::new(),
            format: None,
            wordwrap: true,
            verbose: false,
            multimodal: false,
            buffer: String::new(),
            multiline: Multiline::None,
        }
    }

    /// Whether a multi-line block is open
    pub fn multiline(&self) -> Multiline {
        self.multiline
    }

    /// The pending input buffer
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Abandon any open block and pending input
    pub fn reset_input(&mut self) {
        self.buffer.clear();
        self.multiline = Multiline::None;
    }

    /// Feed one input line through the state machine
    pub fn handle_line(&mut self, line: &str) -> Step {
        if self.multiline != Multiline::None {
            return self.continue_multiline(line);
        }

        if let Some(rest) = line.strip_prefix("\"\"\"") {
            match rest.strip_suffix("\"\"\"").filter(|_| !rest.is_empty()) {
                Some(inner) => {
                    self.buffer.push_str(inner);
                }
                None => {
                    self.buffer.push_str(rest);
                    if !rest.is_empty() {
                        self.buffer.push('\n');
                    }
                    self.multiline = Multiline::Prompt;
                    return Step::Continue;
                }
            }
            return self.maybe_submit();
        }

        if line.starts_with('/') {
            return self.handle_command(line);
        }

        self.buffer.push_str(line);
        self.maybe_submit()
    }

    fn continue_multiline(&mut self, line: &str) -> Step {
        match line.strip_suffix("\"\"\"") {
            None => {
                self.buffer.push_str(line);
                self.buffer.push('\n');
                Step::Continue
            }
            Some(before) => {
                self.buffer.push_str(before);
                let closed = self.multiline;
                self.multiline = Multiline::None;

                match closed {
                    Multiline::System => {
                        self.set_system_message();
                        Step::Output("Set system message.".into())
                    }
                    _ => self.maybe_submit(),
                }
            }
        }
    }

    fn handle_command(&mut self, line: &str) -> Step {
        let args: Vec<&str> = line.split_whitespace().collect();
        match args[0] {
            "/list" => Step::List,
            "/load" => match args.get(1) {
                Some(name) => Step::Load(name.to_string()),
                None => Step::Output("Usage:\n  /load <modelname>".into()),
            },
            "/save" => match args.get(1) {
                Some(name) => Step::Save(name.to_string()),
                None => Step::Output("Usage:\n  /save <modelname>".into()),
            },
            "/clear" => {
                self.messages.clear();
                if !self.system.is_empty() {
                    let system = self.system.clone();
                    self.messages.push(Message::system(system));
                }
                Step::Output("Cleared session context".into())
            }
            "/set" => self.handle_set(&args),
            "/show" => match args.get(1) {
                Some(&"info") => Step::Show(ShowTopic::Info),
                Some(&"license") => Step::Show(ShowTopic::License),
                Some(&"modelfile") => Step::Show(ShowTopic::Modelfile),
                Some(&"parameters") => Step::Show(ShowTopic::Parameters),
                Some(&"system") => Step::Show(ShowTopic::System),
                Some(&"template") => Step::Show(ShowTopic::Template),
                Some(other) => {
                    Step::Output(format!("Unknown command '/show {other}'. Type /? for help"))
                }
                None => Step::Output(usage_show()),
            },
            "/help" | "/?" => match args.get(1) {
                Some(&"set") | Some(&"/set") => Step::Output(usage_set()),
                Some(&"show") | Some(&"/show") => Step::Output(usage_show()),
                Some(&"shortcut") | Some(&"shortcuts") => Step::Output(usage_shortcuts()),
                _ => Step::Output(usage(self.multimodal)),
            },
            "/bye" | "/exit" => Step::Exit,
            cmd => {
                // a leading image path is input, not a command
                if self.multimodal
                    && extract_file_names(line).iter().any(|f| f.starts_with(cmd))
                {
                    self.buffer.push_str(line);
                    return self.maybe_submit();
                }
                Step::Output(format!("Unknown command '{cmd}'. Type /? for help"))
            }
        }
    }

    fn handle_set(&mut self, args: &[&str]) -> Step {
        let Some(sub) = args.get(1) else {
            return Step::Output(usage_set());
        };

        match *sub {
            "history" => Step::SetHistory(true),
            "nohistory" => Step::SetHistory(false),
            "wordwrap" => {
                self.wordwrap = true;
                Step::Output("Set 'wordwrap' mode.".into())
            }
            "nowordwrap" => {
                self.wordwrap = false;
                Step::Output("Set 'nowordwrap' mode.".into())
            }
            "verbose" => {
                self.verbose = true;
                Step::Output("Set 'verbose' mode.".into())
            }
            "quiet" => {
                self.verbose = false;
                Step::Output("Set 'quiet' mode.".into())
            }
            "format" => match args.get(2) {
                Some(&"json") => {
                    self.format = Some("json".into());
                    Step::Output("Set format to 'json' mode.".into())
                }
                _ => Step::Output(
                    "Invalid or missing format. For 'json' mode use '/set format json'".into(),
                ),
            },
            "noformat" => {
                self.format = None;
                Step::Output("Disabled format.".into())
            }
            "parameter" => {
                if args.len() < 4 {
                    return Step::Output(usage_parameters());
                }
                let key = args[2].to_string();
                let values: Vec<String> = args[3..].iter().map(|s| s.to_string()).collect();

                let mut request = BTreeMap::new();
                request.insert(key.clone(), values.clone());
                match format_params(&request) {
                    Ok(formatted) => {
                        self.options.extend(formatted);
                        Step::Output(format!(
                            "Set parameter '{key}' to '{}'",
                            values.join(", ")
                        ))
                    }
                    Err(err) => Step::Output(format!("Couldn't set parameter: {err:?}")),
                }
            }
            "system" => {
                if args.len() < 3 {
                    return Step::Output(usage_set());
                }
                let rest = args[2..].join(" ");
                match rest.strip_prefix("\"\"\"") {
                    None => {
                        self.buffer.push_str(&rest);
                        self.set_system_message();
                        Step::Output("Set system message.".into())
                    }
                    Some(open) => match open.strip_suffix("\"\"\"") {
                        Some(inner) => {
                            self.buffer.push_str(inner);
                            self.set_system_message();
                            Step::Output("Set system message.".into())
                        }
                        None => {
                            self.buffer.push_str(open);
                            if !open.is_empty() {
                                self.buffer.push('\n');
                            }
                            self.multiline = Multiline::System;
                            Step::Continue
                        }
                    },
                }
            }
            other => Step::Output(format!("Unknown command '/set {other}'. Type /? for help")),
        }
    }

    /// Store the buffered system message, replacing a trailing system entry
    fn set_system_message(&mut self) {
        self.system = std::mem::take(&mut self.buffer);
        let message = Message::system(self.system.clone());
        match self.messages.last_mut() {
            Some(last) if last.role == Role::System => *last = message,
            _ => self.messages.push(message),
        }
    }

    fn maybe_submit(&mut self) -> Step {
        if self.buffer.is_empty() || self.multiline != Multiline::None {
            return Step::Continue;
        }
        Step::Submit
    }

    /// Turn the buffer into the next user message, reading any image paths
    pub fn take_user_message(&mut self) -> Result<Message> {
        let content = std::mem::take(&mut self.buffer);
        let mut message = Message::user(content);

        if self.multimodal {
            let (stripped, images) = extract_file_data(&message.content)?;
            message.content = stripped;
            message.images = images;
        }
        Ok(message)
    }
}

/// File paths with image extensions mentioned in the input
pub fn extract_file_names(input: &str) -> Vec<String> {
    let pattern = Regex::new(r#"(?i)[\w./\\~-]+\.(?:jpg|jpeg|png)\b"#)
        .expect("image path pattern compiles");
    pattern
        .find_iter(input)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strip image paths out of the input and load their contents
fn extract_file_data(input: &str) -> Result<(String, Vec<String>)> {
    use base64::Engine as _;

    let mut content = input.to_string();
    let mut images = Vec::new();

    for name in extract_file_names(input) {
        let path = PathBuf::from(&name);
        match std::fs::read(&path) {
            Ok(bytes) => {
                content = content.replace(&name, "");
                images.push(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
            Err(_) => continue,
        }
    }
    Ok((content.trim().to_string(), images))
}

fn usage(multimodal: bool) -> String {
    let mut out = String::from(
        "Available Commands:\n  /set            Set session variables\n  /show           Show model information\n  /load <model>   Load a session or model\n  /save <model>   Save your current session\n  /clear          Clear session context\n  /bye            Exit\n  /?, /help       Help for a command\n  /? shortcuts    Help for keyboard shortcuts\n\nUse \"\"\" to begin a multi-line message.",
    );
    if multimodal {
        out.push_str("\nUse /path/to/file to include .jpg or .png images.");
    }
    out
}

fn usage_set() -> String {
    "Available Commands:\n  /set parameter ...     Set a parameter\n  /set system <string>   Set system message\n  /set history           Enable history\n  /set nohistory         Disable history\n  /set wordwrap          Enable wordwrap\n  /set nowordwrap        Disable wordwrap\n  /set format json       Enable JSON mode\n  /set noformat          Disable formatting\n  /set verbose           Show LLM stats\n  /set quiet             Disable LLM stats".into()
}

fn usage_show() -> String {
    "Available Commands:\n  /show info         Show details for this model\n  /show license      Show model license\n  /show modelfile    Show Modelfile for this model\n  /show parameters   Show parameters for this model\n  /show system       Show system message\n  /show template     Show prompt template".into()
}

fn usage_shortcuts() -> String {
    "Available keyboard shortcuts:\n  Ctrl + a            Move to the beginning of the line (Home)\n  Ctrl + e            Move to the end of the line (End)\n  Ctrl + k            Delete the sentence after the cursor\n  Ctrl + u            Delete the sentence before the cursor\n  Ctrl + w            Delete the word before the cursor\n\n  Ctrl + l            Clear the screen\n  Ctrl + c            Stop the model from responding\n  Ctrl + d            Exit (/bye)".into()
}

fn usage_parameters() -> String {
    "Available Parameters:\n  /set parameter seed <int>             Random number seed\n  /set parameter num_predict <int>      Max number of tokens to predict\n  /set parameter top_k <int>            Pick from top k num of tokens\n  /set parameter top_p <float>          Pick token based on sum of probabilities\n  /set parameter min_p <float>          Pick token based on top token probability * min_p\n  /set parameter num_ctx <int>          Set the context size\n  /set parameter temperature <float>    Set creativity level\n  /set parameter repeat_penalty <float> How strongly to penalize repetitions\n  /set parameter repeat_last_n <int>    Set how far back to look for repetitions\n  /set parameter num_gpu <int>          The number of layers to send to the GPU\n  /set parameter stop <string> <string> ...   Set the stop parameters".into()
}

/// The interactive loop wrapping a session around a runner
pub struct Repl<R: Runner> {
    runner: R,
    session: Session,
    editor: rustyline::DefaultEditor,
    history_path: Option<PathBuf>,
    history_enabled: bool,
}

impl<R: Runner> Repl<R> {
    /// Build a REPL for the given model
    pub fn new(runner: R, model: impl Into<String>) -> Result<Self> {
        let editor = rustyline::DefaultEditor::new()?;
        let history_path =
            (!tcore::env::no_history()).then(history_file_path).flatten();
        let history_enabled = history_path.is_some();
        Ok(Self {
            runner,
            session: Session::new(model),
            editor,
            history_path,
            history_enabled,
        })
    }

    /// The session, exposed for command front-ends
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Run until `/bye`, end of input, or a fatal error
    pub async fn run(&mut self) -> Result<()> {
        if let Some(path) = &self.history_path {
            let _ = self.editor.load_history(path);
        }

        loop {
            let prompt = match self.session.multiline() {
                Multiline::None => ">>> ",
                _ => "... ",
            };

            let line = match self.editor.readline(prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    if self.session.buffer().is_empty() {
                        println!("\nUse Ctrl + d or /bye to exit.");
                    }
                    self.session.reset_input();
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            };

            if self.history_enabled
                && self.session.multiline() == Multiline::None
                && !line.trim().is_empty()
            {
                let _ = self.editor.add_history_entry(&line);
            }

            match self.session.handle_line(&line) {
                Step::Continue => {}
                Step::Output(text) => println!("{text}"),
                Step::Exit => break,
                Step::SetHistory(enabled) => self.history_enabled = enabled,
                Step::List => self.list().await?,
                Step::Load(model) => self.load(model).await?,
                Step::Save(model) => self.save(model).await?,
                Step::Show(topic) => self.show(topic).await?,
                Step::Submit => self.submit().await?,
            }
        }

        self.save_history();
        Ok(())
    }

    async fn list(&self) -> Result<()> {
        for entry in self.runner.list().await? {
            println!("{}", entry.name);
        }
        Ok(())
    }

    async fn load(&mut self, model: String) -> Result<()> {
        println!("Loading model '{model}'");
        if let Err(err) = self.runner.load(&model).await {
            println!("error: {err:#}");
            return Ok(());
        }
        self.session.model = model;
        self.session.messages.clear();
        Ok(())
    }

    async fn save(&mut self, model: String) -> Result<()> {
        let req = CreateRequest {
            model: model.clone(),
            from: Some(self.session.model.clone()),
            system: self.session.system.clone(),
            parameters: self.session.options.clone(),
            messages: self.session.messages.clone(),
        };
        match self.runner.create(&req).await {
            Ok(()) => println!("Created new model '{model}'"),
            Err(err) => println!("error: {err:#}"),
        }
        Ok(())
    }

    async fn show(&mut self, topic: ShowTopic) -> Result<()> {
        let resp = match self.runner.show(&self.session.model).await {
            Ok(resp) => resp,
            Err(err) => {
                println!("error: couldn't get model: {err:#}");
                return Ok(());
            }
        };

        match topic {
            ShowTopic::Info => {
                for (key, value) in &resp.details {
                    println!("{key:<24} {value}");
                }
            }
            ShowTopic::License => {
                if resp.license.is_empty() {
                    println!("No license was specified for this model.");
                } else {
                    println!("{}", resp.license);
                }
            }
            ShowTopic::Modelfile => println!("{}", resp.modelfile),
            ShowTopic::Parameters => {
                println!("{}", render_parameters(&self.session.options, &resp.parameters));
            }
            ShowTopic::System => {
                if !self.session.system.is_empty() {
                    println!("{}\n", self.session.system);
                } else if !resp.system.is_empty() {
                    println!("{}\n", resp.system);
                } else {
                    println!("No system message was specified for this model.");
                }
            }
            ShowTopic::Template => {
                if resp.template.is_empty() {
                    println!("No prompt template was specified for this model.");
                } else {
                    println!("{}", resp.template);
                }
            }
        }
        Ok(())
    }

    async fn submit(&mut self) -> Result<()> {
        let message = self.session.take_user_message()?;
        self.session.messages.push(message);

        let req = ChatRequest {
            model: self.session.model.clone(),
            messages: self.session.messages.clone(),
            options: self.session.options.clone(),
            format: self.session.format.clone(),
        };

        let mut content = String::new();
        {
            let stream = self.runner.chat(req);
            futures_util::pin_mut!(stream);
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        print!("{}", chunk.message.content);
                        std::io::stdout().flush()?;
                        content.push_str(&chunk.message.content);
                        if chunk.done {
                            break;
                        }
                    }
                    Err(err) => {
                        println!("error: {err:#}");
                        break;
                    }
                }
            }
        }
        println!();

        if !content.is_empty() {
            self.session.messages.push(Message::assistant(content));
        }
        Ok(())
    }

    fn save_history(&mut self) {
        if let Some(path) = &self.history_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = self.editor.save_history(path);
        }
    }
}

/// The model-parameter display shared by `/show parameters`
pub fn render_parameters(user: &BTreeMap<String, Value>, model_defined: &str) -> String {
    let mut out = String::new();
    if !user.is_empty() {
        out.push_str("User defined parameters:\n");
        for (key, value) in user {
            out.push_str(&format!("{key:<30} {}\n", display_value(value)));
        }
    }
    if model_defined.is_empty() {
        if user.is_empty() {
            out.push_str("No parameters were specified for this model.");
        }
    } else {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("Model defined parameters:\n");
        out.push_str(model_defined);
    }
    out
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// History lives under the platform data dir
fn history_file_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("tusk").join("history"))
}
