//! Prompt template engine for model chat formats
//!
//! Templates are parsed once into an immutable tree shared behind an `Arc`.
//! Rendering never mutates the tree; the legacy path derives a trimmed copy
//! instead.

use anyhow::Result;
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;

pub use crate::{
    ast::{Arg, Branch, Command, Node, Pipeline},
    collate::collate,
    registry::{named, Named},
};

pub mod ast;
mod collate;
mod parse;
mod registry;
mod render;

use render::{exec_list, Scope};
use tcore::{Message, Role, Tool};

/// The data record a template renders against
#[derive(Debug, Clone, Default)]
pub struct Values {
    /// The system message
    pub system: String,

    /// The user prompt, used by FIM and legacy rendering
    pub prompt: String,

    /// The suffix for fill-in-the-middle completion
    pub suffix: String,

    /// The assistant response, filled during legacy rendering
    pub response: String,

    /// The conversation history
    pub messages: Vec<Message>,

    /// Tool definitions offered to the model
    pub tools: Vec<Tool>,

    /// Force the turn-walking legacy path even for message-aware templates
    pub force_legacy: bool,
}

/// A parsed prompt template
#[derive(Debug, Clone)]
pub struct Template {
    raw: String,
    root: Arc<Vec<Node>>,
    vars: Vec<String>,
}

impl Template {
    /// Parse template source.
    ///
    /// Line endings are normalized to `\n`. A template that references
    /// neither `messages` nor `response` gets an implicit trailing
    /// `{{ .Response }}` so completion output always has somewhere to land.
    pub fn parse(source: &str) -> Result<Self> {
        let raw = source.replace("\r\n", "\n");
        let mut root = parse::parse(&raw)?;

        let vars = vars_of(&root);
        if !vars.iter().any(|v| v == "messages" || v == "response") {
            root.push(Node::Action(Pipeline::field(&["Response"])));
        }

        let vars = vars_of(&root);
        Ok(Self {
            raw,
            root: Arc::new(root),
            vars,
        })
    }

    /// The default template used when a model package carries none
    pub fn default_template() -> Self {
        Self::parse("{{ .Prompt }}").expect("default template parses")
    }

    /// The raw source string
    pub fn source(&self) -> &str {
        &self.raw
    }

    /// The sorted, lowercased set of identifiers the template references
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Render the template with the given values.
    ///
    /// Mode selection, in order: fill-in-the-middle when both prompt and
    /// suffix are set; a single structured pass when the template is
    /// message-aware; otherwise the legacy turn walk.
    pub fn execute(&self, out: &mut impl Write, values: &Values) -> Result<()> {
        let (system, collated) = collate(&values.messages);

        if !values.prompt.is_empty() && !values.suffix.is_empty() {
            let scope = json!({
                "Prompt": values.prompt,
                "Suffix": values.suffix,
                "Response": "",
            });
            return exec_list(&self.root, &mut Scope::new(scope), out);
        }

        if !values.force_legacy && self.vars.iter().any(|v| v == "messages") {
            let scope = json!({
                "System": system,
                "Messages": collated.iter().map(message_value).collect::<Vec<_>>(),
                "Tools": values.tools.iter().map(tool_value).collect::<Vec<_>>(),
                "Response": "",
            });
            return exec_list(&self.root, &mut Scope::new(scope), out);
        }

        // With no history to replay, render the provided values in one full
        // pass; the response slot keeps whatever the caller put there.
        if collated.is_empty() {
            return self.render_turn(
                &self.root,
                &values.system,
                &values.prompt,
                &values.response,
                out,
            );
        }

        // Legacy: replay the conversation as (system, prompt, response)
        // triples, rendering a full pass whenever the next turn would
        // overwrite a filled slot.
        let mut system = String::new();
        let mut prompt = String::new();
        let mut response = String::new();

        for msg in &collated {
            match msg.role {
                Role::System => {
                    if !prompt.is_empty() || !response.is_empty() {
                        self.render_turn(&self.root, &system, &prompt, &response, out)?;
                        system.clear();
                        prompt.clear();
                        response.clear();
                    }
                    system = msg.content.clone();
                }
                Role::User => {
                    if !response.is_empty() {
                        self.render_turn(&self.root, &system, &prompt, &response, out)?;
                        system.clear();
                        prompt.clear();
                        response.clear();
                    }
                    prompt = msg.content.clone();
                }
                Role::Assistant => {
                    response = msg.content.clone();
                }
                Role::Tool => {}
            }
        }

        // The final pass renders the pending prompt without a trailing
        // response slot.
        let trimmed = without_response(&self.root);
        self.render_turn(&trimmed, &system, &prompt, &response, out)
    }

    fn render_turn(
        &self,
        nodes: &[Node],
        system: &str,
        prompt: &str,
        response: &str,
        out: &mut impl Write,
    ) -> Result<()> {
        let scope = json!({
            "System": system,
            "Prompt": prompt,
            "Response": response,
        });
        exec_list(nodes, &mut Scope::new(scope), out)
    }

    /// Render against a caller-built scope value, bypassing mode selection.
    ///
    /// Extracted subtrees (tool prompts and the like) render through this
    /// with exactly the keys they need.
    pub fn execute_raw(&self, out: &mut impl Write, scope: Value) -> Result<()> {
        exec_list(&self.root, &mut Scope::new(scope), out)
    }

    /// Return a fresh template rooted at the first node matching the
    /// predicate, searching depth-first through branch bodies
    pub fn subtree(&self, pred: impl Fn(&Node) -> bool) -> Option<Template> {
        fn walk<'a>(nodes: &'a [Node], pred: &dyn Fn(&Node) -> bool) -> Option<&'a Node> {
            for node in nodes {
                if pred(node) {
                    return Some(node);
                }
                if let Node::If(b) | Node::Range(b) | Node::With(b) = node {
                    if let Some(hit) = walk(&b.then, pred).or_else(|| walk(&b.otherwise, pred)) {
                        return Some(hit);
                    }
                }
            }
            None
        }

        walk(&self.root, &pred).map(|node| {
            let root = vec![node.clone()];
            let vars = vars_of(&root);
            Template {
                raw: String::new(),
                root: Arc::new(root),
                vars,
            }
        })
    }
}

/// The sorted, lowercased identifier set of a node list
fn vars_of(nodes: &[Node]) -> Vec<String> {
    let mut idents = Vec::new();
    for node in nodes {
        ast::identifiers(node, &mut idents);
    }
    let mut vars: Vec<String> = idents.into_iter().map(|v| v.to_lowercase()).collect();
    vars.sort();
    vars.dedup();
    vars
}

/// Derive a tree with the response action removed.
///
/// The first action whose pipeline references `Response` is dropped, and a
/// cut flag drops every following sibling so the render stops where the
/// response would have started.
fn without_response(nodes: &[Node]) -> Vec<Node> {
    let mut cut = false;
    prune(nodes, &mut cut)
}

fn prune(nodes: &[Node], cut: &mut bool) -> Vec<Node> {
    let mut out = Vec::new();
    for node in nodes {
        if *cut {
            break;
        }
        match node {
            Node::Action(pipe) if pipe_mentions_response(pipe) => {
                *cut = true;
            }
            Node::If(b) => out.push(Node::If(prune_branch(b, cut))),
            Node::Range(b) => out.push(Node::Range(prune_branch(b, cut))),
            Node::With(b) => out.push(Node::With(prune_branch(b, cut))),
            other => out.push(other.clone()),
        }
    }
    out
}

fn prune_branch(b: &Branch, cut: &mut bool) -> Branch {
    let then = prune(&b.then, cut);
    let otherwise = prune(&b.otherwise, cut);
    Branch {
        decl: b.decl.clone(),
        pipe: b.pipe.clone(),
        then,
        otherwise,
    }
}

fn pipe_mentions_response(pipe: &Pipeline) -> bool {
    let mut idents = Vec::new();
    for cmd in &pipe.cmds {
        for arg in &cmd.args {
            match arg {
                Arg::Field(chain) => idents.extend(chain.iter()),
                Arg::Variable(_, chain) => idents.extend(chain.iter()),
                Arg::Pipe(inner) => {
                    if pipe_mentions_response(inner) {
                        return true;
                    }
                }
                _ => {}
            }
        }
    }
    idents.iter().any(|i| *i == "Response")
}

/// The render-scope shape of one message
fn message_value(msg: &Message) -> Value {
    json!({
        "Role": msg.role.as_str(),
        "Content": msg.content,
        "Images": msg.images,
        "ToolCalls": msg
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "Function": {
                        "Name": tc.function.name,
                        "Arguments": tc.function.arguments,
                    }
                })
            })
            .collect::<Vec<_>>(),
    })
}

/// The render-scope shape of one tool definition
fn tool_value(tool: &Tool) -> Value {
    json!({
        "Type": tool.kind,
        "Function": tool.function,
    })
}
