//! Parse tree for action templates

/// One node of the template parse tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text between actions
    Text(String),
    /// An output action, `{{ pipeline }}`
    Action(Pipeline),
    /// A conditional with optional else branch
    If(Branch),
    /// Iteration over a pipeline value
    Range(Branch),
    /// Scoped rebinding of the dot
    With(Branch),
}

/// The shared shape of `if`/`range`/`with` nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Variables declared by a range, e.g. `$i, $m :=`
    pub decl: Vec<String>,

    /// The controlling pipeline
    pub pipe: Pipeline,

    /// The body list
    pub then: Vec<Node>,

    /// The else list, empty when absent
    pub otherwise: Vec<Node>,
}

/// A `|`-chained sequence of commands
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// The commands, evaluated left to right
    pub cmds: Vec<Command>,
}

impl Pipeline {
    /// A pipeline holding a single bare field reference
    pub fn field(chain: &[&str]) -> Self {
        Self {
            cmds: vec![Command {
                args: vec![Arg::Field(chain.iter().map(|s| s.to_string()).collect())],
            }],
        }
    }
}

/// One command within a pipeline; the first argument may name a helper
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// The arguments, first being the callee or the value itself
    pub args: Vec<Arg>,
}

/// A single command argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A field chain rooted at the dot, `.A.B`; empty for the bare dot
    Field(Vec<String>),
    /// A variable with an optional field chain, `$x.A.B`
    Variable(String, Vec<String>),
    /// A string literal
    Str(String),
    /// A numeric literal
    Number(f64),
    /// A boolean literal
    Bool(bool),
    /// A helper name such as `json` or `eq`
    Ident(String),
    /// A parenthesized sub-pipeline
    Pipe(Box<Pipeline>),
}

/// Collect every field and variable identifier referenced under a node.
///
/// Each segment of a chain counts separately, so `.Messages` and
/// `$m.Content` contribute `Messages` and `Content`.
pub fn identifiers(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::Text(_) => {}
        Node::Action(pipe) => pipeline_identifiers(pipe, out),
        Node::If(b) | Node::Range(b) | Node::With(b) => {
            pipeline_identifiers(&b.pipe, out);
            for n in b.then.iter().chain(&b.otherwise) {
                identifiers(n, out);
            }
        }
    }
}

fn pipeline_identifiers(pipe: &Pipeline, out: &mut Vec<String>) {
    for cmd in &pipe.cmds {
        for arg in &cmd.args {
            match arg {
                Arg::Field(chain) => out.extend(chain.iter().cloned()),
                Arg::Variable(_, chain) => out.extend(chain.iter().cloned()),
                Arg::Pipe(inner) => pipeline_identifiers(inner, out),
                _ => {}
            }
        }
    }
}

/// Whether any pipeline under the node references the given field segment
pub fn references(node: &Node, segment: &str) -> bool {
    let mut idents = Vec::new();
    identifiers(node, &mut idents);
    idents.iter().any(|i| i == segment)
}
