//! Recursive-descent parser for action templates

use crate::ast::{Arg, Branch, Command, Node, Pipeline};
use anyhow::{bail, Result};

/// Parse template source into a node list
pub fn parse(source: &str) -> Result<Vec<Node>> {
    let mut parser = Parser {
        src: source,
        pos: 0,
        trim_pending: false,
    };
    let (nodes, term) = parser.parse_list(true)?;
    if let Some(term) = term {
        bail!("unexpected {{{{ {term} }}}} outside a branch");
    }
    Ok(nodes)
}

/// How a nested list was terminated
enum Terminator {
    End,
    Else,
    ElseIf,
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Terminator::End => "end",
            Terminator::Else => "else",
            Terminator::ElseIf => "else if",
        })
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    /// A previous `-}}` asked to trim leading whitespace from the next text
    trim_pending: bool,
}

impl<'a> Parser<'a> {
    /// Parse nodes until end of input or a branch terminator.
    ///
    /// `top` is true only at the root, where terminators are an error.
    fn parse_list(&mut self, top: bool) -> Result<(Vec<Node>, Option<Terminator>)> {
        let mut nodes = Vec::new();

        loop {
            let rest = &self.src[self.pos..];
            let Some(open) = rest.find("{{") else {
                self.push_text(rest, false, &mut nodes);
                self.pos = self.src.len();
                return Ok((nodes, None));
            };

            let trim_before = rest[open + 2..].starts_with('-')
                && rest[open + 3..].starts_with(|c: char| c.is_whitespace());
            self.push_text(&rest[..open], trim_before, &mut nodes);
            self.pos += open + 2;
            if trim_before {
                self.pos += 1;
            }

            match self.parse_action(top, &mut nodes)? {
                None => continue,
                term => return Ok((nodes, term)),
            }
        }
    }

    /// Emit a text node, honoring trim markers on both sides
    fn push_text(&mut self, text: &str, trim_end: bool, nodes: &mut Vec<Node>) {
        let mut text = text;
        if self.trim_pending {
            text = text.trim_start();
            self.trim_pending = false;
        }
        if trim_end {
            text = text.trim_end();
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_string()));
        }
    }

    /// Parse the inside of one `{{ ... }}` action.
    ///
    /// Returns a terminator when the action closes the enclosing branch;
    /// otherwise appends the parsed node and returns `None`.
    fn parse_action(&mut self, top: bool, nodes: &mut Vec<Node>) -> Result<Option<Terminator>> {
        self.skip_space();

        if self.eat_keyword("if") {
            nodes.push(self.parse_if()?);
            return Ok(None);
        }
        if self.eat_keyword("range") {
            nodes.push(self.parse_range()?);
            return Ok(None);
        }
        if self.eat_keyword("with") {
            let pipe = self.parse_pipeline()?;
            self.expect_close()?;
            let branch = self.parse_branch_bodies(Vec::new(), pipe)?;
            nodes.push(Node::With(branch));
            return Ok(None);
        }
        if self.eat_keyword("end") {
            self.expect_close()?;
            if top {
                bail!("unexpected {{{{ end }}}}");
            }
            return Ok(Some(Terminator::End));
        }
        if self.eat_keyword("else") {
            if top {
                bail!("unexpected {{{{ else }}}}");
            }
            self.skip_space();
            if self.eat_keyword("if") {
                return Ok(Some(Terminator::ElseIf));
            }
            self.expect_close()?;
            return Ok(Some(Terminator::Else));
        }

        let pipe = self.parse_pipeline()?;
        self.expect_close()?;
        nodes.push(Node::Action(pipe));
        Ok(None)
    }

    /// Parse an if branch; assumes `if` was consumed
    fn parse_if(&mut self) -> Result<Node> {
        let pipe = self.parse_pipeline()?;
        self.expect_close()?;
        Ok(Node::If(self.parse_branch_bodies(Vec::new(), pipe)?))
    }

    /// Parse a range branch with its optional variable declaration
    fn parse_range(&mut self) -> Result<Node> {
        let mut decl = Vec::new();
        let save = self.pos;
        loop {
            self.skip_space();
            if !self.peek_char('$') {
                break;
            }
            let name = self.lex_variable()?;
            decl.push(name);
            self.skip_space();
            if self.eat_str(",") {
                continue;
            }
            break;
        }
        self.skip_space();
        if !decl.is_empty() && !self.eat_str(":=") {
            // not a declaration after all; reparse as a plain pipeline
            decl.clear();
            self.pos = save;
        }

        let pipe = self.parse_pipeline()?;
        self.expect_close()?;
        Ok(Node::Range(self.parse_branch_bodies(decl, pipe)?))
    }

    /// Parse the body and else lists shared by if/range/with
    fn parse_branch_bodies(&mut self, decl: Vec<String>, pipe: Pipeline) -> Result<Branch> {
        let (then, term) = self.parse_list(false)?;
        let otherwise = match term {
            Some(Terminator::End) => Vec::new(),
            Some(Terminator::Else) => {
                let (otherwise, term) = self.parse_list(false)?;
                match term {
                    Some(Terminator::End) => otherwise,
                    _ => bail!("unterminated else branch"),
                }
            }
            Some(Terminator::ElseIf) => vec![self.parse_if()?],
            None => bail!("unterminated branch"),
        };
        Ok(Branch {
            decl,
            pipe,
            then,
            otherwise,
        })
    }

    /// Parse a `|`-chained pipeline up to the closing delimiter
    fn parse_pipeline(&mut self) -> Result<Pipeline> {
        let mut cmds = Vec::new();
        loop {
            cmds.push(self.parse_command()?);
            self.skip_space();
            if self.eat_str("|") {
                continue;
            }
            break;
        }
        if cmds.is_empty() {
            bail!("empty pipeline");
        }
        Ok(Pipeline { cmds })
    }

    /// Parse one command's argument list
    fn parse_command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        loop {
            self.skip_space();
            if self.at_close() || self.peek_char('|') || self.peek_char(')') {
                break;
            }
            args.push(self.parse_arg()?);
        }
        if args.is_empty() {
            bail!("empty command in pipeline");
        }
        Ok(Command { args })
    }

    /// Parse a single argument token
    fn parse_arg(&mut self) -> Result<Arg> {
        let rest = &self.src[self.pos..];
        let c = rest.chars().next().unwrap_or('\0');

        if c == '(' {
            self.pos += 1;
            let pipe = self.parse_pipeline()?;
            self.skip_space();
            if !self.eat_str(")") {
                bail!("missing closing parenthesis in pipeline");
            }
            return Ok(Arg::Pipe(Box::new(pipe)));
        }

        if c == '.' {
            self.pos += 1;
            return Ok(Arg::Field(self.lex_chain()));
        }

        if c == '$' {
            let name = self.lex_variable()?;
            let chain = if self.peek_char('.') {
                self.pos += 1;
                self.lex_chain()
            } else {
                Vec::new()
            };
            return Ok(Arg::Variable(name, chain));
        }

        if c == '"' {
            return Ok(Arg::Str(self.lex_string()?));
        }

        if c.is_ascii_digit() || (c == '-' && rest[1..].starts_with(|d: char| d.is_ascii_digit()))
        {
            return Ok(Arg::Number(self.lex_number()?));
        }

        if c.is_alphabetic() || c == '_' {
            let word = self.lex_word();
            return Ok(match word.as_str() {
                "true" => Arg::Bool(true),
                "false" => Arg::Bool(false),
                "nil" => Arg::Str(String::new()),
                _ => Arg::Ident(word),
            });
        }

        bail!("unexpected character {c:?} in action");
    }

    /// Lex a `.A.B` chain after the leading dot was consumed
    fn lex_chain(&mut self) -> Vec<String> {
        let mut chain = Vec::new();
        loop {
            let word = self.lex_word();
            if word.is_empty() {
                break;
            }
            chain.push(word);
            if self.peek_char('.') {
                self.pos += 1;
                continue;
            }
            break;
        }
        chain
    }

    /// Lex a `$name` variable reference
    fn lex_variable(&mut self) -> Result<String> {
        if !self.eat_str("$") {
            bail!("expected variable");
        }
        Ok(self.lex_word())
    }

    fn lex_word(&mut self) -> String {
        let rest = &self.src[self.pos..];
        let end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        self.pos += end;
        rest[..end].to_string()
    }

    fn lex_string(&mut self) -> Result<String> {
        let rest = &self.src[self.pos..];
        let mut out = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, c)) => out.push(c),
                    None => break,
                },
                c => out.push(c),
            }
        }
        bail!("unterminated string literal");
    }

    fn lex_number(&mut self) -> Result<f64> {
        let rest = &self.src[self.pos..];
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e' || c == 'E' {
                // a `-}}` close marker is not part of a number
                if c == '-' && rest[i..].starts_with("-}}") {
                    break;
                }
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        let text = &rest[..end];
        let n: f64 = text
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid number literal {text:?}"))?;
        self.pos += end;
        Ok(n)
    }

    /// Consume the `}}` or `-}}` close delimiter
    fn expect_close(&mut self) -> Result<()> {
        self.skip_space();
        if self.eat_str("-}}") {
            self.trim_pending = true;
            return Ok(());
        }
        if self.eat_str("}}") {
            return Ok(());
        }
        bail!("expected }}}} to close action");
    }

    fn at_close(&self) -> bool {
        let rest = &self.src[self.pos..];
        rest.starts_with("}}") || rest.starts_with("-}}")
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let rest = &self.src[self.pos..];
        if rest.starts_with(word) {
            let after = &rest[word.len()..];
            if after.is_empty()
                || after.starts_with(|c: char| c.is_whitespace())
                || after.starts_with("}}")
                || after.starts_with("-}}")
            {
                self.pos += word.len();
                return true;
            }
        }
        false
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.src[self.pos..].starts_with(s) {
            self.pos += s.len();
            return true;
        }
        false
    }

    fn peek_char(&self, c: char) -> bool {
        self.src[self.pos..].starts_with(c)
    }

    fn skip_space(&mut self) {
        let rest = &self.src[self.pos..];
        let n = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        self.pos += n;
    }
}
