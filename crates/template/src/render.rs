//! Template evaluation over JSON-shaped scopes

use crate::ast::{Arg, Node, Pipeline};
use anyhow::{bail, Result};
use serde_json::Value;
use std::fmt::Write;

/// The evaluation scope: the current dot plus declared variables
pub struct Scope {
    dot: Value,
    root: Value,
    vars: Vec<(String, Value)>,
}

impl Scope {
    /// Start a scope whose dot and `$` both bind the given value
    pub fn new(dot: Value) -> Self {
        Self {
            root: dot.clone(),
            dot,
            vars: Vec::new(),
        }
    }
}

/// Render a node list into the writer
pub fn exec_list(nodes: &[Node], scope: &mut Scope, out: &mut impl Write) -> Result<()> {
    for node in nodes {
        exec_node(node, scope, out)?;
    }
    Ok(())
}

fn exec_node(node: &Node, scope: &mut Scope, out: &mut impl Write) -> Result<()> {
    match node {
        Node::Text(text) => out.write_str(text)?,
        Node::Action(pipe) => {
            let value = eval_pipeline(pipe, scope)?;
            write_value(&value, out)?;
        }
        Node::If(branch) => {
            let value = eval_pipeline(&branch.pipe, scope)?;
            let body = if truthy(&value) {
                &branch.then
            } else {
                &branch.otherwise
            };
            exec_list(body, scope, out)?;
        }
        Node::With(branch) => {
            let value = eval_pipeline(&branch.pipe, scope)?;
            if truthy(&value) {
                let saved = std::mem::replace(&mut scope.dot, value);
                exec_list(&branch.then, scope, out)?;
                scope.dot = saved;
            } else {
                exec_list(&branch.otherwise, scope, out)?;
            }
        }
        Node::Range(branch) => {
            let value = eval_pipeline(&branch.pipe, scope)?;
            let items = match value {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => bail!("range over non-array value {other}"),
            };

            if items.is_empty() {
                exec_list(&branch.otherwise, scope, out)?;
                return Ok(());
            }

            let depth = scope.vars.len();
            for (i, item) in items.into_iter().enumerate() {
                scope.vars.truncate(depth);
                match branch.decl.as_slice() {
                    [] => {}
                    [v] => scope.vars.push((v.clone(), item.clone())),
                    [k, v] => {
                        scope.vars.push((k.clone(), Value::from(i)));
                        scope.vars.push((v.clone(), item.clone()));
                    }
                    _ => bail!("too many range variables"),
                }
                let saved = std::mem::replace(&mut scope.dot, item);
                exec_list(&branch.then, scope, out)?;
                scope.dot = saved;
            }
            scope.vars.truncate(depth);
        }
    }
    Ok(())
}

/// Evaluate a pipeline, threading each command's value into the next
pub fn eval_pipeline(pipe: &Pipeline, scope: &mut Scope) -> Result<Value> {
    let mut piped: Option<Value> = None;
    for cmd in &pipe.cmds {
        piped = Some(eval_command(&cmd.args, piped, scope)?);
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn eval_command(args: &[Arg], piped: Option<Value>, scope: &mut Scope) -> Result<Value> {
    if let Arg::Ident(name) = &args[0] {
        let mut values = Vec::with_capacity(args.len());
        for arg in &args[1..] {
            values.push(eval_arg(arg, scope)?);
        }
        if let Some(piped) = piped {
            values.push(piped);
        }
        return call(name, &values);
    }

    if args.len() > 1 {
        bail!("value command takes no arguments");
    }
    eval_arg(&args[0], scope)
}

fn eval_arg(arg: &Arg, scope: &mut Scope) -> Result<Value> {
    Ok(match arg {
        Arg::Field(chain) => resolve(&scope.dot, chain),
        Arg::Variable(name, chain) => {
            let base = if name.is_empty() {
                scope.root.clone()
            } else {
                match scope.vars.iter().rev().find(|(n, _)| n == name) {
                    Some((_, v)) => v.clone(),
                    None => bail!("undefined variable ${name}"),
                }
            };
            resolve(&base, chain)
        }
        Arg::Str(s) => Value::from(s.clone()),
        Arg::Number(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                Value::from(*n as i64)
            } else {
                Value::from(*n)
            }
        }
        Arg::Bool(b) => Value::from(*b),
        Arg::Ident(name) => bail!("function {name:?} is not a value"),
        Arg::Pipe(pipe) => eval_pipeline(pipe, scope)?,
    })
}

/// Walk a field chain; missing keys resolve to null
fn resolve(base: &Value, chain: &[String]) -> Value {
    let mut cur = base;
    for key in chain {
        match cur {
            Value::Object(map) => match map.get(key) {
                Some(v) => cur = v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    cur.clone()
}

/// The template helper functions
fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "json" => {
            let [v] = args else {
                bail!("json takes exactly one argument");
            };
            Ok(Value::from(serde_json::to_string(v)?))
        }
        "eq" => binary(name, args, |a, b| Value::Bool(loose_eq(a, b))),
        "ne" => binary(name, args, |a, b| Value::Bool(!loose_eq(a, b))),
        "not" => {
            let [v] = args else {
                bail!("not takes exactly one argument");
            };
            Ok(Value::Bool(!truthy(v)))
        }
        "and" => {
            let mut last = Value::Bool(true);
            for v in args {
                if !truthy(v) {
                    return Ok(v.clone());
                }
                last = v.clone();
            }
            Ok(last)
        }
        "or" => {
            let mut last = Value::Bool(false);
            for v in args {
                if truthy(v) {
                    return Ok(v.clone());
                }
                last = v.clone();
            }
            Ok(last)
        }
        "len" => {
            let [v] = args else {
                bail!("len takes exactly one argument");
            };
            let n = match v {
                Value::String(s) => s.len(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => bail!("len of non-collection value"),
            };
            Ok(Value::from(n))
        }
        _ => bail!("function {name:?} not defined"),
    }
}

fn binary(name: &str, args: &[Value], f: impl Fn(&Value, &Value) -> Value) -> Result<Value> {
    let [a, b] = args else {
        bail!("{name} takes exactly two arguments");
    };
    Ok(f(a, b))
}

/// Equality with numeric coercion between integer and float forms
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Empty, zero, false, and null are all falsy
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Print a value the way templates expect: null as nothing, scalars bare,
/// collections as JSON
pub fn write_value(v: &Value, out: &mut impl Write) -> Result<()> {
    match v {
        Value::Null => {}
        Value::String(s) => out.write_str(s)?,
        Value::Bool(b) => write!(out, "{b}")?,
        Value::Number(n) => write!(out, "{n}")?,
        Value::Array(_) | Value::Object(_) => out.write_str(&serde_json::to_string(v)?)?,
    }
    Ok(())
}
