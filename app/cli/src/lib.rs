//! Command-line interface for the tusk model runtime

pub mod cmd;
pub mod repl;
pub mod runner;
