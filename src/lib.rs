//! A tiny interactive shell built on processes and pipes.
//!
//! This crate implements a miniature command interpreter: a line parser that
//! turns raw input into pipeline stages, a registry of built-in commands
//! (`exit`, `cd`, `pwd`, `echo`, `kill`, `ps`), and an executor that launches
//! each stage as its own OS process with the stages connected stdout-to-stdin
//! through pipes. A trailing `&` runs a pipeline without blocking the prompt.
//! It is intentionally small and easy to read, suitable for coursework and
//! experiments with process management.
//!
//! The main entry point is [`Interpreter`], whose `repl` method drives the
//! interactive loop. The public modules [`command`], [`env`], [`external`]
//! and [`parser`] expose the types needed to embed the pieces individually.

mod builtin;
pub mod command;
pub mod env;
mod executor;
pub mod external;
mod interpreter;
pub mod parser;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
