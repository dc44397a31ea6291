use crate::env::Environment;
use crate::external::ExternalProgram;
use anyhow::Result;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// One parsed input line: the pipeline stages in execution order plus the
/// background flag.
///
/// Each stage is a full argument vector whose element 0 is the command name,
/// mirroring the argv convention of a spawned process. Stage *i*'s standard
/// output feeds stage *i+1*'s standard input. A stage may carry an empty
/// vector (for example from a line of only whitespace, or `cmd |`); the
/// executor rejects such stages instead of skipping them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    /// Argument vectors, one per pipeline stage, in pipeline order.
    pub stages: Vec<Vec<String>>,
    /// True when the line ended with `&`: the pipeline must not block the
    /// prompt loop.
    pub background: bool,
}

/// Object-safe contract for a command that runs inside this process image,
/// either in a forked pipeline stage or directly in the shell for a
/// foreground tail.
///
/// By the time `execute` runs, the stage's standard streams have already been
/// bound, so implementors see plain readers and writers.
pub trait ExecutableCommand {
    /// Executes the command. Returns its exit status; `Err` is reserved for
    /// stream-level failures the caller should surface.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// What to run for one pipeline stage, decided once at resolution time.
///
/// The executor launches both variants with identical stream bindings, so a
/// builtin participates in piping exactly like an external program; only the
/// launch mechanism differs (fork versus spawn).
pub enum ResolvedStage {
    /// A command from the builtin registry.
    Builtin(Box<dyn ExecutableCommand>),
    /// A program image resolved on the filesystem.
    External(ExternalProgram),
}

/// Factory that tries to resolve a stage from a command name and arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`, letting the
/// registry fall through to the next factory. Implementations can use the
/// environment to resolve executables (e.g., using PATH).
pub trait CommandFactory {
    /// Attempt to resolve a stage for the provided name and arguments.
    fn try_create(&self, env: &Environment, name: &str, args: &[&str]) -> Option<ResolvedStage>;
}
