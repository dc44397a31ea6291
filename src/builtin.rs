use crate::command::{CommandFactory, ExecutableCommand, ExitCode, ResolvedStage};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`). Unlike external
/// programs they are implemented in this crate, but the executor still runs
/// them behind the same stage contract, so from the outside they behave like
/// any other process in a pipeline.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero
    /// for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match T::execute(*self, stdin, stdout, env) {
            Ok(code) => Ok(code),
            Err(err) => {
                eprintln!("{}: {err}", T::name());
                Ok(1)
            }
        }
    }
}

/// Stage produced when argh rejects a builtin's argument vector.
///
/// Prints the usage text and exits with status 2, or 0 when the user asked
/// for `--help`. Nothing else runs, so a wrong arity never touches any state.
struct InvalidArgs {
    output: String,
    code: ExitCode,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.code == 0 {
            writeln!(stdout, "{}", self.output.trim_end())?;
        } else {
            eprintln!("{}", self.output.trim_end());
        }
        Ok(self.code)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, _env: &Environment, name: &str, args: &[&str]) -> Option<ResolvedStage> {
        if name != T::name() {
            return None;
        }
        Some(match T::from_args(&[name], args) {
            Ok(cmd) => ResolvedStage::Builtin(Box::new(cmd)),
            Err(EarlyExit { output, status }) => ResolvedStage::Builtin(Box::new(InvalidArgs {
                output,
                code: if status.is_err() { 2 } else { 0 },
            })),
        })
    }
}

#[derive(FromArgs)]
/// Terminate the shell process with status 0.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        std::process::exit(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = PathBuf::from(&self.target);
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Write the arguments to standard output, separated by spaces.
/// By default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Send a termination signal to a process.
pub struct Kill {
    #[argh(positional)]
    /// signal name, TERM or KILL.
    pub signal: String,

    #[argh(positional)]
    /// id of the target process.
    pub pid: i32,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let sig = match self.signal.as_str() {
            "TERM" => Signal::SIGTERM,
            "KILL" => Signal::SIGKILL,
            _ => {
                eprintln!("usage: kill TERM|KILL <pid>");
                return Ok(2);
            }
        };

        match signal::kill(Pid::from_raw(self.pid), sig) {
            Ok(()) => Ok(0),
            Err(err) => {
                eprintln!("kill: {err}");
                Ok(1)
            }
        }
    }
}

#[derive(FromArgs)]
/// List running processes from the process table.
pub struct Ps {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

struct ProcEntry {
    pid: i32,
    name: String,
    state: char,
}

impl Ps {
    /// Read pid, command name and state from `/proc/<pid>/stat`.
    ///
    /// The process table is inherently racy, so any entry that disappears or
    /// fails to parse is skipped rather than reported.
    fn read_entry(pid: i32) -> Option<ProcEntry> {
        let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let mut fields = stat.split_whitespace();
        let pid = fields.next()?.parse().ok()?;
        let name = fields.next()?.to_string();
        let state = fields.next()?.chars().next()?;
        Some(ProcEntry { pid, name, state })
    }
}

impl BuiltinCommand for Ps {
    fn name() -> &'static str {
        "ps"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let entries = fs::read_dir("/proc").context("can't list /proc")?;

        let mut procs = Vec::new();
        for entry in entries.flatten() {
            if let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() {
                if let Some(proc_entry) = Self::read_entry(pid) {
                    procs.push(proc_entry);
                }
            }
        }

        writeln!(stdout, "{:>6} {:>7} {:>8}", "PID", "STATE", "NAME")?;
        for p in procs {
            writeln!(stdout, "{:<10} {}    {}", p.pid, p.state, p.name)?;
        }
        Ok(0)
    }
}
