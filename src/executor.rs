use crate::command::{CommandFactory, CommandLine, ExecutableCommand, ExitCode, ResolvedStage};
use crate::env::Environment;
use anyhow::{Context, Result, anyhow, bail};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid, fork};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;

/// Launches the stages of a parsed command line and tracks their processes.
///
/// Stages are wired together with OS pipes and launched left to right. Every
/// stage runs as its own process: builtins are forked so they take part in
/// piping exactly like external programs, externals are spawned. The one
/// exception is the tail of a foreground pipeline, which runs without forking
/// so that `exit` can terminate the shell and `cd` can move it.
pub struct Executor {
    commands: Vec<Box<dyn CommandFactory>>,
    /// Pids of launched stages not yet waited on, reaped opportunistically.
    outstanding: Vec<Pid>,
}

impl Executor {
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            commands,
            outstanding: Vec::new(),
        }
    }

    /// Execute one command line against the shell's standard output.
    pub fn execute(&mut self, line: CommandLine, env: &mut Environment) -> Result<()> {
        self.execute_with_output(line, env, &mut io::stdout())
    }

    /// Execute one command line, sending a foreground builtin tail's output
    /// to `out` instead of standard output. Forked and spawned stages write
    /// to their own bound streams regardless.
    pub fn execute_with_output(
        &mut self,
        line: CommandLine,
        env: &mut Environment,
        out: &mut dyn Write,
    ) -> Result<()> {
        if line.stages.is_empty() {
            bail!("empty command");
        }

        // Children must not inherit half-written buffered output.
        out.flush()?;

        let last = line.stages.len() - 1;
        let mut input: Option<OwnedFd> = None;

        for stage in &line.stages[..last] {
            let resolved = self.resolve(stage, env)?;
            let (next_input, pid) = spawn_piped(resolved, input.take(), env)?;
            eprintln!("forked: {:<10} pid: {:>6}", stage[0], pid.as_raw());
            self.outstanding.push(pid);
            input = Some(next_input);
        }

        let tail = &line.stages[last];
        let resolved = self.resolve(tail, env)?;
        if line.background {
            let pid = spawn_inherit(resolved, input.take(), env)?;
            eprintln!("forked: {:<10} pid: {:>6}", tail[0], pid.as_raw());
            self.outstanding.push(pid);
            Ok(())
        } else {
            run_tail(resolved, input.take(), env, out)
        }
    }

    /// Resolve a stage's argument vector against the registry.
    ///
    /// Builtin factories are probed first, the external-program factory last;
    /// a name nothing recognizes fails the stage.
    fn resolve(&self, stage: &[String], env: &Environment) -> Result<ResolvedStage> {
        let Some((name, rest)) = stage.split_first() else {
            bail!("empty command");
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        for factory in &self.commands {
            if let Some(resolved) = factory.try_create(env, name, &args) {
                return Ok(resolved);
            }
        }
        bail!("command not found: {name}")
    }

    /// Collect exited children without blocking.
    ///
    /// Called once per driver-loop turn so neither intermediate stages nor
    /// background pipelines pile up as zombies, while a stage that outlives
    /// its pipeline never stalls the prompt.
    pub fn reap_exited(&mut self) {
        self.outstanding.retain(|&pid| {
            !matches!(
                waitpid(pid, Some(WaitPidFlag::WNOHANG)),
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) | Err(_)
            )
        });
    }
}

/// Launch a stage whose output feeds the next stage through a fresh pipe.
///
/// Returns the pipe's read end and the child's pid. The write end is handed
/// to the child and closed here, so the downstream stage sees end-of-stream
/// as soon as the child exits.
fn spawn_piped(
    resolved: ResolvedStage,
    input: Option<OwnedFd>,
    env: &mut Environment,
) -> Result<(OwnedFd, Pid)> {
    match resolved {
        ResolvedStage::Builtin(cmd) => {
            let (read, write) = unistd::pipe().context("can't create pipe")?;
            match unsafe { fork() }.context("can't fork")? {
                ForkResult::Child => {
                    // The child keeps only the write end; a lingering read
                    // end here would keep the pipe alive after the real
                    // reader is gone.
                    drop(read);
                    let code = run_forked(cmd, input, Some(write), env);
                    std::process::exit(code);
                }
                ForkResult::Parent { child } => {
                    drop(write);
                    drop(input);
                    Ok((read, child))
                }
            }
        }
        ResolvedStage::External(program) => {
            let mut command = program.to_command(env);
            command.stdin(match input {
                Some(fd) => Stdio::from(fd),
                None => Stdio::inherit(),
            });
            command.stdout(Stdio::piped());
            let mut child = command
                .spawn()
                .with_context(|| format!("can't start {}", program.program.display()))?;
            let pid = Pid::from_raw(child.id() as i32);
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| anyhow!("no stdout pipe from {}", program.program.display()))?;
            Ok((OwnedFd::from(stdout), pid))
        }
    }
}

/// Launch a stage that writes straight to the shell's standard output.
///
/// Used for the tail of a background pipeline: output is never suppressed by
/// backgrounding, only waiting is skipped.
fn spawn_inherit(
    resolved: ResolvedStage,
    input: Option<OwnedFd>,
    env: &mut Environment,
) -> Result<Pid> {
    match resolved {
        ResolvedStage::Builtin(cmd) => match unsafe { fork() }.context("can't fork")? {
            ForkResult::Child => {
                let code = run_forked(cmd, input, None, env);
                std::process::exit(code);
            }
            ForkResult::Parent { child } => {
                drop(input);
                Ok(child)
            }
        },
        ResolvedStage::External(program) => {
            let mut command = program.to_command(env);
            command.stdin(match input {
                Some(fd) => Stdio::from(fd),
                None => Stdio::inherit(),
            });
            let child = command
                .spawn()
                .with_context(|| format!("can't start {}", program.program.display()))?;
            Ok(Pid::from_raw(child.id() as i32))
        }
    }
}

/// Run the tail of a foreground pipeline and wait for it.
///
/// A builtin executes in this very process, which is what lets `exit`
/// terminate the shell and `cd` change the directory the prompt shows. An
/// external program is spawned with the same stream bindings and waited on.
/// A non-zero status becomes the pipeline's error.
fn run_tail(
    resolved: ResolvedStage,
    input: Option<OwnedFd>,
    env: &mut Environment,
    out: &mut dyn Write,
) -> Result<()> {
    let code = match resolved {
        ResolvedStage::Builtin(cmd) => {
            let code = match input {
                Some(fd) => cmd.execute(&mut File::from(fd), out, env)?,
                None => cmd.execute(&mut io::stdin(), out, env)?,
            };
            out.flush()?;
            code
        }
        ResolvedStage::External(program) => {
            let mut command = program.to_command(env);
            command.stdin(match input {
                Some(fd) => Stdio::from(fd),
                None => Stdio::inherit(),
            });
            let status = command
                .status()
                .with_context(|| format!("can't start {}", program.program.display()))?;
            match status.code() {
                Some(code) => code,
                None => bail!("terminated by signal"),
            }
        }
    };

    if code != 0 {
        bail!("exit status {code}");
    }
    Ok(())
}

/// Body of a forked builtin stage: bind the standard streams, run the
/// handler, and hand the status back for `exit`.
fn run_forked(
    cmd: Box<dyn ExecutableCommand>,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
    env: &mut Environment,
) -> ExitCode {
    if let Some(fd) = input {
        if let Err(err) = unistd::dup2(fd.as_raw_fd(), 0) {
            eprintln!("dup2 stdin: {err}");
            return 1;
        }
    }
    if let Some(fd) = output {
        if let Err(err) = unistd::dup2(fd.as_raw_fd(), 1) {
            eprintln!("dup2 stdout: {err}");
            return 1;
        }
    }

    let mut stdin = io::stdin();
    let mut stdout = io::stdout();
    let code = cmd
        .execute(&mut stdin, &mut stdout, env)
        .unwrap_or_else(|err| {
            eprintln!("{err}");
            1
        });
    let _ = stdout.flush();
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{Cd, Echo, Exit, Pwd};
    use crate::external::ExternalProgram;
    use crate::interpreter::Factory;
    use crate::parser::parse_line;
    use std::path::PathBuf;
    use std::thread;
    use std::time::{Duration, Instant};

    fn test_executor() -> Executor {
        Executor::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<ExternalProgram>::default()),
        ])
    }

    fn run(line: CommandLine, env: &mut Environment) -> (Result<()>, String) {
        let mut executor = test_executor();
        let mut out = Vec::new();
        let res = executor.execute_with_output(line, env, &mut out);
        (res, String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn no_stages_is_an_empty_command() {
        let mut env = Environment::new();
        let (res, _) = run(CommandLine::default(), &mut env);
        assert!(res.unwrap_err().to_string().contains("empty command"));
    }

    #[test]
    fn blank_line_is_an_empty_command() {
        let mut env = Environment::new();
        let (res, _) = run(parse_line("   ").unwrap(), &mut env);
        assert!(res.unwrap_err().to_string().contains("empty command"));
    }

    #[test]
    fn leading_pipe_is_an_empty_command() {
        let mut env = Environment::new();
        let (res, _) = run(parse_line("| echo hi").unwrap(), &mut env);
        assert!(res.unwrap_err().to_string().contains("empty command"));
    }

    #[test]
    fn unknown_command_fails_resolution() {
        let mut env = Environment::new();
        let (res, _) = run(parse_line("no-such-command-xyz-123").unwrap(), &mut env);
        assert!(res.unwrap_err().to_string().contains("command not found"));
    }

    #[test]
    fn echo_runs_end_to_end() {
        let mut env = Environment::new();
        let (res, out) = run(parse_line("echo a b c").unwrap(), &mut env);
        res.unwrap();
        assert_eq!(out, "a b c\n");
    }

    #[test]
    fn pwd_prints_the_environment_directory() {
        let mut env = Environment::new();
        env.current_dir = PathBuf::from("/tmp");
        let (res, out) = run(parse_line("pwd").unwrap(), &mut env);
        res.unwrap();
        assert_eq!(out, "/tmp\n");
    }

    #[test]
    fn cd_wrong_arity_surfaces_as_exit_status_2() {
        let mut env = Environment::new();
        let before = env.current_dir.clone();
        let (res, _) = run(parse_line("cd").unwrap(), &mut env);
        assert_eq!(res.unwrap_err().to_string(), "exit status 2");
        assert_eq!(env.current_dir, before);
    }

    #[test]
    #[cfg(unix)]
    fn pipeline_feeds_the_next_stage() {
        // The first echo is forked and its output consumed, unread, by the
        // second; only the tail's output reaches the caller.
        let mut env = Environment::new();
        let (res, out) = run(parse_line("echo hello | echo world").unwrap(), &mut env);
        res.unwrap();
        assert_eq!(out, "world\n");
    }

    #[test]
    #[cfg(unix)]
    fn background_stage_is_reaped() {
        let mut env = Environment::new();
        let mut executor = test_executor();
        let line = CommandLine {
            stages: vec![vec!["exit".to_string()]],
            background: true,
        };
        let mut out = Vec::new();
        executor
            .execute_with_output(line, &mut env, &mut out)
            .unwrap();
        assert_eq!(executor.outstanding.len(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !executor.outstanding.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
            executor.reap_exited();
        }
        assert!(executor.outstanding.is_empty(), "background stage not reaped");
    }
}
