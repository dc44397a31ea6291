use crate::command::CommandFactory;
use crate::env::Environment;
use crate::executor::Executor;
use crate::parser::{LineParser, Parsed};

/// Factory allows resolving stages for commands defined in this crate.
///
/// Only supports the two kinds this crate knows: builtins and external
/// programs.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A minimal shell interpreter: reads command lines, hands them to the
/// executor, and reports failures without ever giving up the prompt.
///
/// The interpreter maintains an [`Environment`] and an [`Executor`] built
/// from a list of command factories that are queried to resolve each
/// pipeline stage by name. See [`Default`] for the factories included out of
/// the box.
pub struct Interpreter {
    env: Environment,
    executor: Executor,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            executor: Executor::new(commands),
        }
    }

    fn prompt(&self) -> String {
        format!("{}$ ", self.env.current_dir.display())
    }

    /// The interactive driver loop.
    ///
    /// Prints a prompt derived from the working directory, parses one
    /// command, executes it, and reports any failure with an `error:` prefix
    /// on the diagnostic stream. Ends normally on end of input; the `exit`
    /// builtin terminates the process directly.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut parser = LineParser::new()?;

        loop {
            self.executor.reap_exited();
            match parser.parse(&self.prompt()) {
                Parsed::Command(line) => {
                    if let Err(err) = self.executor.execute(line, &mut self.env) {
                        eprintln!("error: {err}");
                    }
                }
                Parsed::Eof => return Ok(()),
            }
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `exit`, `cd`, `pwd`, `echo`, `kill`, `ps`
    /// - external command launcher
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalProgram;
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Kill>::default()),
            Box::new(Factory::<Ps>::default()),
            Box::new(Factory::<ExternalProgram>::default()),
        ])
    }
}
