use crate::command::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fmt;

/// Errors a single input line can produce.
///
/// Parse errors are recoverable: the offending line is reported and
/// discarded, and the parser moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// `&` appeared somewhere other than the final token of the line.
    BackgroundNotLast,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BackgroundNotLast => write!(f, "& must be last"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Outcome of asking the parser for the next command.
#[derive(Debug)]
pub enum Parsed {
    /// A well-formed command line, ready for the executor.
    Command(CommandLine),
    /// The input source is exhausted; the driver loop should terminate.
    Eof,
}

/// Split one line of text into a [`CommandLine`].
///
/// Tokens are separated by whitespace runs; there is no quoting. A standalone
/// `|` closes the current stage and opens the next one, and a standalone `&`
/// as the final token marks the pipeline as background. `&` anywhere else is
/// an error.
///
/// Stages are passed through as found, including empty ones (`cmd |`,
/// `| cmd`, or a line of only whitespace); rejecting those is the executor's
/// responsibility. Parsing is deterministic: the same text always yields a
/// structurally equal result.
///
/// ```
/// use minish::parser::parse_line;
///
/// let line = parse_line("echo hello | wc").unwrap();
/// assert_eq!(line.stages, vec![vec!["echo", "hello"], vec!["wc"]]);
/// assert!(!line.background);
/// ```
pub fn parse_line(line: &str) -> Result<CommandLine, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let mut stages = Vec::new();
    let mut current = Vec::new();
    let mut background = false;

    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "&" => {
                if i != tokens.len() - 1 {
                    return Err(ParseError::BackgroundNotLast);
                }
                background = true;
            }
            "|" => stages.push(std::mem::take(&mut current)),
            word => current.push(word.to_string()),
        }
    }
    stages.push(current);

    Ok(CommandLine { stages, background })
}

/// Reads command lines from the interactive editor, one call per command.
///
/// Wraps a [`rustyline`] editor so the user gets history and line editing.
/// Malformed lines are reported to the error stream and the parser reads the
/// next line in their place; only a well-formed command or end of input is
/// ever returned.
pub struct LineParser {
    editor: DefaultEditor,
}

impl LineParser {
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }

    /// Read lines until one parses as a command, or the input runs out.
    ///
    /// An interrupt (Ctrl-C) discards the current line and re-issues the
    /// prompt, like any interactive shell.
    pub fn parse(&mut self, prompt: &str) -> Parsed {
        loop {
            match self.editor.readline(prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    match parse_line(&line) {
                        Ok(command) => return Parsed::Command(command),
                        Err(err) => eprintln!("{err}"),
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Parsed::Eof,
                Err(err) => {
                    eprintln!("error: {err}");
                    return Parsed::Eof;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_command_splits_on_whitespace() {
        let line = parse_line("cmd 1 2 3").unwrap();
        assert_eq!(line.stages, vec![stage(&["cmd", "1", "2", "3"])]);
        assert!(!line.background);
    }

    #[test]
    fn leading_and_trailing_whitespace_ignored() {
        let line = parse_line("  cmd   a\tb  ").unwrap();
        assert_eq!(line.stages, vec![stage(&["cmd", "a", "b"])]);
    }

    #[test]
    fn pipeline_keeps_stage_order() {
        let line = parse_line("cmd1 a b c | cmd2 a b c | cmd3").unwrap();
        assert_eq!(
            line.stages,
            vec![
                stage(&["cmd1", "a", "b", "c"]),
                stage(&["cmd2", "a", "b", "c"]),
                stage(&["cmd3"]),
            ]
        );
        assert!(!line.background);
    }

    #[test]
    fn trailing_ampersand_sets_background() {
        let line = parse_line("cmd1 a b c | cmd2 a b c | cmd3 &").unwrap();
        assert_eq!(line.stages.len(), 3);
        assert!(line.background);
        for stage in &line.stages {
            assert!(!stage.contains(&"&".to_string()));
        }
    }

    #[test]
    fn single_command_background() {
        let line = parse_line("cmd1 a b c &").unwrap();
        assert_eq!(line.stages, vec![stage(&["cmd1", "a", "b", "c"])]);
        assert!(line.background);
    }

    #[test]
    fn misplaced_ampersand_is_an_error() {
        assert_eq!(
            parse_line("cmd1 & | cmd2"),
            Err(ParseError::BackgroundNotLast)
        );
        assert_eq!(parse_line("& cmd"), Err(ParseError::BackgroundNotLast));
    }

    #[test]
    fn empty_line_yields_one_empty_stage() {
        // The executor, not the parser, rejects empty stages.
        let line = parse_line("").unwrap();
        assert_eq!(line.stages, vec![Vec::<String>::new()]);
        assert!(!line.background);
    }

    #[test]
    fn bare_pipe_yields_empty_stages() {
        let line = parse_line("|").unwrap();
        assert_eq!(line.stages, vec![Vec::<String>::new(), Vec::new()]);

        let line = parse_line("cmd |").unwrap();
        assert_eq!(line.stages, vec![stage(&["cmd"]), Vec::new()]);
    }

    #[test]
    fn pipe_is_only_special_as_a_standalone_token() {
        let line = parse_line("a|b c").unwrap();
        assert_eq!(line.stages, vec![stage(&["a|b", "c"])]);
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "cmd1 a | cmd2 b &";
        let first = parse_line(text).unwrap();
        let second = parse_line(text).unwrap();
        assert_eq!(first, second);
    }
}
