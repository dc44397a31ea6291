use crate::command::{CommandFactory, ResolvedStage};
use crate::env::Environment;
use crate::interpreter::Factory;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A pipeline stage resolved to a program image on the filesystem.
///
/// Holds the resolved executable path and the arguments after the command
/// name; the executor decides how to bind its streams and launch it.
pub struct ExternalProgram {
    pub program: PathBuf,
    pub argv: Vec<String>,
}

impl ExternalProgram {
    /// Build a [`Command`] carrying the shell's variables and working
    /// directory; stream bindings are left to the caller.
    pub fn to_command(&self, env: &Environment) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.argv)
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir);
        command
    }
}

impl CommandFactory for Factory<ExternalProgram> {
    fn try_create(&self, env: &Environment, name: &str, args: &[&str]) -> Option<ResolvedStage> {
        let search_paths = env.get_var("PATH")?;
        let executable = resolve_program(OsStr::new(&search_paths), Path::new(name))?;
        Some(ResolvedStage::External(ExternalProgram {
            program: executable.into_owned(),
            argv: args.iter().map(|s| s.to_string()).collect(),
        }))
    }
}

/// Resolve a command path the way a typical shell would.
///
/// An absolute path, a `./`-prefixed path, or a path with multiple components
/// is returned as-is if it exists; a bare name is searched for in each
/// directory of `search_paths` (PATH). An empty path resolves to nothing.
pub fn resolve_program<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return existing(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(name), None) => search_path_dirs(search_paths, name.as_os_str()).map(Cow::Owned),
        _ => existing(path).map(Cow::Borrowed),
    }
}

fn search_path_dirs(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.exists())
}

fn existing(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
