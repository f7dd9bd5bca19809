//! Resolution of the install engine command.
//!
//! The command comes from, in order: the `--engine` flag, the
//! [`ENGINE_ENV`] environment variable, the manifest's `settings.engine`,
//! and finally [`DEFAULT_ENGINE_PROGRAM`].

use std::{env, ffi::OsString, fmt};

use engine_env::{DEFAULT_ENGINE_PROGRAM, ENGINE_ENV};
use miette::Diagnostic;
use thiserror::Error;

/// An engine command line that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EngineCommandError {
    /// The command string has unbalanced quotes or escapes.
    #[error("cannot parse engine command `{value}`")]
    #[diagnostic(
        code(depforge::engine::unparseable_command),
        help("quote the command the way a POSIX shell would")
    )]
    Unparseable {
        /// Raw command string.
        value: String,
    },
    /// The command names no program.
    #[error("engine command from {origin} is empty")]
    #[diagnostic(code(depforge::engine::empty_command))]
    Empty {
        /// Where the command came from.
        origin: &'static str,
    },
}

/// Program plus the arguments placed before the generated engine arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: String,
    leading_args: Vec<String>,
}

impl EngineCommand {
    /// Build a command from already split words.
    ///
    /// # Errors
    ///
    /// Returns [`EngineCommandError::Empty`] when `words` is empty.
    pub fn from_words(
        words: impl IntoIterator<Item = String>,
        origin: &'static str,
    ) -> Result<Self, EngineCommandError> {
        let mut words = words.into_iter();
        let program = words
            .next()
            .filter(|program| !program.is_empty())
            .ok_or(EngineCommandError::Empty { origin })?;
        Ok(Self {
            program,
            leading_args: words.collect(),
        })
    }

    /// Split `line` shell-style into a command.
    ///
    /// # Errors
    ///
    /// Returns [`EngineCommandError`] when the line cannot be split or is
    /// empty.
    pub fn parse(line: &str, origin: &'static str) -> Result<Self, EngineCommandError> {
        let words = shlex::split(line).ok_or_else(|| EngineCommandError::Unparseable {
            value: line.to_owned(),
        })?;
        Self::from_words(words, origin)
    }

    /// Program to spawn.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed before the generated ones.
    #[must_use]
    pub fn leading_args(&self) -> &[String] {
        &self.leading_args
    }
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_ENGINE_PROGRAM.to_owned(),
            leading_args: Vec::new(),
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str())
            .chain(self.leading_args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(joined) => f.write_str(&joined),
            Err(_) => f.write_str(&self.program),
        }
    }
}

/// Resolve the engine command using `read_env` for environment lookups.
///
/// An environment value that is not UTF-8 or is blank is ignored.
///
/// # Errors
///
/// Returns [`EngineCommandError`] when the chosen source holds an unusable
/// command.
pub fn resolve_engine_command_with<F>(
    mut read_env: F,
    cli_override: Option<&str>,
    configured: &[String],
) -> Result<EngineCommand, EngineCommandError>
where
    F: FnMut(&str) -> Option<OsString>,
{
    if let Some(line) = cli_override {
        return EngineCommand::parse(line, "--engine");
    }
    let from_env = read_env(ENGINE_ENV)
        .and_then(|value| value.into_string().ok())
        .filter(|value| !value.trim().is_empty());
    if let Some(line) = from_env {
        return EngineCommand::parse(&line, ENGINE_ENV);
    }
    if !configured.is_empty() {
        return EngineCommand::from_words(configured.iter().cloned(), "settings.engine");
    }
    Ok(EngineCommand::default())
}

/// Resolve the engine command from the process environment.
///
/// # Errors
///
/// See [`resolve_engine_command_with`].
pub fn resolve_engine_command(
    cli_override: Option<&str>,
    configured: &[String],
) -> Result<EngineCommand, EngineCommandError> {
    resolve_engine_command_with(|key| env::var_os(key), cli_override, configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Vec<String> {
        vec!["python3".into(), "third_party/deps.py".into()]
    }

    #[test]
    fn cli_override_wins() {
        let command = resolve_engine_command_with(
            |_| Some(OsString::from("from-env")),
            Some("/opt/engine --quiet"),
            &configured(),
        )
        .expect("command");
        assert_eq!(command.program(), "/opt/engine");
        assert_eq!(command.leading_args(), ["--quiet"]);
    }

    #[test]
    fn env_beats_manifest() {
        let command = resolve_engine_command_with(
            |_| Some(OsString::from("'my engine' -v")),
            None,
            &configured(),
        )
        .expect("command");
        assert_eq!(command.program(), "my engine");
        assert_eq!(command.to_string(), "'my engine' -v");
    }

    #[test]
    fn manifest_then_default() {
        let command =
            resolve_engine_command_with(|_| Some(OsString::from("  ")), None, &configured())
                .expect("command");
        assert_eq!(command.program(), "python3");
        let command = resolve_engine_command_with(|_| None, None, &[]).expect("command");
        assert_eq!(command, EngineCommand::default());
    }

    #[cfg(unix)]
    #[test]
    fn ignores_invalid_utf8_env_value() {
        use std::os::unix::ffi::OsStringExt;

        let command =
            resolve_engine_command_with(|_| Some(OsString::from_vec(vec![0xff, b'x'])), None, &[])
                .expect("command");
        assert_eq!(command.program(), DEFAULT_ENGINE_PROGRAM);
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let err = resolve_engine_command_with(|_| None, Some("'unterminated"), &[])
            .expect_err("unbalanced");
        assert!(matches!(err, EngineCommandError::Unparseable { .. }));
    }
}
