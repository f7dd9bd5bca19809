//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands. It mirrors
//! the design described in the manifest reference: the `Depsfile` sits next to
//! the project and every path given on the command line is resolved against
//! `-C/--directory` when one is set.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::engine::EngineCommand;
use crate::manifest::DEFAULT_MANIFEST;

/// Validate an `--engine` value without keeping the parsed form.
///
/// # Errors
///
/// Returns the parse failure as text when the command cannot be split or is
/// empty.
fn parse_engine_command(value: &str) -> Result<String, String> {
    EngineCommand::parse(value, "--engine")
        .map(|_| value.to_owned())
        .map_err(|err| err.to_string())
}

/// A declarative installer for native third-party libraries.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_MANIFEST)]
    pub file: Utf8PathBuf,

    /// Change to this directory before doing anything.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<Utf8PathBuf>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Install engine command line, split shell-style.
    #[arg(long, value_name = "COMMAND", value_parser = parse_engine_command)]
    pub engine: Option<String>,

    /// Override `settings.sources_dir`.
    #[arg(long, value_name = "DIR")]
    pub sources_dir: Option<Utf8PathBuf>,

    /// Override `settings.install_dir`.
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<Utf8PathBuf>,

    /// Override `settings.cache_dir`.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Optional subcommand to execute; defaults to `install` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Install);
        }
        self
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            file: Utf8PathBuf::from(DEFAULT_MANIFEST),
            directory: None,
            verbose: false,
            engine: None,
            sources_dir: None,
            install_dir: None,
            cache_dir: None,
            command: None,
        }
        .with_default_command()
    }
}

/// Available top-level commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the install engine over every declared library.
    Install,

    /// Write the engine argument list without running it.
    Args {
        /// Output file, or `-` for stdout.
        #[arg(value_name = "FILE", default_value = "-")]
        file: Utf8PathBuf,
    },

    /// Link consumers and print the normalisation and runtime copy plan.
    Plan {
        /// Only plan this consumer.
        #[arg(long, value_name = "ID")]
        consumer: Option<String>,
    },

    /// Link a consumer and copy its runtime artefacts into its output
    /// directory.
    Propagate {
        /// Consumer to propagate for.
        #[arg(long, value_name = "ID")]
        consumer: String,
    },

    /// List the files a header-only or manual library would install.
    Preview {
        /// Library source directory or name.
        #[arg(long, value_name = "LIBRARY")]
        library: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use rstest::rstest;

    #[test]
    fn defaults_to_install() {
        let cli = Cli::try_parse_from(["depforge"])
            .expect("parse")
            .with_default_command();
        assert_eq!(cli.command, Some(Commands::Install));
        assert_eq!(cli.file, DEFAULT_MANIFEST);
        assert_eq!(cli, Cli::default());
    }

    #[rstest]
    #[case(&["depforge", "args"], Commands::Args { file: "-".into() })]
    #[case(&["depforge", "args", "out.txt"], Commands::Args { file: "out.txt".into() })]
    #[case(&["depforge", "plan"], Commands::Plan { consumer: None })]
    #[case(
        &["depforge", "plan", "--consumer", "game"],
        Commands::Plan { consumer: Some("game".into()) }
    )]
    #[case(
        &["depforge", "propagate", "--consumer", "game"],
        Commands::Propagate { consumer: "game".into() }
    )]
    #[case(
        &["depforge", "preview", "--library", "gl3w"],
        Commands::Preview { library: "gl3w".into() }
    )]
    fn parses_subcommands(#[case] argv: &[&str], #[case] expected: Commands) {
        let cli = Cli::try_parse_from(argv).expect("parse");
        assert_eq!(cli.command, Some(expected));
    }

    #[test]
    fn parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "depforge",
            "-C",
            "project",
            "-f",
            "deps.yml",
            "--engine",
            "python3 deps.py",
            "--install-dir",
            "/opt/deps",
            "install",
        ])
        .expect("parse");
        assert_eq!(cli.directory.as_deref(), Some(Utf8Path::new("project")));
        assert_eq!(cli.file, "deps.yml");
        assert_eq!(cli.engine.as_deref(), Some("python3 deps.py"));
        assert_eq!(cli.install_dir.as_deref(), Some(Utf8Path::new("/opt/deps")));
    }

    #[rstest]
    #[case("'unterminated")]
    #[case("")]
    fn rejects_unusable_engine_commands(#[case] engine: &str) {
        assert!(Cli::try_parse_from(["depforge", "--engine", engine]).is_err());
    }

    #[test]
    fn propagate_requires_a_consumer() {
        assert!(Cli::try_parse_from(["depforge", "propagate"]).is_err());
    }
}
