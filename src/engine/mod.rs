//! Install engine invocation.
//!
//! Every registered declaration is serialised into one argument vector,
//! prefixed by the global options, and handed to the engine in a single
//! synchronous call. Only the exit code decides success; captured output is
//! merely scanned to name the library that failed.
//!
//! ```
//! use depforge::engine::{EngineConfig, build_arguments};
//! use depforge::registry::{HeaderOnly, LibraryDeclaration, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register(LibraryDeclaration::HeaderOnly(
//!     HeaderOnly::new("gl3w", ["*.h"]).expect("valid declaration"),
//! ));
//! let config = EngineConfig::new("third_party/src", "third_party/bin");
//! let args = build_arguments(&config, &registry).expect("quotable");
//! assert_eq!(
//!     args,
//!     [
//!         "--sources-dir=third_party/src",
//!         "--install-dir=third_party/bin",
//!         "add-header-lib",
//!         "--src=gl3w",
//!         "--install-subdir=.",
//!         "--glob=*.h",
//!     ]
//! );
//! ```

mod process;
mod program;
mod redaction;
mod streaming;

pub use process::ProcessEngine;
pub use program::{
    EngineCommand, EngineCommandError, resolve_engine_command, resolve_engine_command_with,
};
pub use redaction::{redact_argument, redact_arguments};

use std::io;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::registry::{DeclarationError, Registry};

/// Line prefix the engine logs when a library fails.
pub const FAILURE_MARKER: &str = "Failed to process ";

/// Global engine options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Root holding every library's sources.
    pub sources_dir: Utf8PathBuf,
    /// Root receiving every library's installation.
    pub install_dir: Utf8PathBuf,
    /// Directory caching prebuilt results.
    pub cache_dir: Option<Utf8PathBuf>,
    /// CMake arguments applied to every nested build.
    pub cmake_args: Vec<String>,
    /// Subdirectory of the install root for header-only libraries.
    pub header_subdir: Option<String>,
}

impl EngineConfig {
    /// Configuration with only the two required roots.
    #[must_use]
    pub fn new(sources_dir: impl Into<Utf8PathBuf>, install_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            sources_dir: sources_dir.into(),
            install_dir: install_dir.into(),
            cache_dir: None,
            cmake_args: Vec::new(),
            header_subdir: None,
        }
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the global CMake arguments.
    #[must_use]
    pub fn with_cmake_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmake_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the header-only subdirectory.
    #[must_use]
    pub fn with_header_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.header_subdir = Some(subdir.into());
        self
    }

    /// Directory header-only libraries are installed under.
    #[must_use]
    pub fn header_root(&self) -> Utf8PathBuf {
        self.install_dir
            .join(self.header_subdir.as_deref().unwrap_or(DEFAULT_HEADER_SUBDIR))
    }
}

/// Header-only subdirectory the engine uses when none is passed.
pub const DEFAULT_HEADER_SUBDIR: &str = "header-only";

/// Errors assembling the argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ArgumentError {
    /// A declaration could not be serialised.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Declaration(#[from] DeclarationError),
    /// Global CMake arguments contain unquotable characters.
    #[error("cannot quote global CMake arguments: {reason}")]
    #[diagnostic(code(depforge::engine::unquotable_cmake_args))]
    UnquotableCmakeArgs {
        /// Why quoting failed.
        reason: String,
    },
}

/// Build the full engine argument vector: global options, then every
/// declaration's fragment in registration order.
///
/// # Errors
///
/// Returns [`ArgumentError`] when arguments cannot be quoted.
pub fn build_arguments(
    config: &EngineConfig,
    registry: &Registry,
) -> Result<Vec<String>, ArgumentError> {
    let mut args = vec![
        format!("--sources-dir={}", config.sources_dir),
        format!("--install-dir={}", config.install_dir),
    ];
    if let Some(cache) = &config.cache_dir {
        args.push(format!("--cache-dir={cache}"));
    }
    if !config.cmake_args.is_empty() {
        let joined = shlex::try_join(config.cmake_args.iter().map(String::as_str)).map_err(
            |err| ArgumentError::UnquotableCmakeArgs {
                reason: err.to_string(),
            },
        )?;
        args.push(format!("--cmake-args={joined}"));
    }
    if let Some(subdir) = &config.header_subdir {
        args.push(format!("--header-subdir={subdir}"));
    }
    for fragment in registry.fragments()? {
        args.extend(fragment.into_vec());
    }
    Ok(args)
}

/// What an engine run produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output followed by standard error.
    pub output: String,
}

impl EngineOutput {
    /// Whether the engine exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Something able to run the install engine.
#[cfg_attr(test, mockall::automock)]
pub trait InstallEngine {
    /// Run the engine once with `args`, blocking until it exits.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the engine cannot be started or waited on.
    fn invoke(&self, args: &[String]) -> io::Result<EngineOutput>;

    /// Human-readable name for messages.
    fn describe(&self) -> String;
}

/// Errors from an install run.
#[derive(Debug, Error, Diagnostic)]
pub enum InstallError {
    /// Arguments could not be assembled.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Arguments(#[from] ArgumentError),
    /// The engine could not be started.
    #[error("failed to run install engine `{program}`")]
    #[diagnostic(
        code(depforge::engine::spawn),
        help("set DEPFORGE_ENGINE or settings.engine to the engine command")
    )]
    Spawn {
        /// Engine command.
        program: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The engine exited unsuccessfully.
    #[error("{}", describe_failure(.code, .library))]
    #[diagnostic(code(depforge::engine::failure))]
    EngineFailure {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Source directory of the library that failed, when identifiable.
        library: Option<Utf8PathBuf>,
    },
    /// A previous install failed in this session.
    #[error("a previous install failed in this session")]
    #[diagnostic(code(depforge::engine::poisoned))]
    Poisoned,
}

fn describe_failure(code: &Option<i32>, library: &Option<Utf8PathBuf>) -> String {
    let status = code.map_or_else(
        || "was terminated by a signal".to_owned(),
        |code| format!("exited with status {code}"),
    );
    match library {
        Some(library) => format!("install engine {status} while processing '{library}'"),
        None => format!("install engine {status}"),
    }
}

/// Find the declared library an engine failure concerns.
///
/// Looks for the engine's `Failed to process <name>!` line and matches the
/// name against declared libraries. With a single declaration the failure
/// can only concern that one.
#[must_use]
pub fn identify_failing_library(output: &str, registry: &Registry) -> Option<Utf8PathBuf> {
    let reported = output.lines().find_map(|line| {
        let (_, rest) = line.split_once(FAILURE_MARKER)?;
        let name = rest.trim_end().strip_suffix('!')?;
        registry.iter().find(|decl| decl.name() == name)
    });
    let mut declarations = registry.iter();
    let single = match (declarations.next(), declarations.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    };
    reported
        .or(single)
        .map(|decl| decl.source_subdir().to_path_buf())
}

/// Run `engine` once over every declaration in `registry`.
///
/// # Errors
///
/// Returns [`InstallError`] when arguments cannot be built, the engine
/// cannot be started, or it exits with a non-zero status.
pub fn run_install(
    engine: &dyn InstallEngine,
    config: &EngineConfig,
    registry: &Registry,
) -> Result<(), InstallError> {
    let args = build_arguments(config, registry)?;
    let output = engine.invoke(&args).map_err(|source| InstallError::Spawn {
        program: engine.describe(),
        source,
    })?;
    if output.success() {
        info!(libraries = registry.len(), "install engine finished");
        return Ok(());
    }
    Err(InstallError::EngineFailure {
        code: output.code,
        library: identify_failing_library(&output.output, registry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HeaderOnly, LibraryDeclaration, NestedBuildProject};
    use mockall::predicate::always;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(LibraryDeclaration::HeaderOnly(
            HeaderOnly::new("gl3w", ["*.h"]).expect("header lib"),
        ));
        registry.register(LibraryDeclaration::NestedBuildProject(
            NestedBuildProject::new("vendor/glm")
                .expect("cmake lib")
                .build_debug_too(true),
        ));
        registry
    }

    #[test]
    fn global_options_precede_fragments_in_order() {
        let config = EngineConfig::new("src", "bin")
            .with_cache_dir("cache")
            .with_cmake_args(["-G", "Ninja Multi-Config"])
            .with_header_subdir("headers");
        let args = build_arguments(&config, &registry()).expect("args");
        assert_eq!(
            args.get(..3).expect("roots"),
            ["--sources-dir=src", "--install-dir=bin", "--cache-dir=cache"]
        );
        let cmake_args = args
            .get(3)
            .and_then(|arg| arg.strip_prefix("--cmake-args="))
            .expect("cmake args");
        assert_eq!(
            shlex::split(cmake_args),
            Some(vec!["-G".to_owned(), "Ninja Multi-Config".to_owned()])
        );
        assert_eq!(args.get(4).map(String::as_str), Some("--header-subdir=headers"));
        let header = args.iter().position(|a| a == "add-header-lib");
        let cmake = args.iter().position(|a| a == "add-cmake-lib");
        assert!(header < cmake);
        assert_eq!(args.last().map(String::as_str), Some("--build-debug"));
    }

    #[test]
    fn names_library_from_engine_output() {
        let output = "building...\nERROR:root:Failed to process glm!\n";
        assert_eq!(
            identify_failing_library(output, &registry()),
            Some(Utf8PathBuf::from("vendor/glm"))
        );
        assert_eq!(identify_failing_library("boom", &registry()), None);
    }

    #[test]
    fn non_zero_exit_is_engine_failure() {
        let mut engine = MockInstallEngine::new();
        engine.expect_invoke().with(always()).times(1).returning(|_| {
            Ok(EngineOutput {
                code: Some(1),
                output: "Failed to process gl3w!".into(),
            })
        });
        let err = run_install(&engine, &EngineConfig::new("s", "b"), &registry())
            .expect_err("engine failed");
        match err {
            InstallError::EngineFailure { code, library } => {
                assert_eq!(code, Some(1));
                assert_eq!(library, Some(Utf8PathBuf::from("gl3w")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn spawn_failure_names_engine() {
        let mut engine = MockInstallEngine::new();
        engine
            .expect_invoke()
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "missing")));
        engine.expect_describe().return_const("deps.py".to_owned());
        let err = run_install(&engine, &EngineConfig::new("s", "b"), &registry())
            .expect_err("spawn failed");
        assert_eq!(err.to_string(), "failed to run install engine `deps.py`");
    }

    #[test]
    fn describes_signal_termination() {
        let err = InstallError::EngineFailure {
            code: None,
            library: None,
        };
        assert_eq!(err.to_string(), "install engine was terminated by a signal");
    }
}
