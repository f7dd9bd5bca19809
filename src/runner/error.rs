//! Error types for the runner module.
//!
//! Kept apart so the lint suppression for the miette derives stays narrow.

// The miette/thiserror derives trip `unused_assignments` on some compiler
// versions only, so `#[expect]` cannot be used here.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised during command execution.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// The manifest file does not exist at the expected path.
    #[error("no {manifest_name} found in {directory}")]
    #[diagnostic(
        code(depforge::runner::manifest_not_found),
        help("create a Depsfile, pass -f FILE, or run from the project directory with -C DIR")
    )]
    ManifestNotFound {
        /// Name of the expected manifest file.
        manifest_name: String,
        /// Directory description for the message.
        directory: String,
        /// The path that was attempted.
        path: Utf8PathBuf,
    },
    /// The requested consumer is not declared.
    #[error("unknown consumer '{id}'")]
    #[diagnostic(code(depforge::runner::unknown_consumer))]
    UnknownConsumer {
        /// Requested id.
        id: String,
        /// Declared consumers.
        #[help]
        known: Option<String>,
    },
    /// The requested library is not declared.
    #[error("no library declared with source or name '{name}'")]
    #[diagnostic(code(depforge::runner::unknown_library))]
    UnknownLibrary {
        /// Requested source directory or name.
        name: String,
    },
    /// The library installs through a nested build and has no copy rules.
    #[error("library '{name}' is built by CMake; only header and manual libraries can be previewed")]
    #[diagnostic(code(depforge::runner::not_previewable))]
    NotPreviewable {
        /// Library name.
        name: String,
    },
    /// A consumer was asked to propagate without an output directory.
    #[error("consumer '{id}' has no output_dir to copy runtime artefacts into")]
    #[diagnostic(code(depforge::runner::no_output_dir))]
    NoOutputDir {
        /// Consumer id.
        id: String,
    },
}

impl RunnerError {
    pub(super) fn unknown_consumer<'a>(
        id: &str,
        declared: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut declared = declared.into_iter().peekable();
        let known = declared
            .peek()
            .is_some()
            .then(|| format!("declared consumers: {}", declared.join(", ")));
        Self::UnknownConsumer {
            id: id.to_owned(),
            known,
        }
    }
}
