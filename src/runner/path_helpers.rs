//! Path resolution helpers for the runner module.
//!
//! `-C/--directory` behaves like a working directory change for every path
//! given on the command line. Resolved paths are made absolute so the engine
//! can run from the manifest directory.

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};

use super::RunnerError;
use crate::cli::Cli;

/// Resolve `path` against the CLI directory without touching the filesystem.
#[must_use]
pub(super) fn resolve_cli_path(cli: &Cli, path: &Utf8Path) -> Utf8PathBuf {
    match &cli.directory {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Make `path` absolute against the current directory.
///
/// # Errors
///
/// Returns an error when the current directory cannot be read or is not
/// valid UTF-8.
pub(super) fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let resolved = std::path::absolute(path.as_std_path())
        .with_context(|| format!("failed to make '{path}' absolute"))?;
    Utf8PathBuf::from_path_buf(resolved)
        .map_err(|raw| anyhow!("path '{}' is not valid UTF-8", raw.display()))
}

/// Determine the absolute manifest path respecting the CLI's directory option.
///
/// # Errors
///
/// Returns an error when the manifest path has no file name or cannot be made
/// absolute.
pub(super) fn resolve_manifest_path(cli: &Cli) -> Result<Utf8PathBuf> {
    let resolved = resolve_cli_path(cli, &cli.file);
    if resolved.file_name().is_none() {
        return Err(anyhow!("manifest path '{resolved}' does not name a file"));
    }
    absolute(&resolved)
}

pub(super) fn ensure_manifest_exists_or_error(cli: &Cli, manifest_path: &Utf8Path) -> Result<()> {
    if manifest_path.is_file() {
        return Ok(());
    }
    let manifest_name = manifest_path
        .file_name()
        .unwrap_or(manifest_path.as_str())
        .to_owned();
    let directory = match (&cli.directory, manifest_path.parent()) {
        (Some(_), Some(parent)) => format!("directory '{parent}'"),
        _ => "the current directory".to_owned(),
    };
    Err(RunnerError::ManifestNotFound {
        manifest_name,
        directory,
        path: manifest_path.to_path_buf(),
    }
    .into())
}
