//! Writing command output to stdout or a file.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::{self, Write};
use tracing::info;

/// Return `true` when `path` is the CLI sentinel indicating "write to stdout".
#[must_use]
pub(super) fn is_stdout_path(path: &Utf8Path) -> bool {
    path.as_str() == "-"
}

/// Write `content` to stdout.
///
/// # Errors
///
/// Returns an error when stdout cannot be written.
pub(super) fn write_stdout(content: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(content.as_bytes())
        .context("failed to write to stdout")?;
    stdout.flush().context("failed to flush stdout")
}

/// Write `content` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error when a directory or the file cannot be written.
pub(super) fn write_file(path: &Utf8Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{parent}'"))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write '{path}'"))?;
    info!(path = %path, "wrote output file");
    Ok(())
}
