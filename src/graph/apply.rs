//! Executing scheduled runtime copies.
//!
//! Copies are skipped when the destination already holds identical content,
//! so re-running a build does not touch timestamps the consumer's own build
//! tool watches.

use std::fs::{self, File};
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::RuntimeCopyAction;

/// Result of applying one [`RuntimeCopyAction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Whether the artefact was (re)copied.
    pub copied: bool,
    /// Alias links created or replaced.
    pub links: Vec<Utf8PathBuf>,
}

/// Filesystem failures while applying a copy.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The action names no artefact file.
    #[error("artefact path '{path}' has no file name")]
    NoFileName {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// An I/O operation failed.
    #[error("failed to {action} '{path}'")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// Path involved.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

fn io_error(action: &'static str, path: &Utf8Path) -> impl FnOnce(io::Error) -> ApplyError {
    let path = path.to_path_buf();
    move |source| ApplyError::Io {
        action,
        path,
        source,
    }
}

fn file_digest(path: &Utf8Path) -> Result<Vec<u8>, ApplyError> {
    let mut file = File::open(path).map_err(io_error("read", path))?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];
    loop {
        let read = file.read(&mut buf).map_err(io_error("read", path))?;
        if read == 0 {
            break;
        }
        hasher.update(buf.get(..read).unwrap_or_default());
    }
    Ok(hasher.finalize().to_vec())
}

fn same_content(source: &Utf8Path, destination: &Utf8Path) -> Result<bool, ApplyError> {
    let Ok(existing) = fs::metadata(destination) else {
        return Ok(false);
    };
    let incoming = fs::metadata(source).map_err(io_error("inspect", source))?;
    if !existing.is_file() || existing.len() != incoming.len() {
        return Ok(false);
    }
    Ok(file_digest(source)? == file_digest(destination)?)
}

#[cfg(unix)]
fn ensure_link(link: &Utf8Path, target: &str) -> Result<bool, ApplyError> {
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.file_type().is_symlink()
            && fs::read_link(link).is_ok_and(|current| current.as_os_str() == target)
        {
            return Ok(false);
        }
        fs::remove_file(link).map_err(io_error("remove", link))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(io_error("link", link))?;
    Ok(true)
}

#[cfg(not(unix))]
fn ensure_link(link: &Utf8Path, _target: &str) -> Result<bool, ApplyError> {
    debug!(link = %link, "symlinks unsupported on this host; skipping alias");
    Ok(false)
}

impl RuntimeCopyAction {
    /// Copy the artefact into the output directory and refresh its aliases.
    ///
    /// Aliases are relative links to the copied file name.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] when the artefact has no file name or any
    /// filesystem operation fails.
    pub fn apply(&self) -> Result<ApplyOutcome, ApplyError> {
        let Some(file_name) = self.artifact_file_name() else {
            return Err(ApplyError::NoFileName {
                path: self.source_artifact_path.clone(),
            });
        };
        fs::create_dir_all(&self.consumer_output_dir)
            .map_err(io_error("create", &self.consumer_output_dir))?;
        let destination = self.consumer_output_dir.join(file_name);
        let mut outcome = ApplyOutcome::default();
        if same_content(&self.source_artifact_path, &destination)? {
            debug!(path = %destination, "runtime artefact up to date");
        } else {
            fs::copy(&self.source_artifact_path, &destination)
                .map_err(io_error("copy", &self.source_artifact_path))?;
            outcome.copied = true;
        }
        for alias in &self.alias_names {
            let link = self.consumer_output_dir.join(alias);
            if ensure_link(&link, file_name)? {
                outcome.links.push(link);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf8 temp path")
    }

    #[test]
    fn copies_once_then_skips_identical_content() {
        let dir = tempdir().expect("temp dir");
        let root = utf8(dir.path());
        let artifact = root.join("libz.so.1.3");
        fs::write(&artifact, b"elf").expect("write artefact");
        let action = RuntimeCopyAction {
            source_artifact_path: artifact,
            consumer_output_dir: root.join("bin"),
            alias_names: Vec::new(),
        };
        assert!(action.apply().expect("first apply").copied);
        assert!(!action.apply().expect("second apply").copied);
        assert_eq!(
            fs::read(root.join("bin/libz.so.1.3")).expect("copy"),
            b"elf"
        );
    }

    #[test]
    fn recopies_changed_content() {
        let dir = tempdir().expect("temp dir");
        let root = utf8(dir.path());
        let artifact = root.join("plugin.dll");
        fs::write(&artifact, b"one").expect("write artefact");
        let action = RuntimeCopyAction {
            source_artifact_path: artifact.clone(),
            consumer_output_dir: root.join("out"),
            alias_names: Vec::new(),
        };
        action.apply().expect("first apply");
        fs::write(&artifact, b"two").expect("rewrite artefact");
        assert!(action.apply().expect("second apply").copied);
        assert_eq!(fs::read(root.join("out/plugin.dll")).expect("copy"), b"two");
    }

    #[cfg(unix)]
    #[test]
    fn creates_relative_alias_links() {
        let dir = tempdir().expect("temp dir");
        let root = utf8(dir.path());
        let artifact = root.join("libSDL3.so.0.2.4");
        fs::write(&artifact, b"elf").expect("write artefact");
        let action = RuntimeCopyAction {
            source_artifact_path: artifact,
            consumer_output_dir: root.join("bin"),
            alias_names: vec!["libSDL3.so".into(), "libSDL3.so.0".into()],
        };
        let outcome = action.apply().expect("apply");
        assert_eq!(outcome.links.len(), 2);
        let target = fs::read_link(root.join("bin/libSDL3.so.0")).expect("link");
        assert_eq!(target.to_str(), Some("libSDL3.so.0.2.4"));
        assert!(action.apply().expect("reapply").links.is_empty());
    }
}
