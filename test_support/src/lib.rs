//! Test utilities for process management and project fixtures.
//!
//! Provides fake install engines as `/bin/sh` scripts and a temporary project
//! directory with a `Depsfile` and source tree.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Convert a temporary path into a UTF-8 path.
///
/// # Panics
///
/// Panics when the path is not valid UTF-8.
#[must_use]
pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf8 temp path")
}

fn write_script(dir: &Utf8Path, name: &str, body: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("perms");
    }
    path
}

/// Create a fake engine that prints `stdout` and exits with `exit_code`.
///
/// Returns the temporary directory and the path to the executable.
///
/// # Panics
///
/// Panics when the script cannot be written.
#[must_use]
pub fn fake_engine(exit_code: i32, stdout: &str) -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = utf8(dir.path());
    let body = format!("cat <<'DEPFORGE_EOF'\n{stdout}\nDEPFORGE_EOF\nexit {exit_code}\n");
    let path = write_script(&root, "engine", &body);
    (dir, path)
}

/// A fake engine that records each argument on its own line.
#[derive(Debug)]
pub struct RecordingEngine {
    _dir: TempDir,
    /// Executable to pass as the engine command.
    pub program: Utf8PathBuf,
    /// File receiving the recorded arguments.
    pub log: Utf8PathBuf,
}

impl RecordingEngine {
    /// Create the script; it exits successfully.
    ///
    /// # Panics
    ///
    /// Panics when the script cannot be written.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8(dir.path());
        let log = root.join("argv.log");
        let body = format!(
            "for arg in \"$@\"; do printf '%s\\n' \"$arg\" >> '{log}'; done\npwd > '{log}.cwd'\n"
        );
        let program = write_script(&root, "engine", &body);
        Self {
            _dir: dir,
            program,
            log,
        }
    }

    /// Arguments the engine was called with.
    ///
    /// # Panics
    ///
    /// Panics when the engine has not run.
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .expect("engine log")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Directory the engine ran in.
    ///
    /// # Panics
    ///
    /// Panics when the engine has not run.
    #[must_use]
    pub fn working_dir(&self) -> Utf8PathBuf {
        let cwd = fs::read_to_string(format!("{}.cwd", self.log)).expect("engine cwd");
        Utf8PathBuf::from(cwd.trim_end())
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary project directory.
#[derive(Debug)]
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// Create an empty project.
    ///
    /// # Panics
    ///
    /// Panics when the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> Utf8PathBuf {
        utf8(self.dir.path())
    }

    /// Write `contents` to `relative`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics when the file cannot be written.
    pub fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write fixture");
        path
    }

    /// Write the project's `Depsfile`.
    pub fn depsfile(&self, yaml: &str) -> Utf8PathBuf {
        self.write("Depsfile", yaml)
    }

    /// Read a file below the root.
    ///
    /// # Panics
    ///
    /// Panics when the file cannot be read.
    #[must_use]
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).expect("read fixture")
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}
