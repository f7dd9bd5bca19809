//! The install engine as a child process.

use std::{
    io::{self, BufReader},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
};

use camino::Utf8PathBuf;
use tracing::info;

use super::program::EngineCommand;
use super::redaction::redact_arguments;
use super::streaming::{Forwarded, forward_and_capture};
use super::{EngineOutput, InstallEngine};

/// Runs the engine as a subprocess, streaming its output to ours.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: EngineCommand,
    working_dir: Option<Utf8PathBuf>,
}

impl ProcessEngine {
    /// Engine spawning `command`.
    #[must_use]
    pub const fn new(command: EngineCommand) -> Self {
        Self {
            command,
            working_dir: None,
        }
    }

    /// Run the engine from `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The command being spawned.
    #[must_use]
    pub const fn command(&self) -> &EngineCommand {
        &self.command
    }
}

fn log_command_execution(command: &EngineCommand, args: &[String]) {
    let leading = redact_arguments(command.leading_args());
    let generated = redact_arguments(args);
    info!(
        "Running install engine: {} {}",
        command.program(),
        leading
            .iter()
            .chain(&generated)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    );
}

fn handle_forwarding_thread_result(
    result: thread::Result<Forwarded>,
    stream_name: &str,
) -> Vec<u8> {
    match result {
        Ok(forwarded) => {
            if forwarded.stats.write_failed {
                tracing::debug!("{stream_name} forwarding hit a closed pipe; output truncated");
            }
            forwarded.captured
        }
        Err(err) => {
            tracing::warn!("{stream_name} forwarding thread panicked: {err:?}");
            Vec::new()
        }
    }
}

fn terminate_child(child: &mut Child, context: &str) {
    if let Err(err) = child.kill() {
        tracing::debug!("failed to kill engine after {context}: {err}");
    }
    if let Err(err) = child.wait() {
        tracing::debug!("failed to reap engine after {context}: {err}");
    }
}

fn stream_and_capture(mut child: Child) -> io::Result<(ExitStatus, String)> {
    let Some(stdout) = child.stdout.take() else {
        terminate_child(&mut child, "stdout pipe unavailable");
        return Err(io::Error::other("engine process missing stdout pipe"));
    };
    let Some(stderr) = child.stderr.take() else {
        terminate_child(&mut child, "stderr pipe unavailable");
        return Err(io::Error::other("engine process missing stderr pipe"));
    };

    let out_handle = thread::spawn(move || {
        let lock = io::stdout().lock();
        forward_and_capture(BufReader::new(stdout), lock, "stdout")
    });
    let err_handle = thread::spawn(move || {
        let lock = io::stderr().lock();
        forward_and_capture(BufReader::new(stderr), lock, "stderr")
    });

    let status = child.wait()?;
    let mut captured = handle_forwarding_thread_result(out_handle.join(), "stdout");
    captured.extend(handle_forwarding_thread_result(err_handle.join(), "stderr"));
    Ok((status, String::from_utf8_lossy(&captured).into_owned()))
}

impl InstallEngine for ProcessEngine {
    fn invoke(&self, args: &[String]) -> io::Result<EngineOutput> {
        let mut cmd = Command::new(self.command.program());
        cmd.args(self.command.leading_args()).args(args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        log_command_execution(&self.command, args);
        let child = cmd.spawn()?;
        let (status, output) = stream_and_capture(child)?;
        Ok(EngineOutput {
            code: status.code(),
            output,
        })
    }

    fn describe(&self) -> String {
        self.command.to_string()
    }
}
