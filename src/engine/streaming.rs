//! Forwarding of engine output to the parent while keeping a copy.
//!
//! The engine's output is shown live and also scanned afterwards for the
//! library it failed on, so every byte read is captured even once the
//! parent stream has gone away.

use std::io::{self, Read, Write};

/// Statistics for one forwarded stream.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub(super) struct ForwardStats {
    pub(super) bytes_read: usize,
    pub(super) bytes_written: usize,
    pub(super) write_failed: bool,
}

/// Result of forwarding a stream.
#[derive(Debug, Default)]
pub(super) struct Forwarded {
    pub(super) stats: ForwardStats,
    pub(super) captured: Vec<u8>,
}

struct CountingReader<'a, R> {
    inner: &'a mut R,
    read: u64,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.read = self.read.saturating_add(count as u64);
        Ok(count)
    }
}

/// Writes to the parent until it fails, capturing everything regardless.
struct TeeWriter<'a, W> {
    parent: &'a mut W,
    captured: Vec<u8>,
    written: u64,
    parent_failed: bool,
    stream_name: &'static str,
}

impl<W: Write> Write for TeeWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.captured.extend_from_slice(buf);
        if !self.parent_failed {
            match self.parent.write_all(buf) {
                Ok(()) => self.written = self.written.saturating_add(buf.len() as u64),
                Err(err) => {
                    self.parent_failed = true;
                    tracing::debug!(
                        "Failed to write engine {} output to parent: {err}; capturing only",
                        self.stream_name
                    );
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.parent_failed {
            return Ok(());
        }
        self.parent.flush()
    }
}

fn clamp_u64_to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Copy `reader` to `writer`, capturing the bytes read.
pub(super) fn forward_and_capture<R, W>(
    mut reader: R,
    mut writer: W,
    stream_name: &'static str,
) -> Forwarded
where
    R: Read,
    W: Write,
{
    let mut counting_reader = CountingReader {
        inner: &mut reader,
        read: 0,
    };
    let mut tee = TeeWriter {
        parent: &mut writer,
        captured: Vec::new(),
        written: 0,
        parent_failed: false,
        stream_name,
    };
    if let Err(err) = io::copy(&mut counting_reader, &mut tee) {
        tracing::debug!("Failed to read engine {stream_name} output: {err}");
    }
    Forwarded {
        stats: ForwardStats {
            bytes_read: clamp_u64_to_usize(counting_reader.read),
            bytes_written: clamp_u64_to_usize(tee.written),
            write_failed: tee.parent_failed,
        },
        captured: tee.captured,
    }
}
