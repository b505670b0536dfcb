//! Logical line reassembly for terminal-style output
//!
//! Progress indicators redraw a line by writing `\r` and the new content,
//! often padded with spaces to blank out a longer previous version. The
//! reassembler follows those redraws so that only the final content of each
//! line is reported, cleaned by [`sanitize_line`].

use super::sanitize::sanitize_line;
use super::types::{LogicalLine, StreamSource};
use crate::error::TunnelError;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of a single read from the child's pipe
pub const READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    AtLineStart,
    InLine,
}

/// Byte-at-a-time line state machine for one output stream.
///
/// `finish` consumes the reassembler, so a stream that has ended cannot be
/// fed again by accident.
#[derive(Debug)]
pub struct LineReassembler {
    pending: Vec<u8>,
    state: LineState,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            state: LineState::AtLineStart,
        }
    }

    /// Feed one byte, returning a line when a newline completes one.
    pub fn push_byte(&mut self, byte: u8) -> Option<LogicalLine> {
        match byte {
            b'\r' => {
                self.pending.clear();
                self.state = LineState::AtLineStart;
                None
            }
            b'\n' => self.flush(),
            b' ' | b'\t' if self.state == LineState::AtLineStart => None,
            _ => {
                self.state = LineState::InLine;
                self.pending.push(byte);
                None
            }
        }
    }

    /// Feed a chunk, appending every completed line to `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut VecDeque<LogicalLine>) {
        for &byte in chunk {
            if let Some(line) = self.push_byte(byte) {
                out.push_back(line);
            }
        }
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(mut self) -> Option<LogicalLine> {
        self.flush()
    }

    fn flush(&mut self) -> Option<LogicalLine> {
        self.state = LineState::AtLineStart;
        if self.pending.is_empty() {
            return None;
        }

        let raw = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();

        let clean = sanitize_line(&raw);
        if clean.is_empty() {
            None
        } else {
            Some(LogicalLine::new(clean))
        }
    }
}

impl Default for LineReassembler {
    fn default() -> Self {
        Self::new()
    }
}

struct LineStreamState<R> {
    reader: R,
    source: StreamSource,
    reassembler: Option<LineReassembler>,
    ready: VecDeque<LogicalLine>,
    buf: Vec<u8>,
}

/// Turn a raw output stream into a stream of logical lines.
///
/// The stream ends at end-of-file or on the first read error; either way the
/// trailing partial line is flushed first. Read errors are logged here and
/// not surfaced to the consumer.
pub fn logical_lines<R>(reader: R, source: StreamSource) -> impl Stream<Item = LogicalLine>
where
    R: AsyncRead + Unpin,
{
    let state = LineStreamState {
        reader,
        source,
        reassembler: Some(LineReassembler::new()),
        ready: VecDeque::new(),
        buf: vec![0u8; READ_CHUNK_SIZE],
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((line, state));
            }

            let mut reassembler = state.reassembler.take()?;

            match state.reader.read(&mut state.buf).await {
                Ok(0) => {
                    if let Some(line) = reassembler.finish() {
                        state.ready.push_back(line);
                    }
                }
                Ok(n) => {
                    reassembler.feed(&state.buf[..n], &mut state.ready);
                    state.reassembler = Some(reassembler);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    state.reassembler = Some(reassembler);
                }
                Err(e) => {
                    let error = TunnelError::StreamRead {
                        stream: state.source,
                        source: e,
                    };
                    tracing::warn!("{}", error);
                    if let Some(line) = reassembler.finish() {
                        state.ready.push_back(line);
                    }
                }
            }
        }
    })
}
