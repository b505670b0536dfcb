//! Stream processor trait and implementations

use super::types::StreamSource;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Byte budget for output retained to explain a failed start
pub const EARLY_OUTPUT_CAP: usize = 4096;

/// Trait for processing stream output line by line
#[async_trait]
pub trait StreamProcessor: Send + Sync {
    /// Process a cleaned line from the stream
    async fn process_line(&self, line: &str, source: StreamSource) -> Result<()>;

    /// Handle end of one stream
    async fn on_complete(&self, _source: StreamSource) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: StreamProcessor + ?Sized> StreamProcessor for Arc<T> {
    async fn process_line(&self, line: &str, source: StreamSource) -> Result<()> {
        (**self).process_line(line, source).await
    }

    async fn on_complete(&self, source: StreamSource) -> Result<()> {
        (**self).on_complete(source).await
    }
}

/// Writes every line to the log as `<tag> <line>`
pub struct LoggingProcessor {
    prefix: String,
}

impl LoggingProcessor {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl StreamProcessor for LoggingProcessor {
    async fn process_line(&self, line: &str, source: StreamSource) -> Result<()> {
        tracing::info!(stream = %source, "{}[{}] {}", self.prefix, source.tag(), line);
        Ok(())
    }

    async fn on_complete(&self, source: StreamSource) -> Result<()> {
        tracing::debug!("{}[{}] stream closed", self.prefix, source.tag());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EarlyOutputState {
    text: String,
    discarded: bool,
}

/// Capped record of the first lines a process printed, shared by both pumps.
///
/// Entries are `<tag>: <line>` and the total never exceeds the cap; the entry
/// that crosses it is cut at a character boundary. Once discarded, the log
/// stays empty.
#[derive(Debug)]
pub struct EarlyOutputLog {
    cap: usize,
    state: Mutex<EarlyOutputState>,
}

impl EarlyOutputLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            state: Mutex::new(EarlyOutputState::default()),
        }
    }

    pub fn append(&self, source: StreamSource, line: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.discarded {
            return;
        }

        let remaining = self.cap.saturating_sub(state.text.len());
        if remaining == 0 {
            return;
        }

        let entry = format!("{}: {}\n", source.tag(), line);
        if entry.len() <= remaining {
            state.text.push_str(&entry);
        } else {
            let mut end = remaining;
            while !entry.is_char_boundary(end) {
                end -= 1;
            }
            state.text.push_str(&entry[..end]);
        }
    }

    /// Copy of everything captured so far
    pub fn snapshot(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the captured text and ignore later appends
    pub fn discard(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.text = String::new();
        state.discarded = true;
    }
}

impl Default for EarlyOutputLog {
    fn default() -> Self {
        Self::new(EARLY_OUTPUT_CAP)
    }
}

/// Feeds lines into a shared [`EarlyOutputLog`]
pub struct EarlyOutputProcessor {
    log: Arc<EarlyOutputLog>,
}

impl EarlyOutputProcessor {
    pub fn new(log: Arc<EarlyOutputLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl StreamProcessor for EarlyOutputProcessor {
    async fn process_line(&self, line: &str, source: StreamSource) -> Result<()> {
        self.log.append(source, line);
        Ok(())
    }
}
