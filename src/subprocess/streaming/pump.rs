//! Per-stream pump: reader → logical lines → processors

use super::processor::StreamProcessor;
use super::reassembler::logical_lines;
use super::types::StreamSource;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

/// Drives one output stream to its end.
///
/// Each pump owns its own reassembly state; only the processors are shared
/// with the pump of the other stream. Lines are handed to the processors in
/// the order they were read.
pub struct StreamPump {
    source: StreamSource,
    processors: Arc<Vec<Box<dyn StreamProcessor>>>,
}

impl StreamPump {
    pub fn new(source: StreamSource, processors: Arc<Vec<Box<dyn StreamProcessor>>>) -> Self {
        Self { source, processors }
    }

    /// Pump until end-of-stream, returning how many lines were produced
    pub async fn run<R>(self, reader: R) -> usize
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = Box::pin(logical_lines(reader, self.source));
        let mut count = 0;

        while let Some(line) = lines.next().await {
            count += 1;
            for processor in self.processors.iter() {
                if let Err(e) = processor.process_line(line.as_str(), self.source).await {
                    tracing::warn!(
                        "Processor failed to handle line from {}: {}",
                        self.source,
                        e
                    );
                }
            }
        }

        for processor in self.processors.iter() {
            if let Err(e) = processor.on_complete(self.source).await {
                tracing::warn!("Processor failed to complete {} stream: {}", self.source, e);
            }
        }

        count
    }

    /// Run on its own task
    pub fn spawn<R>(self, reader: R) -> JoinHandle<usize>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(reader))
    }
}
