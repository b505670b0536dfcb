//! Real-time streaming of the supervised process's output
//!
//! Raw pipe bytes are reassembled into logical lines (following carriage
//! return redraws and stripping terminal escapes), then handed to a chain of
//! processors: the log sink, the early output record and the login prompt
//! trigger. One [`StreamPump`] runs per output stream.

pub mod processor;
pub mod pump;
pub mod reassembler;
pub mod sanitize;
pub mod trigger;
pub mod types;

pub use processor::{
    EarlyOutputLog, EarlyOutputProcessor, LoggingProcessor, StreamProcessor, EARLY_OUTPUT_CAP,
};
pub use pump::StreamPump;
pub use reassembler::{logical_lines, LineReassembler};
pub use sanitize::{sanitize_line, strip_ansi};
pub use trigger::{TriggerAction, TriggerWatcher, AUTH_PROMPT_PATTERN};
pub use types::{LogicalLine, StreamSource};
