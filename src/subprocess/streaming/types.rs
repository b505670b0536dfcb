//! Core types for streaming infrastructure

use std::fmt;

/// Stream source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    /// Short tag prefixed to every logged line
    pub fn tag(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "out",
            StreamSource::Stderr => "err",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One cleaned line of subprocess output.
///
/// Only the reassembler constructs these, so a `LogicalLine` is always
/// non-empty, printable, free of escape sequences and has no leading
/// padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine(String);

impl LogicalLine {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for LogicalLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for LogicalLine {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
