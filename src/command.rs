//! The [`Command`] model: one shell command, the lines typed into it, and the
//! byte-size table that says where each line lands in the command's output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Line terminator appended to every input line written to a child.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
/// Line terminator appended to every input line written to a child.
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// A byte-size table whose length does not match the number of input lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("byte-size table for `{command}` has {actual} entries, expected {expected}")]
pub struct SizeTableMismatch {
    pub command: String,
    pub expected: usize,
    pub actual: usize,
}

/// A shell command together with the lines scripted onto its stdin.
///
/// `stdout_byte_sizes[i]` is the number of stdout bytes the command writes
/// after line `i - 1` was delivered and before it asks for line `i`. The table
/// is computed by [`SizePredictor`](crate::SizePredictor) and cached here; it
/// is dropped whenever the input lines change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "exec")]
    command_line: String,
    #[serde(rename = "input", default)]
    input_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stdout_byte_sizes: Option<Vec<usize>>,
}

impl Command {
    /// Create a command without scripted input.
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            input_lines: Vec::new(),
            stdout_byte_sizes: None,
        }
    }

    /// Attach the lines to type into the command, in order.
    pub fn with_input<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_input_lines(lines.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a precomputed byte-size table.
    pub fn with_byte_sizes(mut self, sizes: Vec<usize>) -> Result<Self, SizeTableMismatch> {
        self.set_byte_sizes(sizes)?;
        Ok(self)
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn input_lines(&self) -> &[String] {
        &self.input_lines
    }

    /// The cached byte-size table, if it has been computed.
    pub fn byte_sizes(&self) -> Option<&[usize]> {
        self.stdout_byte_sizes.as_deref()
    }

    /// Replace the input lines. Any cached byte-size table is discarded.
    pub fn set_input_lines(&mut self, lines: Vec<String>) {
        self.input_lines = lines;
        self.stdout_byte_sizes = None;
    }

    /// Store a byte-size table, rejecting one of the wrong length.
    pub fn set_byte_sizes(&mut self, sizes: Vec<usize>) -> Result<(), SizeTableMismatch> {
        if sizes.len() != self.input_lines.len() {
            return Err(SizeTableMismatch {
                command: self.command_line.clone(),
                expected: self.input_lines.len(),
                actual: sizes.len(),
            });
        }
        self.stdout_byte_sizes = Some(sizes);
        Ok(())
    }

    /// Stdin payload holding the first `prefix` input lines, each terminated
    /// by [`LINE_ENDING`]. Prefix 0 means the command gets no stdin at all.
    pub fn stdin_payload(&self, prefix: usize) -> Option<String> {
        if prefix == 0 {
            return None;
        }
        let mut payload = String::new();
        for line in self.input_lines.iter().take(prefix) {
            payload.push_str(line);
            payload.push_str(LINE_ENDING);
        }
        Some(payload)
    }
}
