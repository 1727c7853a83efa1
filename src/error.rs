//! Error types for probing, prediction and live execution.

use crate::command::SizeTableMismatch;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single probe run.
///
/// A probe that merely runs out of time is not an error; it is reported as
/// [`ProbeResult::TimedOut`](crate::ProbeResult::TimedOut) so the ladder can
/// escalate.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The shell could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// Reading from or waiting on the child failed.
    #[error("i/o error while probing `{command}`: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

/// Errors raised while computing a byte-size table.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Every step of the timeout ladder expired for one prefix.
    #[error(
        "`{command}` did not finish with {prefix} input line(s) after waiting {:.2}s in total",
        waited.as_secs_f64()
    )]
    LadderExhausted {
        command: String,
        prefix: usize,
        waited: Duration,
    },

    /// A longer input prefix produced less output than a shorter one.
    #[error(
        "output of `{command}` shrank from {before} to {after} bytes when input line {line} was added; \
         its output is not a deterministic function of its input"
    )]
    NonDeterministicOutput {
        command: String,
        line: usize,
        before: usize,
        after: usize,
    },

    #[error(transparent)]
    Table(#[from] SizeTableMismatch),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Errors that fail one command during a live run.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The byte-size table could not be computed.
    #[error(transparent)]
    Predict(#[from] PredictError),

    /// The shell could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The child was spawned without one of its pipes.
    #[error("could not open {pipe} of `{command}`")]
    PipeUnavailable {
        command: String,
        pipe: &'static str,
    },

    /// stdout closed before the predicted number of bytes arrived.
    #[error(
        "`{command}` closed its output after {received} of {expected} bytes expected before input line {line}"
    )]
    StreamDesync {
        command: String,
        line: usize,
        expected: usize,
        received: usize,
    },

    /// No output arrived within the configured relay timeout.
    #[error(
        "`{command}` produced no output for {:.2}s after {received} of {expected} bytes expected before input line {line}",
        waited.as_secs_f64()
    )]
    Stalled {
        command: String,
        line: usize,
        expected: usize,
        received: usize,
        waited: Duration,
    },

    /// The command exited unsuccessfully.
    #[error("`{command}` exited with {}", describe_exit(*code))]
    ExitFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("i/o error while running `{command}`: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_exhausted_names_command_and_wait() {
        let err = PredictError::LadderExhausted {
            command: "sleep 100".into(),
            prefix: 0,
            waited: Duration::from_millis(1500),
        };
        let msg = err.to_string();
        assert!(msg.contains("`sleep 100`"), "got: {msg}");
        assert!(msg.contains("1.50s"), "got: {msg}");
    }

    #[test]
    fn test_exit_failure_without_code() {
        let err = ExecError::ExitFailure {
            command: "false".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_predict_error_converts_into_exec_error() {
        let err: ExecError = PredictError::NonDeterministicOutput {
            command: "date".into(),
            line: 1,
            before: 10,
            after: 4,
        }
        .into();
        assert!(matches!(err, ExecError::Predict(_)));
        assert!(err.to_string().contains("shrank from 10 to 4"));
    }
}
