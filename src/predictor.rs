//! Byte-size prediction: how much stdout a command writes before it asks for
//! each of its input lines.
//!
//! The command is re-run from scratch once per input prefix (no input, the
//! first line, the first two lines, ...). Under the assumption that output
//! size depends only on the input supplied so far, the growth in total output
//! between consecutive prefixes is exactly what the command prints between
//! consecutive reads.

use crate::command::Command;
use crate::error::PredictError;
use crate::ladder::TimeoutLadder;
use crate::probe::{Probe, ProbeResult, ShellProbe};
use std::path::PathBuf;
use std::time::Duration;

/// Default probe timeouts, shortest first.
pub const DEFAULT_TIMEOUTS: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Computes byte-size tables by probing commands.
pub struct SizePredictor<P = ShellProbe> {
    probe: P,
    timeouts: Vec<Duration>,
}

impl SizePredictor<ShellProbe> {
    /// Probe through the shell in `workdir` with the default timeouts.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self::with_probe(ShellProbe::in_dir(workdir), DEFAULT_TIMEOUTS.to_vec())
    }
}

impl<P: Probe> SizePredictor<P> {
    /// Probe with `probe`, escalating through `timeouts` (shortest first).
    pub fn with_probe(probe: P, timeouts: Vec<Duration>) -> Self {
        Self { probe, timeouts }
    }

    pub fn timeouts(&self) -> &[Duration] {
        &self.timeouts
    }

    /// Compute the byte-size table for `command` without caching it.
    pub async fn predict(&self, command: &Command) -> Result<Vec<usize>, PredictError> {
        let command_line = command.command_line();
        let line_count = command.input_lines().len();
        // A fresh ladder per command: start-up cost differs between commands.
        let mut ladder = TimeoutLadder::new(self.timeouts.clone());
        let mut sizes = Vec::with_capacity(line_count);
        let mut previous_total = 0;

        for prefix in 0..=line_count {
            let payload = command.stdin_payload(prefix);
            let climb = ladder
                .climb(|timeout| {
                    let payload = payload.as_deref();
                    async move {
                        let result = self.probe.run(command_line, payload, timeout).await?;
                        Ok::<_, PredictError>(match result {
                            ProbeResult::Completed {
                                stdout,
                                stderr,
                                exit_code,
                            } => {
                                if exit_code != Some(0) {
                                    let stderr = String::from_utf8_lossy(&stderr);
                                    tracing::debug!(
                                        command = command_line,
                                        prefix,
                                        ?exit_code,
                                        stderr = stderr.trim_end(),
                                        "probe exited unsuccessfully"
                                    );
                                }
                                Some(stdout.len())
                            }
                            ProbeResult::TimedOut => None,
                        })
                    }
                })
                .await?;

            let total = climb.map_err(|exhausted| PredictError::LadderExhausted {
                command: command_line.to_string(),
                prefix,
                waited: exhausted.waited,
            })?;

            let delta = total
                .checked_sub(previous_total)
                .ok_or_else(|| PredictError::NonDeterministicOutput {
                    command: command_line.to_string(),
                    line: prefix,
                    before: previous_total,
                    after: total,
                })?;

            // The last delta is what follows the final line; the live run
            // drains it without needing a boundary.
            if prefix < line_count {
                sizes.push(delta);
            }
            previous_total = total;
        }

        tracing::info!(command = command_line, ?sizes, "predicted byte sizes");
        Ok(sizes)
    }

    /// Return the cached table of `command`, computing and caching it first
    /// if needed.
    pub async fn prepare<'a>(&self, command: &'a mut Command) -> Result<&'a [usize], PredictError> {
        if command.byte_sizes().is_none() {
            let sizes = self.predict(command).await?;
            command.set_byte_sizes(sizes)?;
        }
        Ok(command.byte_sizes().unwrap_or_default())
    }

    /// Prepare every command, stopping at the first failure.
    pub async fn prepare_all(&self, commands: &mut [Command]) -> Result<(), PredictError> {
        for command in commands.iter_mut() {
            self.prepare(command).await?;
        }
        Ok(())
    }
}
