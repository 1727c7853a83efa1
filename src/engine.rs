use crate::command::{Command, LINE_ENDING};
use crate::config::{Config, Presentation};
use crate::error::ExecError;
use crate::event::{self, Event};
use crate::predictor::SizePredictor;
use crate::probe::ShellProbe;
use crate::process::LiveProcess;
use rand::Rng;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Receives everything the live run shows: prompts, typed text and program
/// output.
pub type OutputHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// How one command of a live run ended.
#[derive(Debug)]
pub struct CommandOutcome {
    pub command: String,
    pub result: Result<(), ExecError>,
}

/// Result of a live run over a command list.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<CommandOutcome>,
}

impl RunReport {
    /// True only if every command exited successfully.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    /// The commands that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ExecError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            Ok(()) => None,
            Err(err) => Some((outcome.command.as_str(), err)),
        })
    }
}

/// Runs command lists live, interleaving program output with typed input
pub struct Engine {
    predictor: SizePredictor<ShellProbe>,
    workdir: PathBuf,
    presentation: Presentation,
    output_handler: OutputHandler,
}

impl Engine {
    /// Create an engine for `config` that writes everything to stdout
    pub fn new(config: &Config) -> Self {
        Self::with_handler(config, |data| {
            let mut stdout = io::stdout().lock();
            // A closed terminal is not worth failing the run over.
            let _ = stdout.write_all(data);
            let _ = stdout.flush();
        })
    }

    /// Create an engine for `config` that sends all output to `handler`
    pub fn with_handler<F>(config: &Config, handler: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        Engine {
            predictor: SizePredictor::with_probe(
                ShellProbe::in_dir(&config.dir),
                config.probe.timeouts.clone(),
            ),
            workdir: config.dir.clone(),
            presentation: config.presentation.clone(),
            output_handler: Arc::new(handler),
        }
    }

    pub fn predictor(&self) -> &SizePredictor<ShellProbe> {
        &self.predictor
    }

    /// Run every command in order.
    ///
    /// A failing command is recorded in the report and the run moves on to
    /// the next one. Missing byte-size tables are computed and cached first.
    pub async fn run(&self, commands: &mut [Command]) -> RunReport {
        let mut report = RunReport::default();

        for command in commands.iter_mut() {
            let result = self.run_command(command).await;
            if let Err(err) = &result {
                tracing::warn!(command = command.command_line(), error = %err, "command failed");
            }
            report.outcomes.push(CommandOutcome {
                command: command.command_line().to_string(),
                result,
            });
        }

        self.show_prompt();
        sleep(self.presentation.closing_pause).await;
        self.emit(LINE_ENDING.as_bytes());

        report
    }

    async fn run_command(&self, command: &mut Command) -> Result<(), ExecError> {
        // Predict before anything is shown so a bad command leaves no trace
        // in the recording.
        let sizes = self.predictor.prepare(command).await?.to_vec();

        self.show_prompt();
        sleep(self.presentation.command_pause).await;
        self.simulate_typing(
            command.command_line(),
            self.presentation.min_type_delay,
            self.presentation.max_type_delay,
        )
        .await;
        self.emit(LINE_ENDING.as_bytes());

        let mut process = LiveProcess::spawn(command.command_line(), Some(self.workdir.as_path()))?;
        for event in event::script(command, &sizes, &self.presentation) {
            self.execute_event(&mut process, command.command_line(), event)
                .await?;
        }

        let (status, stderr) = process.wait().await.map_err(|source| ExecError::Io {
            command: command.command_line().to_string(),
            source,
        })?;
        if status.success() {
            return Ok(());
        }

        self.emit(&stderr);
        Err(ExecError::ExitFailure {
            command: command.command_line().to_string(),
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Execute a single event against the running program
    async fn execute_event(
        &self,
        process: &mut LiveProcess,
        command_line: &str,
        event: Event,
    ) -> Result<(), ExecError> {
        let io_error = |source| ExecError::Io {
            command: command_line.to_string(),
            source,
        };

        match event {
            Event::Relay { line, bytes } => {
                self.relay(process, command_line, line, bytes).await?;
            }

            Event::Send(data) => {
                tracing::debug!(command = command_line, bytes = data.len(), "sending input");
                process.send(&data).await.map_err(io_error)?;
            }

            Event::TypeText {
                text,
                min_delay,
                max_delay,
            } => {
                self.simulate_typing(&text, min_delay, max_delay).await;
            }

            Event::Sleep(duration) => {
                sleep(duration).await;
            }

            Event::CloseInput => {
                process.close_input();
            }

            Event::Drain => {
                let mut buffer = [0u8; 4096];
                loop {
                    let n = process.read_chunk(&mut buffer).await.map_err(io_error)?;
                    if n == 0 {
                        break;
                    }
                    self.emit(&buffer[..n]);
                }
            }
        }

        Ok(())
    }

    /// Show exactly `expected` bytes of program output, blocking until they
    /// arrive. End of stream before that is a desync.
    async fn relay(
        &self,
        process: &mut LiveProcess,
        command_line: &str,
        line: usize,
        expected: usize,
    ) -> Result<(), ExecError> {
        let mut buffer = [0u8; 4096];
        let mut received = 0;

        while received < expected {
            let want = (expected - received).min(buffer.len());
            let read = process.read_chunk(&mut buffer[..want]);
            let n = match self.presentation.relay_timeout {
                Some(limit) => match tokio::time::timeout(limit, read).await {
                    Ok(n) => n,
                    Err(_) => {
                        return Err(ExecError::Stalled {
                            command: command_line.to_string(),
                            line,
                            expected,
                            received,
                            waited: limit,
                        });
                    }
                },
                None => read.await,
            }
            .map_err(|source| ExecError::Io {
                command: command_line.to_string(),
                source,
            })?;

            if n == 0 {
                return Err(ExecError::StreamDesync {
                    command: command_line.to_string(),
                    line,
                    expected,
                    received,
                });
            }
            self.emit(&buffer[..n]);
            received += n;
        }

        tracing::debug!(command = command_line, line, bytes = expected, "relayed output");
        Ok(())
    }

    /// Simulate realistic typing with character-by-character delays
    async fn simulate_typing(&self, text: &str, min_delay: Duration, max_delay: Duration) {
        let (low, high) = (
            min_delay.min(max_delay).as_millis(),
            min_delay.max(max_delay).as_millis(),
        );
        let mut utf8 = [0u8; 4];
        for ch in text.chars() {
            self.emit(ch.encode_utf8(&mut utf8).as_bytes());

            // Drop rng before the await so it does not cross the yield point.
            let delay_ms = {
                let mut rng = rand::thread_rng();
                rng.gen_range(low..=high)
            };
            if delay_ms > 0 {
                sleep(Duration::from_millis(delay_ms as u64)).await;
            }
        }
    }

    fn show_prompt(&self) {
        self.emit(self.presentation.prompt.as_bytes());
        self.emit(b" ");
    }

    fn emit(&self, data: &[u8]) {
        (self.output_handler)(data);
    }
}
