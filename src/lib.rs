//! # Rehearse
//!
//! Replays scripted shell commands with typed input interleaved into their
//! output, so a terminal recorder can capture a realistic interactive session.
//!
//! The difficult part is deciding *when* each scripted line should be typed.
//! Rehearse answers that ahead of time: it runs each command once per input
//! prefix (no input, the first line, the first two lines, ...) and measures how
//! much stdout each prefix produces. The differences give a byte-size table:
//! the number of output bytes to show before every input line. The live run
//! then shows exactly that many bytes, writes the next line, types it on
//! screen, and repeats.
//!
//! This only works for commands whose output size is a deterministic function
//! of the input lines read so far.
//!
//! ## Quick start
//!
//! ```no_run
//! use rehearse::{Engine, parse_str};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = parse_str(r#"
//! exec = "python3 greet.py"
//! input = ["Ada", "yes"]
//! "#)?;
//!
//!     let engine = Engine::new(&config);
//!     let report = engine.run(&mut config.commands).await;
//!     if !report.success() {
//!         anyhow::bail!("some commands failed");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Preparing ahead of time
//!
//! Probing can take a while for slow-starting interpreters. Use
//! [`SizePredictor::prepare_all`] and [`Config::to_toml`] to store the
//! byte-size tables; loading the result with [`parse_file`] reuses them and
//! the live run starts immediately.
//!
//! ```no_run
//! use rehearse::{SizePredictor, parse_file};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = parse_file("config.toml")?;
//!     let predictor = SizePredictor::new(&config.dir);
//!     predictor.prepare_all(&mut config.commands).await?;
//!     std::fs::write("prepared.toml", config.to_toml()?)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom output handling
//!
//! [`Engine::new`] writes everything to stdout. Use [`Engine::with_handler`]
//! to redirect the live run to any sink:
//!
//! ```no_run
//! use rehearse::{Command, Engine, parse_str};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = parse_str(r#"exec = "echo hello""#)?;
//!
//!     let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
//!     let sink = captured.clone();
//!     let engine = Engine::with_handler(&config, move |data| {
//!         sink.lock().unwrap().extend_from_slice(data);
//!     });
//!
//!     let mut commands = vec![Command::new("echo hello")];
//!     engine.run(&mut commands).await;
//!     println!("{}", String::from_utf8_lossy(&captured.lock().unwrap()));
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ladder;
pub mod predictor;
pub mod probe;
pub(crate) mod process;

pub use command::{Command, LINE_ENDING, SizeTableMismatch};
pub use config::{Config, Presentation, ProbeSettings, parse_file, parse_str};
pub use engine::{CommandOutcome, Engine, OutputHandler, RunReport};
pub use error::{ExecError, PredictError, ProbeError};
pub use ladder::TimeoutLadder;
pub use predictor::{DEFAULT_TIMEOUTS, SizePredictor};
pub use probe::{Probe, ProbeResult, ShellProbe};
