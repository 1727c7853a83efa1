use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rehearse::{Config, Engine, SizePredictor, parse_file};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rehearse",
    about = "Replay scripted commands with typed input for terminal recordings",
    version
)]
struct Args {
    /// Increase log verbosity (-v, -vv, -vvv); logs go to stderr
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the configured commands live on stdout
    Run {
        #[command(flatten)]
        source: Source,

        /// Clear the screen before the first command
        #[arg(long)]
        clear: bool,
    },

    /// Compute byte-size tables and write a prepared configuration
    Prepare {
        #[command(flatten)]
        source: Source,

        /// Where to write the prepared configuration (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct Source {
    /// Configuration file, plain or prepared
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory to run the commands in; overrides the configuration file
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

impl Source {
    fn load(&self) -> Result<Config> {
        let mut config = parse_file(&self.config)?;
        if let Some(dir) = &self.dir {
            config.set_dir(dir)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.mode {
        Mode::Run { source, clear } => run(&source, clear).await,
        Mode::Prepare { source, output } => prepare(&source, output).await,
    }
}

async fn run(source: &Source, clear: bool) -> Result<()> {
    let mut config = source.load()?;
    let engine = Engine::new(&config);

    if clear {
        clear_screen()?;
    }

    let report = engine.run(&mut config.commands).await;
    if !report.success() {
        for (command, err) in report.failures() {
            tracing::error!(command, error = %err, "command failed");
        }
        bail!(
            "{} of {} command(s) failed",
            report.failures().count(),
            report.outcomes.len()
        );
    }
    Ok(())
}

async fn prepare(source: &Source, output: Option<PathBuf>) -> Result<()> {
    let mut config = source.load()?;
    let predictor = SizePredictor::with_probe(
        rehearse::ShellProbe::in_dir(&config.dir),
        config.probe.timeouts.clone(),
    );

    predictor
        .prepare_all(&mut config.commands)
        .await
        .context("Unable to prepare configuration")?;

    let prepared = config.to_toml()?;
    match output {
        Some(path) => std::fs::write(&path, prepared)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{prepared}"),
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn clear_screen() -> Result<()> {
    print!("\x1B[2J\x1B[1;1H");
    std::io::stdout().flush()?;
    Ok(())
}
