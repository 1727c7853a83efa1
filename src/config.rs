//! Configuration files for rehearse.
//!
//! The top-level entry points are [`parse_str`] and [`parse_file`]. A
//! configuration names a working directory and the commands to run there:
//!
//! ```toml
//! dir = "demo"                      # optional, defaults to the current directory
//!
//! exec = "php calculator.php"       # a single command ...
//! input = ["+", "3", "4"]           # ... with its input lines
//!
//! [[commands]]                      # ... or several (ignored if `exec` is set)
//! exec = "node script.js"
//! input = "first\nsecond"           # a string is split into lines
//!
//! [presentation]
//! prompt = "$"
//! min_type_delay = "100ms"
//! max_type_delay = "200ms"
//!
//! [probe]
//! timeouts = ["1s", "3s", "5s", "10s"]
//! ```
//!
//! A *prepared* configuration written by [`Config::to_toml`] has the same
//! shape plus a `stdout_byte_sizes` table on every command, which is reused
//! instead of probing again.

use crate::command::Command;
use crate::predictor::DEFAULT_TIMEOUTS;
use anyhow::{Context as _, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::Value;

/// How the live run looks to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Presentation {
    /// Shown before every command and once more at the end.
    pub prompt: String,
    /// Shortest pause after each typed character.
    #[serde(with = "duration_str")]
    pub min_type_delay: Duration,
    /// Longest pause after each typed character.
    #[serde(with = "duration_str")]
    pub max_type_delay: Duration,
    /// Pause between showing the prompt and typing the command.
    #[serde(with = "duration_str")]
    pub command_pause: Duration,
    /// Pause between delivering an input line and typing it on screen.
    #[serde(with = "duration_str")]
    pub input_pause: Duration,
    /// Pause after an input line has been typed.
    #[serde(with = "duration_str")]
    pub after_input_pause: Duration,
    /// Pause on the final prompt.
    #[serde(with = "duration_str")]
    pub closing_pause: Duration,
    /// Give up on a command whose output stalls this long mid-relay.
    /// Unset means wait indefinitely.
    #[serde(
        with = "option_duration_str",
        skip_serializing_if = "Option::is_none"
    )]
    pub relay_timeout: Option<Duration>,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            prompt: "\x1b[32m➜\x1b[0m \x1b[33mdemo\x1b[0m".to_string(),
            min_type_delay: Duration::from_millis(150),
            max_type_delay: Duration::from_millis(150),
            command_pause: Duration::from_secs(1),
            input_pause: Duration::from_millis(500),
            after_input_pause: Duration::from_millis(200),
            closing_pause: Duration::from_secs(2),
            relay_timeout: None,
        }
    }
}

impl Presentation {
    /// No pauses and no typing delay. Useful for tests and dry runs.
    pub fn instant() -> Self {
        Self {
            prompt: "$".to_string(),
            min_type_delay: Duration::ZERO,
            max_type_delay: Duration::ZERO,
            command_pause: Duration::ZERO,
            input_pause: Duration::ZERO,
            after_input_pause: Duration::ZERO,
            closing_pause: Duration::ZERO,
            relay_timeout: None,
        }
    }
}

/// How commands are probed for their byte-size tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSettings {
    /// Timeout ladder, shortest first.
    #[serde(with = "duration_list")]
    pub timeouts: Vec<Duration>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeouts: DEFAULT_TIMEOUTS.to_vec(),
        }
    }
}

/// A validated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Absolute working directory for every command.
    pub dir: PathBuf,
    pub commands: Vec<Command>,
    pub presentation: Presentation,
    pub probe: ProbeSettings,
}

impl Config {
    /// Run the commands in `dir` instead of the configured directory.
    pub fn set_dir(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.dir = resolve_dir(dir.as_ref())?;
        Ok(())
    }

    /// Serialise the configuration, including any computed byte-size tables.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize configuration")
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    dir: Option<PathBuf>,
    exec: Option<Value>,
    input: Option<Value>,
    stdout_byte_sizes: Option<Value>,
    commands: Option<Value>,
    #[serde(default)]
    presentation: Presentation,
    #[serde(default)]
    probe: ProbeSettings,
}

/// Parse a configuration from a string slice.
///
/// A relative `dir` is resolved against the current directory.
///
/// # Errors
///
/// Returns an error if the text is not valid TOML, if `dir` is not an
/// existing directory, or if any command entry is malformed. All malformed
/// command entries are reported together.
///
/// # Example
///
/// ```
/// use rehearse::parse_str;
///
/// let config = parse_str("exec = \"cat\"\ninput = [\"hello\"]\n").unwrap();
/// assert_eq!(config.commands.len(), 1);
/// assert_eq!(config.commands[0].input_lines(), ["hello"]);
/// ```
pub fn parse_str(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content).context("Configuration must be valid TOML")?;

    let dir = match &raw.dir {
        Some(dir) => resolve_dir(dir)?,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let shorthand = raw.exec.map(|exec| Shorthand {
        exec,
        input: raw.input,
        stdout_byte_sizes: raw.stdout_byte_sizes,
    });
    let entries = command_entries(shorthand, raw.commands)?;
    let mut commands = Vec::with_capacity(entries.len());
    let mut problems = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match parse_command(entry) {
            Ok(command) => commands.push(command),
            Err(err) => problems.push(format!("command {}: {err:#}", index + 1)),
        }
    }
    if !problems.is_empty() {
        bail!("Invalid commands:\n  - {}", problems.join("\n  - "));
    }

    validate_presentation(&raw.presentation)?;
    validate_probe(&raw.probe)?;

    Ok(Config {
        dir,
        commands,
        presentation: raw.presentation,
        probe: raw.probe,
    })
}

/// Parse a configuration from a file.
///
/// Reads the entire file into memory and delegates to [`parse_str`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    parse_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn resolve_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        bail!("Invalid path entered: '{}'", dir.display());
    }
    if !dir.is_dir() {
        bail!("Path must be a directory: '{}'", dir.display());
    }
    std::fs::canonicalize(dir).with_context(|| format!("Failed to resolve '{}'", dir.display()))
}

/// The single-command form: `exec`, `input` and `stdout_byte_sizes` at the
/// top level.
struct Shorthand {
    exec: Value,
    input: Option<Value>,
    stdout_byte_sizes: Option<Value>,
}

/// Normalise the `exec` shorthand and the `commands` list into one list of
/// command tables.
fn command_entries(shorthand: Option<Shorthand>, commands: Option<Value>) -> Result<Vec<Value>> {
    if let Some(shorthand) = shorthand {
        if commands.is_some() {
            tracing::warn!("Both 'exec' and 'commands' are set; skipping 'commands'");
        }
        let mut entry = toml::map::Map::new();
        entry.insert("exec".to_string(), shorthand.exec);
        if let Some(input) = shorthand.input {
            entry.insert("input".to_string(), input);
        }
        if let Some(sizes) = shorthand.stdout_byte_sizes {
            entry.insert("stdout_byte_sizes".to_string(), sizes);
        }
        return Ok(vec![Value::Table(entry)]);
    }

    match commands {
        Some(Value::Array(entries)) => Ok(entries),
        Some(other) => bail!("'commands' must be a list, found: {other}"),
        None => bail!("Did not find 'exec' or 'commands'"),
    }
}

fn parse_command(entry: &Value) -> Result<Command> {
    let table = entry
        .as_table()
        .ok_or_else(|| anyhow!("expected a table with an 'exec' key, found: {entry}"))?;

    if let Some(key) = table
        .keys()
        .find(|key| !matches!(key.as_str(), "exec" | "input" | "stdout_byte_sizes"))
    {
        bail!("unknown key '{key}'");
    }

    let exec = match table.get("exec") {
        Some(Value::String(exec)) => exec.clone(),
        Some(other) => bail!("'exec' must be a string, found {}: {other}", other.type_str()),
        None => bail!("'exec' is required"),
    };

    let input = match table.get("input") {
        None => Vec::new(),
        Some(Value::String(text)) => text.lines().map(str::to_string).collect(),
        Some(Value::Array(items)) => items.iter().map(stringify).collect(),
        Some(other) => vec![stringify(other)],
    };

    let command = Command::new(exec).with_input(input);
    match table.get("stdout_byte_sizes") {
        None => Ok(command),
        Some(value) => Ok(command.with_byte_sizes(byte_sizes(value)?)?),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn byte_sizes(value: &Value) -> Result<Vec<usize>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("'stdout_byte_sizes' must be a list of byte counts"))?;
    items
        .iter()
        .map(|item| {
            item.as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| anyhow!("invalid byte count in 'stdout_byte_sizes': {item}"))
        })
        .collect()
}

fn validate_presentation(presentation: &Presentation) -> Result<()> {
    if presentation.min_type_delay > presentation.max_type_delay {
        bail!("'min_type_delay' must not exceed 'max_type_delay'");
    }
    Ok(())
}

fn validate_probe(probe: &ProbeSettings) -> Result<()> {
    if probe.timeouts.is_empty() {
        bail!("'probe.timeouts' must not be empty");
    }
    if probe.timeouts.contains(&Duration::ZERO) {
        bail!("'probe.timeouts' must all be positive");
    }
    if probe.timeouts.windows(2).any(|pair| pair[0] > pair[1]) {
        bail!("'probe.timeouts' must be sorted shortest first");
    }
    Ok(())
}

/// Parse a duration string: `1s`, `500ms`, `1.5s`.
///
/// Durations are whole milliseconds so that [`format_duration`] writes them
/// back unchanged.
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms_str) = s.strip_suffix("ms") {
        let ms: u64 = ms_str
            .trim()
            .parse()
            .context("Invalid milliseconds value")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(s_str) = s.strip_suffix('s') {
        let (whole, fraction) = s_str.trim().split_once('.').unwrap_or((s_str.trim(), ""));
        if fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            bail!("Durations are limited to millisecond precision, got: {}", s);
        }
        let secs: u64 = whole.parse().context("Invalid seconds value")?;
        let millis: u64 = format!("{fraction:0<3}").parse().context("Invalid seconds value")?;
        secs.checked_mul(1000)
            .and_then(|ms| ms.checked_add(millis))
            .map(Duration::from_millis)
            .ok_or_else(|| anyhow!("Duration is too large: {}", s))
    } else {
        Err(anyhow!("Duration must end with 's' or 'ms', got: {}", s))
    }
}

fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

mod duration_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(|err| D::Error::custom(format!("{err:#}")))
    }
}

mod option_duration_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&format_duration(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| parse_duration(&text))
            .transpose()
            .map_err(|err| D::Error::custom(format!("{err:#}")))
    }
}

mod duration_list {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        durations: &[Duration],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(durations.iter().map(|d| format_duration(*d)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|text| parse_duration(text))
            .collect::<anyhow::Result<_>>()
            .map_err(|err| D::Error::custom(format!("{err:#}")))
    }
}
