#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const FAST: &str = r#"
[presentation]
prompt = "$"
min_type_delay = "0ms"
max_type_delay = "0ms"
command_pause = "0ms"
input_pause = "0ms"
after_input_pause = "0ms"
closing_pause = "0ms"
"#;

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let content = format!("dir = {:?}\n{body}\n{FAST}", dir.display().to_string());
    fs::write(&path, content).expect("Failed to write test config");
    path
}

fn rehearse(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rehearse"))
        .args(args)
        .output()
        .expect("Failed to execute rehearse")
}

#[test]
fn test_run_echo() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), r#"exec = "echo hello""#);

    let output = rehearse(&["run", "-c", config.to_str().unwrap()]);

    assert!(
        output.status.success(),
        "rehearse failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "$ echo hello\nhello\n$ \n"
    );
}

#[test]
fn test_run_interleaves_input() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("ask.sh"),
        "printf 'Name? '\nread name || exit 1\necho \"Hello, $name\"\nprintf 'Again? '\nread again || exit 1\necho \"bye\"\n",
    )
    .unwrap();
    let config = write_config(
        dir.path(),
        r#"
exec = "sh ask.sh"
input = ["Ada", "no"]
"#,
    );

    let output = rehearse(&["run", "-c", config.to_str().unwrap()]);

    assert!(
        output.status.success(),
        "rehearse failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "$ sh ask.sh\nName? Ada\nHello, Ada\nAgain? no\nbye\n$ \n"
    );
}

#[test]
fn test_run_reports_failures_but_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[[commands]]
exec = "exit 1"

[[commands]]
exec = "echo still-running"
"#,
    );

    let output = rehearse(&["run", "-c", config.to_str().unwrap()]);

    assert!(!output.status.success(), "rehearse should fail");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("still-running"), "got: {stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 2 command(s) failed"), "got: {stderr}");
}

#[test]
fn test_prepare_then_run_prepared() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
exec = 'while read line; do echo "got: $line"; done'
input = ["a", "b"]
"#,
    );
    let prepared = dir.path().join("prepared.toml");

    let output = rehearse(&[
        "prepare",
        "-c",
        config.to_str().unwrap(),
        "-o",
        prepared.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "prepare failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = fs::read_to_string(&prepared).unwrap();
    assert!(text.contains("stdout_byte_sizes = [0, 7]"), "got: {text}");

    let output = rehearse(&["run", "-c", prepared.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("a\ngot: a\nb\ngot: b\n"));
}

#[test]
fn test_prepare_hanging_command_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
exec = "sleep 30"

[probe]
timeouts = ["50ms", "100ms"]
"#,
    );

    let output = rehearse(&["prepare", "-c", config.to_str().unwrap()]);

    assert!(!output.status.success(), "prepare should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unable to prepare configuration"), "got: {stderr}");
    assert!(stderr.contains("`sleep 30`"), "got: {stderr}");
}

#[test]
fn test_dir_override() {
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    fs::write(other.path().join("note.txt"), "from other\n").unwrap();
    let config = write_config(dir.path(), r#"exec = "cat note.txt""#);

    let output = rehearse(&[
        "run",
        "-c",
        config.to_str().unwrap(),
        "-d",
        other.path().to_str().unwrap(),
    ]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("from other"));
}

#[test]
fn test_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), r#"commands = [{ input = "x" }]"#);

    let output = rehearse(&["run", "-c", config.to_str().unwrap()]);

    assert!(!output.status.success(), "rehearse should fail on bad config");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'exec' is required"), "got: {stderr}");
}
