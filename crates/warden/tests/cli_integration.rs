use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn warden(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_warden"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

fn write_config(dir: &Path, body: &str) {
    std::fs::write(dir.join("warden.toml"), body).unwrap();
}

#[test]
fn test_warden_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = warden(dir.path(), &["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_warden_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = warden(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fire"));
    assert!(stdout.contains("validate"));
}

#[test]
fn test_init_then_validate() {
    let dir = tempfile::tempdir().unwrap();
    assert!(warden(dir.path(), &["init"]).status.success());
    assert!(dir.path().join("warden.toml").exists());

    let output = warden(dir.path(), &["validate"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 hook(s) valid"));

    let output = warden(dir.path(), &["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("BeforeTool:"));
    assert!(stdout.contains("[project]"));
}

#[test]
fn test_validate_reports_rejected_hooks() {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[[hooks.BeforeTool]]
[[hooks.BeforeTool.hooks]]
type = "wasm"
command = "guard"
"#,
    );

    let output = warden(dir.path(), &["validate"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("unknown hook type 'wasm'"));
}

#[test]
fn test_fire_blocking_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[[hooks.BeforeTool]]
matcher = "shell"

[[hooks.BeforeTool.hooks]]
type = "command"
command = "echo 'no shell today' >&2; exit 2"
"#,
    );

    let output = warden(dir.path(), &["fire", "--event", "BeforeTool", "--tool", "shell"]);
    assert_eq!(output.status.code(), Some(2));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["final_output"]["decision"], "block");
    assert_eq!(result["final_output"]["reason"], "no shell today");

    let output = warden(dir.path(), &["fire", "--event", "BeforeTool", "--tool", "read_file"]);
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["success"], true);
    assert!(result.get("final_output").is_none());
}

#[test]
fn test_fire_with_payload_file() {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[[hooks.BeforeAgent]]
[[hooks.BeforeAgent.hooks]]
type = "command"
command = "echo '{\"hookSpecificOutput\":{\"additionalContext\":\"today is friday\"}}'"
"#,
    );
    std::fs::write(dir.path().join("payload.json"), r#"{"prompt": "plan my week"}"#).unwrap();

    let output = warden(
        dir.path(),
        &["fire", "--event", "BeforeAgent", "--payload", "payload.json"],
    );
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        result["final_output"]["hookSpecificOutput"]["additionalContext"],
        "today is friday"
    );
}

#[test]
fn test_fire_unknown_event_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = warden(dir.path(), &["fire", "--event", "PreToolUse"]);
    assert!(!output.status.success());
}
