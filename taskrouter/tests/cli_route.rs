//! CLI tests for `taskrouter` commands.
//!
//! Spawns the binary in a temp project and checks exit codes, printed JSON,
//! and the journal it leaves behind.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use taskrouter::exit_codes;
use taskrouter::io::config::{CommandConfig, RouterConfig, write_config};
use taskrouter::io::init::{InitOptions, RouterPaths, init_router};

fn taskrouter(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskrouter"))
        .current_dir(root)
        .env_remove("ROUTER_LOG_DIR")
        .env_remove("ROUTER_MAX_STEPS")
        .args(args)
        .output()
        .expect("run taskrouter")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn journal_types(root: &Path) -> Vec<String> {
    let raw = fs::read_to_string(root.join("docs").join("router_log.jsonl")).expect("journal");
    raw.lines()
        .map(|line| {
            let record: Value = serde_json::from_str(line).expect("record");
            record["type"].as_str().expect("type").to_string()
        })
        .collect()
}

/// Config whose invoker echoes the acknowledgment line of the guard preamble.
fn init_with_echo_invoker(root: &Path) {
    init_router(root, &InitOptions { force: false }).expect("init");
    let cfg = RouterConfig {
        invoker: CommandConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "sed -n 5p".to_string()],
        },
        ..RouterConfig::default()
    };
    write_config(&RouterPaths::new(root).config_path, &cfg).expect("write config");
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = taskrouter(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(".taskrouter/config.toml").is_file());
    assert!(temp.path().join("docs").is_dir());

    let second = taskrouter(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));

    let forced = taskrouter(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn done_task_finishes_without_invoking() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_router(temp.path(), &InitOptions { force: false }).expect("init");

    let output = taskrouter(
        temp.path(),
        &["route", "DONE\nShipped the page", "--workflow-id", "wf-cli"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let response = stdout_json(&output);
    assert_eq!(response["done"], true);
    assert_eq!(response["workflow_id"], "wf-cli");
    assert_eq!(response["message"], "Shipped the page");
    assert_eq!(journal_types(temp.path()), vec!["done"]);
    let changelog = fs::read_to_string(temp.path().join("docs/CHANGELOG.md")).expect("changelog");
    assert!(changelog.contains("Workflow wf-cli Completed"));
}

#[test]
fn unknown_agent_exits_with_unknown_agent_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_router(temp.path(), &InitOptions { force: false }).expect("init");

    let output = taskrouter(temp.path(), &["route", "Wizard: cast a spell"]);

    assert_eq!(output.status.code(), Some(exit_codes::UNKNOWN_AGENT));
    assert_eq!(stdout_json(&output)["forwarded"], false);
    assert_eq!(journal_types(temp.path()), vec!["unknown_agent"]);
}

#[test]
fn malformed_task_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_router(temp.path(), &InitOptions { force: false }).expect("init");

    let output = taskrouter(temp.path(), &["route", "just some words"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(output.stdout.is_empty());
    assert_eq!(journal_types(temp.path()), vec!["error"]);
}

#[cfg(unix)]
#[test]
fn routed_step_invokes_configured_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with_echo_invoker(temp.path());

    let output = taskrouter(temp.path(), &["route", "FileCreator: create index.html"]);

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let response = stdout_json(&output);
    assert_eq!(response["forwarded"], true);
    assert_eq!(response["agent"], "FileCreator");
    assert_eq!(journal_types(temp.path()), vec!["step", "agent_response"]);
    let trace =
        fs::read_to_string(temp.path().join("docs/build-summary.md")).expect("build summary");
    assert!(trace.contains("**FileCreator** -> create index.html"));
}

#[cfg(unix)]
#[test]
fn auto_loop_without_oracle_finishes_after_one_step() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_with_echo_invoker(temp.path());

    let output = taskrouter(
        temp.path(),
        &["route", "FileCreator: create index.html", "--auto-loop"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let response = stdout_json(&output);
    assert_eq!(response["done"], true);
    assert_eq!(response["step"], 1);
    assert_eq!(
        journal_types(temp.path()),
        vec!["step", "agent_response", "done"]
    );
}

#[test]
fn abort_prints_acknowledgment() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_router(temp.path(), &InitOptions { force: false }).expect("init");

    let output = taskrouter(temp.path(), &["abort", "wf-9"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let ack = stdout_json(&output);
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["status"], "aborted");
    assert_eq!(journal_types(temp.path()), vec!["aborted"]);
}

#[test]
fn agents_lists_roster() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = taskrouter(temp.path(), &["agents"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let listing = String::from_utf8_lossy(&output.stdout);
    assert_eq!(listing.lines().count(), 9);
    assert!(listing.contains("FileCreator\tfile-creator\tFile Ops Policy"));
}
