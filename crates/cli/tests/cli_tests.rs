//! CLI integration tests

use std::process::Command;

fn kaasctl(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_kaasctl"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = kaasctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("KaaS application orchestrator"), "Should show app name");
    assert!(stdout.contains("create"), "Should show create command");
    assert!(stdout.contains("deploy-predefined"), "Should show deploy-predefined command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("list"), "Should show list command");
    assert!(stdout.contains("history"), "Should show history command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = kaasctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("kaasctl"), "Should show binary name");
}

#[test]
fn test_deploy_predefined_help() {
    let output = kaasctl(&["deploy-predefined", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--external"));
    assert!(stdout.contains("--cpu"));
    assert!(stdout.contains("--memory"));
    assert!(stdout.contains("--namespace"));
}

#[test]
fn test_status_requires_app_name() {
    let output = kaasctl(&["status"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("APP_NAME"));
}

#[test]
fn test_invalid_format_rejected() {
    let output = kaasctl(&["--format", "yaml", "list"]);

    assert!(!output.status.success());
}
