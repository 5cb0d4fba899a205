use assert_cmd::cargo;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

// Nothing here reaches the network: every case either stops before the
// transport is built or points the client at a closed local port.

const DEAD_API: &str = "http://127.0.0.1:9/api";

fn htb() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("htb"));
    cmd.env_remove("HTB_TOKEN")
        .env_remove("HTB_ENV_FILE")
        .env_remove("HTB_PROXY")
        .env_remove("RUST_LOG")
        .env("HTB_API_URL", DEAD_API);
    cmd
}

#[test]
fn no_command_prints_usage_and_succeeds() {
    htb()
        .assert()
        .success()
        .stdout(predicate::str::contains("machines|m [id]"))
        .stdout(predicate::str::contains("release|r"));
}

#[test]
fn unknown_command_prints_usage_and_succeeds() {
    htb()
        .arg("dance")
        .assert()
        .success()
        .stdout(predicate::str::contains("sherlocks|s"));
}

#[test]
fn incomplete_sherlock_flag_is_a_usage_error() {
    htb()
        .env("HTB_TOKEN", "dummy")
        .args(["sherlocks", "f", "12"])
        .assert()
        .code(64)
        .stderr(predicate::str::contains("flag submission needs"))
        .stderr(predicate::str::contains("usage: htb sherlocks|s"))
        .stderr(predicate::str::contains("failed").not());
}

#[test]
fn release_flag_without_value_is_a_usage_error() {
    htb()
        .env("HTB_TOKEN", "dummy")
        .args(["release", "f"])
        .assert()
        .code(64)
        .stderr(predicate::str::contains("release flag needs a flag"));
}

#[test]
fn missing_token_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    htb()
        .arg("--env-file")
        .arg(dir.path().join("absent.env"))
        .arg("machines")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("No API token found"));
}

#[test]
fn token_file_is_used_and_transport_failure_names_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join(".env");
    std::fs::write(&env_file, "token=from-file\n").unwrap();
    htb()
        .arg("--env-file")
        .arg(&env_file)
        .args(["--timeout", "2", "machines", "4"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("GET /machine/profile/4 failed"));
}
