//! Smoke tests -- verify the binary runs and its subcommands are wired.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("linesight")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Live manufacturing test-result dashboard"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("linesight")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("linesight"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "snapshot", "watch", "config"] {
        Command::cargo_bin("linesight")
            .unwrap()
            .args([sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_config_prints_defaults() {
    Command::cargo_bin("linesight")
        .unwrap()
        .env_remove("LINESIGHT_CONFIG")
        .args(["config", "--upstream", "http://line-api:9000"])
        .assert()
        .success()
        .stdout(predicates::str::contains("capacity = 50"))
        .stdout(predicates::str::contains("base_url = \"http://line-api:9000\""));
}

#[test]
fn test_config_rejects_bad_override() {
    Command::cargo_bin("linesight")
        .unwrap()
        .env_remove("LINESIGHT_CONFIG")
        .args(["config", "--live-url", "http://not-a-websocket"])
        .assert()
        .failure();
}

#[test]
fn test_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("linesight.toml");
    std::fs::write(&path, "[window]\ncapacity = 120\ntrend_points = 30\n").unwrap();

    Command::cargo_bin("linesight")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicates::str::contains("capacity = 120"))
        .stdout(predicates::str::contains("trend_points = 30"));
}
