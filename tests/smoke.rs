//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("behaviorsentry")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Behavioral anomaly detection and alerting engine",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("behaviorsentry")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("behaviorsentry"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("behaviorsentry")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_dashboard_subcommand_exists() {
    Command::cargo_bin("behaviorsentry")
        .unwrap()
        .args(["dashboard", "--help"])
        .assert()
        .success();
}

#[test]
fn test_alerts_resolve_subcommand_exists() {
    Command::cargo_bin("behaviorsentry")
        .unwrap()
        .args(["alerts", "resolve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_mitigations_remove_subcommand_exists() {
    Command::cargo_bin("behaviorsentry")
        .unwrap()
        .args(["mitigations", "remove", "--help"])
        .assert()
        .success();
}
