mod common;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_server_help() {
    Command::new(env!("CARGO_BIN_EXE_runas-server"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--keytab"))
        .stdout(predicate::str::contains("--mode"));
}

#[test]
fn test_client_help() {
    Command::new(env!("CARGO_BIN_EXE_runas-client"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--service-primary"))
        .stdout(predicate::str::contains("[DIR]"));
}

#[test]
fn test_server_refuses_to_start_without_mode() {
    let dir = tempfile::tempdir().unwrap();
    let keytab = common::write_keytab(dir.path(), "server.keytab", &[common::SERVER_PRINCIPAL]);

    Command::new(env!("CARGO_BIN_EXE_runas-server"))
        .env_remove("RUNAS_IMPERSONATION_MODE")
        .args(["--principal", common::SERVER_PRINCIPAL, "--port", "0"])
        .arg("--keytab")
        .arg(&keytab)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Impersonation mode is required"));
}

#[test]
fn test_server_rejects_unknown_mode() {
    Command::new(env!("CARGO_BIN_EXE_runas-server"))
        .args(["--mode", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sometimes"));
}

#[test]
fn test_client_reports_missing_keytab() {
    let dir = tempfile::tempdir().unwrap();

    Command::new(env!("CARGO_BIN_EXE_runas-client"))
        .env_remove("RUNAS_CLIENT_PRINCIPAL")
        .args(["--host", "127.0.0.1", "--service-primary", "runas", "--port", "1"])
        .arg("--keytab")
        .arg(dir.path().join("absent.keytab"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read keytab"));
}
