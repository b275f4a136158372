//! Binary entry point tests
//!
//! Only paths that fail before any network call are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;

fn archiver(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("archiver").unwrap();
    cmd.env_clear().current_dir(dir.path());
    cmd
}

#[test]
fn test_help() {
    let dir = tempfile::tempdir().unwrap();

    archiver(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--check"));
}

#[test]
fn test_missing_subscription_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();

    archiver(&dir)
        .env("PROJECT_ID", "123456789012")
        .env("BUCKET_NAME", "orders-archive")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SUBSCRIPTION_NAME"));
}

#[test]
fn test_check_without_configuration_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();

    archiver(&dir)
        .arg("--check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing required environment variables"));
}

#[test]
fn test_invalid_max_messages_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();

    archiver(&dir)
        .env("PROJECT_ID", "123456789012")
        .env("SUBSCRIPTION_NAME", "orders")
        .env("BUCKET_NAME", "orders-archive")
        .env("MAX_MESSAGES", "0")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MAX_MESSAGES"));
}

#[test]
fn test_dotenv_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "PROJECT_ID=123456789012\nBUCKET_NAME=orders-archive\nMAX_MESSAGES=abc\n",
    )
    .unwrap();

    archiver(&dir)
        .env("SUBSCRIPTION_NAME", "orders")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MAX_MESSAGES"));
}

#[test]
fn test_dotenv_log_level_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "PROJECT_ID=123456789012\nSUBSCRIPTION_NAME=orders\nBUCKET_NAME=orders-archive\nLOG_LEVEL=loudest\n",
    )
    .unwrap();

    archiver(&dir)
        .arg("--check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("log level"));
}
