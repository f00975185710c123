//! Black-box CLI tests (§4.11): exercise `ah-agentd`'s configuration-
//! validation failure path, which exits before any socket is touched.

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

#[test]
fn missing_own_prefix_exits_nonzero_with_message() {
    let home = tempdir().unwrap();

    Command::cargo_bin("ah-agentd")
        .unwrap()
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("AH_OWN_PREFIX")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("configuration error"));
}

#[test]
fn prefix_without_leading_slash_is_rejected() {
    let home = tempdir().unwrap();

    Command::cargo_bin("ah-agentd")
        .unwrap()
        .arg("node-a")
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("AH_OWN_PREFIX")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("must be a non-empty NDN name"));
}
