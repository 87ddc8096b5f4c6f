//! Integration tests for the binary's argument surface.
//!
//! These exercise the compiled `labelctl` binary for the paths that never
//! touch the kernel: help output and usage failures.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_every_subsystem() {
    Command::cargo_bin("labelctl")
        .expect("binary should build")
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("mgmt")
                .and(predicate::str::contains("map"))
                .and(predicate::str::contains("unlabeled"))
                .and(predicate::str::contains("cipso")),
        );
}

#[test]
fn a_bare_invocation_fails_with_usage_guidance() {
    Command::cargo_bin("labelctl")
        .expect("binary should build")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn an_unknown_subcommand_is_a_usage_error() {
    Command::cargo_bin("labelctl")
        .expect("binary should build")
        .arg("frobnicate")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn a_malformed_selector_is_rejected_before_any_kernel_contact() {
    Command::cargo_bin("labelctl")
        .expect("binary should build")
        .args(["map", "add", "--unlabeled", "--address", "999.1.2.3"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid"));
}
