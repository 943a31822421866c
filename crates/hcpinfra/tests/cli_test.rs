#![allow(deprecated)] // TODO: move cargo_bin to the cargo_bin_cmd! macro

use assert_cmd::Command;
use predicates::prelude::*;

fn hcpinfra() -> Command {
    let mut cmd = Command::cargo_bin("hcpinfra").unwrap();
    cmd.env_remove("HCPINFRA_LOCATION")
        .env_remove("HCPINFRA_CLOUD")
        .env_remove("HCPINFRA_LOG_FORMAT");
    cmd
}

#[test]
fn test_cli_help() {
    hcpinfra()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("create-iam"))
        .stdout(predicate::str::contains("destroy-iam"));
}

#[test]
fn test_cli_version() {
    hcpinfra()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("hcpinfra "));
}

#[test]
fn test_create_help() {
    hcpinfra()
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--base-domain"))
        .stdout(predicate::str::contains("--workload-identities-file"))
        .stdout(predicate::str::contains("--assign-custom-hcp-roles"));
}

#[test]
fn test_destroy_help() {
    hcpinfra()
        .args(["destroy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--preserve-resource-group"));
}

#[test]
fn test_create_requires_name() {
    hcpinfra()
        .args(["create", "--azure-creds", "creds.json", "--infra-id", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--name"));
}

#[test]
fn test_create_rejects_conflicting_identity_flags() {
    hcpinfra()
        .args([
            "create",
            "--azure-creds",
            "/nonexistent/creds.json",
            "--name",
            "demo",
            "--infra-id",
            "abc",
            "--base-domain",
            "example.com",
            "--oidc-issuer-url",
            "https://issuer",
            "--workload-identities-file",
            "wi.yaml",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn test_create_requires_identity_configuration() {
    hcpinfra()
        .args([
            "create",
            "--azure-creds",
            "/nonexistent/creds.json",
            "--name",
            "demo",
            "--infra-id",
            "abc",
            "--base-domain",
            "example.com",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "at least one identity configuration must be provided",
        ));
}

#[test]
fn test_create_rejects_malformed_tags() {
    hcpinfra()
        .args([
            "create",
            "--azure-creds",
            "creds.json",
            "--name",
            "demo",
            "--infra-id",
            "abc",
            "--base-domain",
            "example.com",
            "--resource-group-tags",
            "novalue",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn test_destroy_missing_credentials_file() {
    hcpinfra()
        .args([
            "destroy",
            "--azure-creds",
            "/nonexistent/creds.json",
            "--name",
            "demo",
            "--infra-id",
            "abc",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_unknown_cloud() {
    hcpinfra()
        .args([
            "destroy",
            "--azure-creds",
            "creds.json",
            "--cloud",
            "AzureMoonCloud",
            "--name",
            "demo",
            "--infra-id",
            "abc",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown cloud"));
}
