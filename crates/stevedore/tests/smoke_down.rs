//! Smoke tests for the down command.
//!
//! Down against an identity with no existing container is a no-op
//! success, never an error. The no-container case needs no engine state
//! but does probe the engine, so it is gated like the other smoke tests.

mod support;

use assert_cmd::Command;
use serial_test::serial;
use support::{is_docker_available, parse_stdout_json, write_image_config};
use tempfile::TempDir;

#[test]
#[serial]
fn test_down_without_containers_is_noop_success() {
    if !is_docker_available() {
        eprintln!("Skipping test_down_without_containers_is_noop_success: Docker not available");
        return;
    }

    let workspace = TempDir::new().unwrap();
    write_image_config(workspace.path(), "alpine:3.19");

    let mut cmd = Command::cargo_bin("stevedore").unwrap();
    let output = cmd
        .arg("down")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "down on absent identity must succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
#[serial]
fn test_down_is_idempotent_after_up() {
    if !is_docker_available() {
        eprintln!("Skipping test_down_is_idempotent_after_up: Docker not available");
        return;
    }

    let workspace = TempDir::new().unwrap();
    let user_data = TempDir::new().unwrap();
    write_image_config(workspace.path(), "alpine:3.19");

    let mut up_cmd = Command::cargo_bin("stevedore").unwrap();
    let up_output = up_cmd
        .arg("up")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .arg("--user-data-folder")
        .arg(user_data.path())
        .output()
        .unwrap();
    assert!(up_output.status.success());
    let container_id = parse_stdout_json(&up_output.stdout)["containerId"]
        .as_str()
        .unwrap()
        .to_string();

    // First down removes the container.
    let mut down_cmd = Command::cargo_bin("stevedore").unwrap();
    let down_output = down_cmd
        .arg("down")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .output()
        .unwrap();
    assert!(down_output.status.success());

    // The container is gone from the engine.
    let inspect = std::process::Command::new("docker")
        .args(["inspect", &container_id])
        .output()
        .unwrap();
    assert!(!inspect.status.success(), "container should be removed");

    // Second down is a no-op success.
    let mut second_down = Command::cargo_bin("stevedore").unwrap();
    let second_output = second_down
        .arg("down")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .output()
        .unwrap();
    assert!(second_output.status.success());
}
