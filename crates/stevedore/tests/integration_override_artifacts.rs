//! Override artifact persistence and the environment contract.
//!
//! Scenarios covered:
//! - After a compose-based up with features and a fresh user-data folder,
//!   exactly two override artifacts exist: one build override and one
//!   feature-injection override, both named with the identity embedded.
//! - Environment declared in the base spec is observable inside the
//!   running container exactly as computed.

mod support;

use assert_cmd::Command;
use serial_test::serial;
use support::{
    is_docker_available, parse_stdout_json, write_compose_config_with_feature,
    write_image_config,
};
use tempfile::TempDir;

fn run_down(workspace: &std::path::Path) {
    let mut cmd = Command::cargo_bin("stevedore").unwrap();
    let _ = cmd
        .arg("down")
        .arg("--workspace-folder")
        .arg(workspace)
        .output()
        .unwrap();
}

#[test]
#[serial]
fn test_compose_up_with_features_writes_two_artifacts() {
    if !is_docker_available() {
        eprintln!(
            "Skipping test_compose_up_with_features_writes_two_artifacts: Docker not available"
        );
        return;
    }

    let workspace = TempDir::new().unwrap();
    let user_data = TempDir::new().unwrap();
    write_compose_config_with_feature(workspace.path());

    let mut cmd = Command::cargo_bin("stevedore").unwrap();
    let output = cmd
        .arg("up")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .arg("--user-data-folder")
        .arg(user_data.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "compose up failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = parse_stdout_json(&output.stdout);
    assert_eq!(json["outcome"], "success");
    assert!(json["composeProjectName"]
        .as_str()
        .unwrap()
        .starts_with("stevedore-"));

    let overrides_dir = user_data.path().join("engine-overrides");
    let mut names: Vec<String> = std::fs::read_dir(&overrides_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();

    assert_eq!(names.len(), 2, "expected exactly two artifacts: {:?}", names);
    assert!(names.iter().any(|n| n.starts_with("docker-compose.build-")));
    assert!(names
        .iter()
        .any(|n| n.starts_with("docker-compose.containerFeatures-")));

    run_down(workspace.path());
}

#[test]
#[serial]
fn test_base_spec_env_observable_in_container() {
    if !is_docker_available() {
        eprintln!("Skipping test_base_spec_env_observable_in_container: Docker not available");
        return;
    }

    let workspace = TempDir::new().unwrap();
    let user_data = TempDir::new().unwrap();
    let dir = workspace.path().join(".devcontainer");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("devcontainer.json"),
        r#"{
            "image": "alpine:3.19",
            "containerEnv": { "JAVA_HOME": "/usr/lib/jvm/17" }
        }"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("stevedore").unwrap();
    let output = cmd
        .arg("up")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .arg("--user-data-folder")
        .arg(user_data.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let container_id = parse_stdout_json(&output.stdout)["containerId"]
        .as_str()
        .unwrap()
        .to_string();

    // The base-spec value with no feature/user override must arrive in the
    // container exactly as computed.
    let exec = std::process::Command::new("docker")
        .args(["exec", &container_id, "printenv", "JAVA_HOME"])
        .output()
        .unwrap();
    assert!(exec.status.success());
    assert_eq!(
        String::from_utf8_lossy(&exec.stdout).trim(),
        "/usr/lib/jvm/17"
    );

    run_down(workspace.path());
}

#[test]
#[serial]
fn test_image_only_up_writes_no_artifacts() {
    if !is_docker_available() {
        eprintln!("Skipping test_image_only_up_writes_no_artifacts: Docker not available");
        return;
    }

    let workspace = TempDir::new().unwrap();
    let user_data = TempDir::new().unwrap();
    write_image_config(workspace.path(), "alpine:3.19");

    let mut cmd = Command::cargo_bin("stevedore").unwrap();
    let output = cmd
        .arg("up")
        .arg("--workspace-folder")
        .arg(workspace.path())
        .arg("--user-data-folder")
        .arg(user_data.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let overrides_dir = user_data.path().join("engine-overrides");
    assert!(
        !overrides_dir.exists(),
        "image-only configs produce zero artifacts"
    );

    run_down(workspace.path());
}
