//! Shared test utilities for stevedore CLI tests.

#![allow(dead_code)]

use std::path::Path;

/// Check whether a docker engine is available for engine-dependent tests.
pub fn is_docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Extract the single JSON document from stdout.
///
/// Stdout must carry exactly one JSON document per the output contract;
/// this helper tolerates surrounding whitespace only.
pub fn parse_stdout_json(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    serde_json::from_str(text.trim()).unwrap_or_else(|e| {
        panic!("stdout is not a single JSON document ({}):\n{}", e, text)
    })
}

/// Write a minimal image-based devcontainer config into a workspace.
pub fn write_image_config(workspace: &Path, image: &str) {
    let dir = workspace.join(".devcontainer");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("devcontainer.json"),
        format!(r#"{{ "image": "{}" }}"#, image),
    )
    .unwrap();
}

/// Write a compose-based config with one feature into a workspace.
/// Returns the config directory.
pub fn write_compose_config_with_feature(workspace: &Path) -> std::path::PathBuf {
    let dir = workspace.join(".devcontainer");
    std::fs::create_dir_all(&dir).unwrap();

    std::fs::write(
        dir.join("devcontainer.json"),
        r#"{
            "dockerComposeFile": "docker-compose.yml",
            "service": "app",
            "containerEnv": { "JAVA_HOME": "/usr/lib/jvm/17" },
            "features": { "hello": {} }
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("docker-compose.yml"),
        "services:\n  app:\n    image: alpine:3.19\n    command: [\"sleep\", \"infinity\"]\n",
    )
    .unwrap();

    let feature_dir = dir.join("features").join("hello");
    std::fs::create_dir_all(&feature_dir).unwrap();
    std::fs::write(
        feature_dir.join("feature.json"),
        r#"{ "id": "hello", "installCommand": "echo hello > /tmp/feature-hello" }"#,
    )
    .unwrap();

    dir
}
