//! Config loading, resolution, and validation against real files.

use dbx::config::{self, Config};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write test config");
    (dir, path)
}

const FULL_YAML: &str = r#"
defaults:
  region: us-east-1
  profile: staging
  bind: 127.0.0.1
  port_range: [5500, 5999]
  startup_timeout_seconds: 20
  stop_timeout_seconds: 7
services:
  - name: svc1
    envs:
      dev:
        target_instance_id: i-0abc
        remote_host: db.internal
        remote_port: 5432
        local_port: 55432
      qa:
        target_instance_id: i-0def
        remote_host: db-qa.internal
        remote_port: 5432
  - name: svc2
    envs:
      dev:
        target_instance_id: i-0ghi
        remote_host: cache.internal
        remote_port: 6379
"#;

#[test]
fn full_yaml_loads_and_validates() {
    let (_dir, path) = write_config("config.yml", FULL_YAML);

    let config = config::parser::load_config_file(&path).unwrap();
    config::validate(&config).unwrap();

    assert_eq!(config.services.len(), 2);
    let dev = config.find_env("svc1", "dev").unwrap();
    assert_eq!(dev.local_port, 55432);
    assert_eq!(dev.remote_host, "db.internal");

    let effective = config.defaults.effective();
    assert_eq!(effective.startup_timeout_seconds, 20);
    assert_eq!(effective.stop_timeout_seconds, 7);
}

#[test]
fn minimal_yaml_gets_builtin_defaults() {
    let (_dir, path) = write_config(
        "config.yaml",
        r#"
services:
  - name: svc1
    envs:
      dev:
        target_instance_id: i-0abc
        remote_host: db.internal
        remote_port: 5432
"#,
    );

    let config = config::parser::load_config_file(&path).unwrap();
    config::validate(&config).unwrap();

    let effective = config.defaults.effective();
    assert_eq!(effective.bind, "127.0.0.1");
    assert_eq!(effective.port_range, vec![5500, 5999]);
    assert_eq!(effective.startup_timeout_seconds, 15);
    assert_eq!(effective.stop_timeout_seconds, 5);
}

#[test]
fn json_config_loads() {
    let (_dir, path) = write_config(
        "config.json",
        r#"{
  "defaults": {"region": "eu-west-1"},
  "services": [
    {"name": "svc1", "envs": {"dev": {
      "target_instance_id": "i-0abc",
      "remote_host": "db.internal",
      "remote_port": 5432
    }}}
  ]
}"#,
    );

    let config = config::parser::load_config_file(&path).unwrap();
    config::validate(&config).unwrap();
    assert_eq!(config.defaults.region, "eu-west-1");
}

#[test]
fn invalid_remote_port_is_rejected_with_its_path() {
    let (_dir, path) = write_config(
        "config.yml",
        r#"
services:
  - name: svc1
    envs:
      dev:
        target_instance_id: i-0abc
        remote_host: db.internal
        remote_port: 0
"#,
    );

    let config = config::parser::load_config_file(&path).unwrap();
    let err = config::validate(&config).unwrap_err();
    assert!(err
        .to_string()
        .contains("services[svc1].envs[dev].remote_port"));
}

#[test]
fn local_port_above_range_is_rejected() {
    let (_dir, path) = write_config(
        "config.yml",
        r#"
services:
  - name: svc1
    envs:
      dev:
        target_instance_id: i-0abc
        remote_host: db.internal
        remote_port: 5432
        local_port: 70000
"#,
    );

    let config = config::parser::load_config_file(&path).unwrap();
    let err = config::validate(&config).unwrap_err();
    assert!(err
        .to_string()
        .contains("services[svc1].envs[dev].local_port"));
}

#[test]
fn malformed_yaml_is_a_config_error() {
    let (_dir, path) = write_config("config.yml", "services: [unclosed");
    let err = config::parser::load_config_file(&path).unwrap_err();
    assert!(err.to_string().contains("parse config"));
}

#[test]
fn explicit_path_override_wins() {
    let (_dir, path) = write_config("custom-name.yaml", FULL_YAML);
    let resolved = config::resolve_config_path(Some(&path)).unwrap();
    assert_eq!(resolved, path);
}

#[test]
fn missing_explicit_path_is_an_error() {
    let err = config::resolve_config_path(Some(std::path::Path::new(
        "/definitely/not/a/real/config.yml",
    )))
    .unwrap_err();
    assert!(err.to_string().contains("--config"));
}

#[test]
fn empty_config_validates_with_defaults() {
    let config = Config::default();
    config::validate(&config).unwrap();
}
