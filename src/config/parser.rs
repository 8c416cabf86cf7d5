//! Config file resolution and loading.
//!
//! Resolution order: explicit path, `$DBX_CONFIG`, then
//! `~/.dbx/config.yml`, `config.yaml`, `config.json` (first match).

use super::Config;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV_VAR: &str = "DBX_CONFIG";
const DEFAULT_CONFIG_NAMES: [&str; 3] = ["config.yml", "config.yaml", "config.json"];

/// Resolve the config path and load it. Returns the parsed config and
/// the path it came from (for `--verbose` reporting).
pub fn load_config(path_override: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = resolve_config_path(path_override)?;
    let config = load_config_file(&path)?;
    Ok((config, path))
}

/// Resolve which config file to use without reading it.
pub fn resolve_config_path(path_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = path_override {
        return ensure_config_path_exists(path)
            .map_err(|e| Error::Config(format!("config file from --config not found: {}", e)));
    }

    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV_VAR) {
        let env_path = env_path.trim();
        if !env_path.is_empty() {
            return ensure_config_path_exists(Path::new(env_path)).map_err(|e| {
                Error::Config(format!(
                    "config file from {} not found: {}",
                    CONFIG_PATH_ENV_VAR, e
                ))
            });
        }
    }

    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("could not resolve home directory".to_string()))?;
    let default_dir = home.join(".dbx");

    let mut checked = Vec::with_capacity(DEFAULT_CONFIG_NAMES.len());
    for name in DEFAULT_CONFIG_NAMES {
        let candidate = default_dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        checked.push(candidate.display().to_string());
    }

    Err(Error::Config(format!(
        "config file not found; checked: {}",
        checked.join(", ")
    )))
}

/// Parse one config file, choosing the format by extension.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("read config {:?}: {}", path, e)))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("parse config {:?}: {}", path, e)))
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse config {:?}: {}", path, e)))
    }
}

fn ensure_config_path_exists(path: &Path) -> std::io::Result<PathBuf> {
    let meta = fs::metadata(path)?;
    if meta.is_dir() {
        return Err(std::io::Error::other(format!("{:?} is a directory", path)));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            r#"
defaults:
  region: us-east-1
  port_range: [5500, 5999]
services:
  - name: svc1
    envs:
      dev:
        target_instance_id: i-0abc
        remote_host: db.internal
        remote_port: 5432
        local_port: 55432
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.defaults.region, "us-east-1");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].envs["dev"].local_port, 55432);
    }

    #[test]
    fn json_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
  "defaults": {"bind": "127.0.0.1"},
  "services": [
    {"name": "svc1", "envs": {"dev": {
      "target_instance_id": "i-0abc",
      "remote_host": "db.internal",
      "remote_port": 5432
    }}}
  ]
}"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.services[0].envs["dev"].remote_port, 5432);
        assert_eq!(config.services[0].envs["dev"].local_port, 0);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = resolve_config_path(Some(Path::new("/definitely/not/here.yml"))).unwrap_err();
        assert!(err.to_string().contains("--config"));
    }

    #[test]
    fn explicit_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_config_path(Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("directory"));
    }
}
