//! Configuration model: global defaults plus per-service environments.

pub mod parser;
pub mod validation;

pub use parser::{load_config, resolve_config_path};
pub use validation::validate;

use serde::Deserialize;

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// Global settings applied to every session unless overridden.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub bind: String,
    #[serde(default)]
    pub port_range: Vec<u32>,
    #[serde(default)]
    pub startup_timeout_seconds: u64,
    #[serde(default)]
    pub stop_timeout_seconds: u64,
}

/// Environments grouped under one named service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub envs: std::collections::HashMap<String, EnvConfig>,
}

/// Per-environment forwarding target.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvConfig {
    #[serde(default)]
    pub target_instance_id: String,
    #[serde(default)]
    pub remote_host: String,
    #[serde(default)]
    pub remote_port: u32,
    /// 0 means unset; a port from the range is allocated instead.
    #[serde(default)]
    pub local_port: u32,
}

impl Defaults {
    /// Defaults with unset fields filled in with built-in values.
    pub fn effective(&self) -> Defaults {
        let mut merged = Defaults {
            region: String::new(),
            profile: String::new(),
            bind: "127.0.0.1".to_string(),
            port_range: vec![5500, 5999],
            startup_timeout_seconds: 15,
            stop_timeout_seconds: 5,
        };

        if !self.region.is_empty() {
            merged.region = self.region.clone();
        }
        if !self.profile.is_empty() {
            merged.profile = self.profile.clone();
        }
        if !self.bind.is_empty() {
            merged.bind = self.bind.clone();
        }
        if !self.port_range.is_empty() {
            merged.port_range = self.port_range.clone();
        }
        if self.startup_timeout_seconds != 0 {
            merged.startup_timeout_seconds = self.startup_timeout_seconds;
        }
        if self.stop_timeout_seconds != 0 {
            merged.stop_timeout_seconds = self.stop_timeout_seconds;
        }

        merged
    }
}

impl Config {
    /// Find the environment block for `service`/`env`.
    pub fn find_env(&self, service: &str, env: &str) -> crate::error::Result<&EnvConfig> {
        for svc in &self.services {
            if svc.name != service {
                continue;
            }
            return svc.envs.get(env).ok_or_else(|| {
                crate::error::Error::Config(format!(
                    "{}/{}: environment not found in config",
                    service, env
                ))
            });
        }
        Err(crate::error::Error::Config(format!(
            "{}/{}: service not found in config",
            service, env
        )))
    }
}
