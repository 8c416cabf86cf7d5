//! Fail-fast structural validation for loaded configs.

use super::Config;
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Check config structure and required values; the first problem wins.
pub fn validate(config: &Config) -> Result<()> {
    let defaults = config.defaults.effective();

    if defaults.port_range.len() != 2 {
        return Err(Error::Validation(format!(
            "defaults.port_range: expected exactly 2 values, got {}",
            defaults.port_range.len()
        )));
    }
    if defaults.port_range[0] >= defaults.port_range[1] {
        return Err(Error::Validation(format!(
            "defaults.port_range: expected min < max, got [{},{}]",
            defaults.port_range[0], defaults.port_range[1]
        )));
    }
    if defaults.port_range[1] > 65535 {
        return Err(Error::Validation(format!(
            "defaults.port_range: ports must be between 1 and 65535, got [{},{}]",
            defaults.port_range[0], defaults.port_range[1]
        )));
    }
    if defaults.bind.trim().is_empty() {
        return Err(Error::Validation(
            "defaults.bind: must not be empty".to_string(),
        ));
    }

    let mut seen_services = HashSet::with_capacity(config.services.len());
    for (i, svc) in config.services.iter().enumerate() {
        let service_name = svc.name.trim();
        if service_name.is_empty() {
            return Err(Error::Validation(format!(
                "services[{}].name: must not be empty",
                i
            )));
        }
        if !seen_services.insert(service_name.to_string()) {
            return Err(Error::Validation(format!(
                "services[{}].name: duplicate service name",
                service_name
            )));
        }

        for (env_name, env) in &svc.envs {
            if env_name.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "services[{}].envs: env key must not be empty",
                    service_name
                )));
            }

            let path = format!("services[{}].envs[{}]", service_name, env_name);
            if env.target_instance_id.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "{}.target_instance_id: must not be empty",
                    path
                )));
            }
            if env.remote_host.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "{}.remote_host: must not be empty",
                    path
                )));
            }
            if env.remote_port < 1 || env.remote_port > 65535 {
                return Err(Error::Validation(format!(
                    "{}.remote_port: must be between 1 and 65535",
                    path
                )));
            }
            if env.local_port > 65535 {
                return Err(Error::Validation(format!(
                    "{}.local_port: must be between 0 and 65535",
                    path
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Defaults, EnvConfig, Service};

    fn valid_config() -> Config {
        Config {
            defaults: Defaults::default(),
            services: vec![Service {
                name: "svc1".to_string(),
                envs: [(
                    "dev".to_string(),
                    EnvConfig {
                        target_instance_id: "i-0abc".to_string(),
                        remote_host: "db.internal".to_string(),
                        remote_port: 5432,
                        local_port: 0,
                    },
                )]
                .into_iter()
                .collect(),
            }],
        }
    }

    #[test]
    fn default_config_is_valid() {
        validate(&valid_config()).unwrap();
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn port_range_must_have_two_ascending_entries() {
        let mut config = valid_config();
        config.defaults.port_range = vec![5500];
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("expected exactly 2 values"));

        config.defaults.port_range = vec![6000, 5000];
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("expected min < max"));

        config.defaults.port_range = vec![5500, 70000];
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("between 1 and 65535"));
    }

    #[test]
    fn bind_must_not_be_empty() {
        let mut config = valid_config();
        config.defaults.bind = "  ".to_string();
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("defaults.bind"));
    }

    #[test]
    fn service_names_must_be_unique_and_non_empty() {
        let mut config = valid_config();
        config.services.push(config.services[0].clone());
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("duplicate service name"));

        let mut config = valid_config();
        config.services[0].name = String::new();
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("services[0].name"));
    }

    #[test]
    fn env_fields_are_validated_with_dotted_paths() {
        let mut config = valid_config();
        config.services[0].envs.get_mut("dev").unwrap().remote_port = 0;
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("services[svc1].envs[dev].remote_port"));

        let mut config = valid_config();
        config.services[0].envs.get_mut("dev").unwrap().local_port = 70000;
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("services[svc1].envs[dev].local_port"));

        let mut config = valid_config();
        config.services[0]
            .envs
            .get_mut("dev")
            .unwrap()
            .target_instance_id = String::new();
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("target_instance_id"));

        let mut config = valid_config();
        config.services[0].envs.get_mut("dev").unwrap().remote_host = String::new();
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("remote_host"));
    }
}
