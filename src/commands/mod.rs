//! One module per CLI command.

mod connect;
mod logs;
mod ls;
mod stop;
mod ui;

pub use connect::{run_connect, ConnectOverrides};
pub use logs::run_logs;
pub use ls::run_ls;
pub use stop::run_stop;
pub use ui::run_ui;

use dbx::error::{Error, Result};
use dbx::session::{ManagerDefaults, SessionKey};
use std::path::Path;
use std::time::Duration;

/// Load, validate, and (with `--verbose`) report the config in use.
pub fn load_validated_config(path_override: Option<&Path>, verbose: bool) -> Result<dbx::config::Config> {
    let (config, path) = dbx::config::load_config(path_override)?;
    dbx::config::validate(&config)?;
    if verbose {
        eprintln!("using config: {}", path.display());
    }
    Ok(config)
}

/// Convert effective config defaults into manager fallbacks.
///
/// Expects a validated config, so the port range casts are in bounds.
pub fn manager_defaults(effective: &dbx::config::Defaults) -> ManagerDefaults {
    ManagerDefaults {
        port_min: effective.port_range[0] as u16,
        port_max: effective.port_range[1] as u16,
        startup_timeout: Duration::from_secs(effective.startup_timeout_seconds),
        stop_timeout: Duration::from_secs(effective.stop_timeout_seconds),
    }
}

/// Parse `<service>/<env>` into its parts.
pub fn parse_service_env_pair(value: &str) -> Result<(String, String)> {
    let trimmed = value.trim();
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() != 2 {
        return Err(Error::InvalidArgs(format!(
            "expected <service>/<env>, got {:?}",
            value
        )));
    }

    let service = parts[0].trim();
    let env = parts[1].trim();
    if service.is_empty() || env.is_empty() {
        return Err(Error::InvalidArgs(format!(
            "expected non-empty <service>/<env>, got {:?}",
            value
        )));
    }

    Ok((service.to_string(), env.to_string()))
}

/// Parse the key forms accepted by `stop`.
pub fn parse_session_key(args: &[String]) -> Result<SessionKey> {
    match args {
        [pair] => {
            let (service, env) = parse_service_env_pair(pair)?;
            Ok(SessionKey::new(&service, &env))
        }
        [service, env] => {
            let service = service.trim();
            let env = env.trim();
            if service.is_empty() || env.is_empty() {
                return Err(Error::InvalidArgs(
                    "service and env are required".to_string(),
                ));
            }
            Ok(SessionKey::new(service, env))
        }
        _ => Err(Error::InvalidArgs(
            "usage: dbx stop <service>/<env> | <service> <env> | --all".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_parsing() {
        assert_eq!(
            parse_service_env_pair("svc/dev").unwrap(),
            ("svc".to_string(), "dev".to_string())
        );
        assert_eq!(
            parse_service_env_pair(" svc / dev ").unwrap(),
            ("svc".to_string(), "dev".to_string())
        );
        assert!(parse_service_env_pair("svc").is_err());
        assert!(parse_service_env_pair("svc/dev/extra").is_err());
        assert!(parse_service_env_pair("/dev").is_err());
    }

    #[test]
    fn stop_arg_forms() {
        let one = parse_session_key(&["svc/dev".to_string()]).unwrap();
        assert_eq!(one.to_string(), "svc/dev");

        let two = parse_session_key(&["svc".to_string(), "dev".to_string()]).unwrap();
        assert_eq!(two.to_string(), "svc/dev");

        assert!(parse_session_key(&[]).is_err());
        assert!(parse_session_key(&["a".to_string(), "b".to_string(), "c".to_string()]).is_err());
    }
}
