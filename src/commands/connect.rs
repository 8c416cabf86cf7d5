use super::{load_validated_config, manager_defaults};
use dbx::error::Result;
use dbx::session::{SessionManager, StartOptions};
use std::path::Path;
use std::time::Duration;

/// Optional flag overrides for `connect`.
#[derive(Debug, Default)]
pub struct ConnectOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub profile: Option<String>,
    pub region: Option<String>,
}

pub async fn run_connect(
    manager: &SessionManager,
    config_path: Option<&Path>,
    verbose: bool,
    service: &str,
    env: &str,
    overrides: ConnectOverrides,
) -> Result<()> {
    let config = load_validated_config(config_path, verbose)?;
    let defaults = config.defaults.effective();
    manager.set_defaults(manager_defaults(&defaults));

    let env_cfg = config.find_env(service, env)?;

    // Precedence: flag override, then the env's configured local_port,
    // then a port from the range.
    let configured_port = (env_cfg.local_port > 0).then_some(env_cfg.local_port as u16);

    let opts = StartOptions {
        service: service.to_string(),
        env: env.to_string(),
        bind: overrides.bind.unwrap_or_else(|| defaults.bind.clone()),
        local_port: overrides.port.or(configured_port),
        port_min: Some(defaults.port_range[0] as u16),
        port_max: Some(defaults.port_range[1] as u16),
        target_instance_id: env_cfg.target_instance_id.clone(),
        remote_host: env_cfg.remote_host.clone(),
        remote_port: env_cfg.remote_port as u16,
        region: overrides.region.unwrap_or_else(|| defaults.region.clone()),
        profile: overrides
            .profile
            .unwrap_or_else(|| defaults.profile.clone()),
        startup_timeout: Some(Duration::from_secs(defaults.startup_timeout_seconds)),
    };

    let snapshot = manager.start(opts).await?;

    println!("service={} env={}", snapshot.service, snapshot.env);
    println!("remote={}:{}", snapshot.remote_host, snapshot.remote_port);
    println!("ENDPOINT={}", snapshot.endpoint());

    Ok(())
}
