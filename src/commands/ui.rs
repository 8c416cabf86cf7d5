use super::{load_validated_config, manager_defaults};
use dbx::error::Result;
use dbx::session::SessionManager;
use std::path::Path;

pub async fn run_ui(
    manager: &SessionManager,
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let config = load_validated_config(config_path, verbose)?;
    manager.set_defaults(manager_defaults(&config.defaults.effective()));

    dbx::tui::run(manager.clone(), &config).await
}
