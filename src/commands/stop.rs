use super::parse_session_key;
use dbx::error::{Error, Result};
use dbx::session::SessionManager;

pub async fn run_stop(manager: &SessionManager, args: &[String], all: bool) -> Result<()> {
    if all {
        if !args.is_empty() {
            return Err(Error::InvalidArgs(
                "--all does not accept positional args".to_string(),
            ));
        }
        manager.stop_all().await?;
        println!("stopped all sessions");
        return Ok(());
    }

    let key = parse_session_key(args)?;
    manager.stop(&key).await?;
    println!("stopped {}", key);
    Ok(())
}
