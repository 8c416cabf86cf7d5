use super::parse_service_env_pair;
use dbx::error::Result;
use dbx::session::{SessionKey, SessionManager};

/// Subscriber buffer for `logs --follow`. Live output is lossy under
/// load; the historical tail is the authoritative record.
const FOLLOW_BUFFER: usize = 64;

pub async fn run_logs(
    manager: &SessionManager,
    key_arg: &str,
    lines: usize,
    follow: bool,
) -> Result<()> {
    let (service, env) = parse_service_env_pair(key_arg)?;
    let key = SessionKey::new(&service, &env);

    for line in manager.last_logs(&key, lines)? {
        println!("{}", line);
    }
    if !follow {
        return Ok(());
    }

    let (id, mut rx) = manager.subscribe_logs(&key, FOLLOW_BUFFER)?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown_tx.send(()).await.ok();
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = rx.recv() => match line {
                Some(line) => println!("{}", line),
                // Session removed; the stream is over.
                None => break,
            },
        }
    }

    manager.unsubscribe_logs(&key, id);
    Ok(())
}
