mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::ConnectOverrides;
use dbx::session::SessionManager;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code for interrupt-driven shutdown.
const EXIT_INTERRUPTED: i32 = 130;

static CLEANUP_RAN: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let is_tui = matches!(cli.command, Commands::Ui);
    if let Err(e) = init_tracing(is_tui, cli.verbose) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    let manager = SessionManager::new();
    install_signal_cleanup(manager.clone(), cli.no_cleanup);

    if let Err(e) = run(cli, &manager).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, manager: &SessionManager) -> dbx::Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Connect {
            service,
            env,
            port,
            bind,
            profile,
            region,
        } => {
            commands::run_connect(
                manager,
                config_path,
                cli.verbose,
                &service,
                &env,
                ConnectOverrides {
                    port,
                    bind,
                    profile,
                    region,
                },
            )
            .await
        }
        Commands::Ls => commands::run_ls(manager),
        Commands::Logs { key, follow, lines } => {
            commands::run_logs(manager, &key, lines, follow).await
        }
        Commands::Stop { args, all } => commands::run_stop(manager, &args, all).await,
        Commands::Ui => {
            commands::run_ui(manager, config_path, cli.verbose).await?;
            // Sessions do not outlive the dashboard unless asked to.
            if !cli.no_cleanup {
                manager.stop_all().await?;
            }
            Ok(())
        }
        Commands::Version => {
            println!("dbx {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Stop every session exactly once on SIGINT/SIGTERM, then exit 130.
fn install_signal_cleanup(manager: SessionManager, no_cleanup: bool) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;

        if CLEANUP_RAN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if !no_cleanup {
                if let Err(e) = manager.stop_all().await {
                    eprintln!("cleanup failed: {}", e);
                }
            }
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let interrupt = signal(SignalKind::interrupt());
        let terminate = signal(SignalKind::terminate());

        match (interrupt, terminate) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(is_tui: bool, verbose: bool) -> anyhow::Result<()> {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if is_tui {
        // The dashboard owns the terminal; log to a file instead.
        let log_dir = dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".dbx")
            .join("logs");
        std::fs::create_dir_all(&log_dir)?;

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("tui.log"))?;

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
