use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbx", version)]
#[command(about = "Manage AWS SSM port-forwarding sessions")]
pub struct Cli {
    /// Path to config file (defaults to ~/.dbx/config.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Skip stopping sessions on exit
    #[arg(long, global = true)]
    pub no_cleanup: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a port-forward session
    Connect {
        /// Service name from the config
        service: String,
        /// Environment name under the service
        env: String,
        /// Local bind port override
        #[arg(long)]
        port: Option<u16>,
        /// Local bind address override
        #[arg(long)]
        bind: Option<String>,
        /// AWS profile override
        #[arg(long)]
        profile: Option<String>,
        /// AWS region override
        #[arg(long)]
        region: Option<String>,
    },
    /// List running sessions
    Ls,
    /// Show session logs
    Logs {
        /// Session key as <service>/<env>
        key: String,
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
        /// Number of lines to show from the end
        #[arg(long, default_value_t = 100)]
        lines: usize,
    },
    /// Stop session(s)
    Stop {
        /// <service>/<env> or <service> <env>
        args: Vec<String>,
        /// Stop all sessions
        #[arg(long)]
        all: bool,
    },
    /// Launch the interactive dashboard
    Ui,
    /// Print version information
    Version,
}
