use crate::session::SessionKey;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

/// Render the recent-logs trailer appended to start failures.
fn log_trailer(logs: &[String]) -> String {
    if logs.is_empty() {
        String::new()
    } else {
        format!("\nrecent logs:\n{}", logs.join("\n"))
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(dbx::config::error),
        help("Check ~/.dbx/config.yml or pass an explicit path with --config")
    )]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(dbx::config::validation))]
    Validation(String),

    #[error("{0}")]
    InvalidArgs(String),

    #[error("{key}: session already exists")]
    #[diagnostic(
        code(dbx::session::exists),
        help("Stop the existing session first with `dbx stop {key}`")
    )]
    SessionExists { key: SessionKey },

    #[error("{0}: session not found")]
    #[diagnostic(
        code(dbx::session::not_found),
        help("List active sessions with `dbx ls`")
    )]
    SessionNotFound(SessionKey),

    #[error("{key}: failed to allocate local port: {reason}")]
    #[diagnostic(
        code(dbx::port::unavailable),
        help("Find what's using the port with: lsof -i :<port>")
    )]
    PortUnavailable { key: SessionKey, reason: String },

    #[error("{key}: failed to allocate local port: no free port available on {bind} in range {min}-{max}")]
    #[diagnostic(
        code(dbx::port::range_exhausted),
        help("Stop idle sessions or widen defaults.port_range in the config")
    )]
    RangeExhausted {
        key: SessionKey,
        bind: String,
        min: u16,
        max: u16,
    },

    #[error("{key}: failed to start session: {reason}{}", log_trailer(.logs))]
    #[diagnostic(
        code(dbx::session::spawn_failed),
        help("Check that the aws CLI is installed and on PATH")
    )]
    SpawnFailed {
        key: SessionKey,
        reason: String,
        logs: Vec<String>,
    },

    #[error("{key}: failed to start session: {reason}{}", log_trailer(.logs))]
    #[diagnostic(code(dbx::session::exited_before_ready))]
    ChildExitedBeforeReady {
        key: SessionKey,
        reason: String,
        logs: Vec<String>,
    },

    #[error("{key}: failed to start session: timed out waiting for local port readiness{}", log_trailer(.logs))]
    #[diagnostic(
        code(dbx::session::readiness_timeout),
        help("The tunnel may be slow to establish; raise defaults.startup_timeout_seconds")
    )]
    ReadinessTimeout { key: SessionKey, logs: Vec<String> },

    #[error("{key}: process stopped but local port {bind}:{port} is still in use")]
    #[diagnostic(code(dbx::port::not_released))]
    PortNotReleased {
        key: SessionKey,
        bind: String,
        port: u16,
    },

    #[error("{key}: session did not stop within timeout")]
    StopTimeout { key: SessionKey },

    #[error("{key}: {reason}")]
    Process { key: SessionKey, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<Error>),
}

impl Error {
    /// True for the not-found variant, which stop-all treats as benign.
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, Error::SessionNotFound(_))
    }

    /// Collapse a list of errors into zero, one, or a joined error.
    pub fn join(mut errs: Vec<Error>) -> Result<()> {
        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.remove(0)),
            _ => Err(Error::Multiple(errs)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
