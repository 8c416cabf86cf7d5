//! Local TCP port probing: availability checks and readiness waits.
//!
//! Both operations are behind the [`PortProbe`] trait so tests can inject
//! deterministic behavior; [`TcpProbe`] is the real implementation used by
//! the session manager.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::TcpListener;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Interval between readiness dial attempts.
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Probes a local TCP endpoint for availability and readiness.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Check whether `bind:port` can currently be bound.
    ///
    /// A successful bind-and-drop implies availability at that instant
    /// only; the manager compensates for the race with its reservation
    /// set.
    fn available(&self, bind: &str, port: u16) -> Result<()>;

    /// Wait until a TCP connection to `bind:port` succeeds.
    ///
    /// The deadline is absolute: the final attempt is bounded by the
    /// remaining time, not a full poll interval.
    async fn wait_for_port(&self, bind: &str, port: u16, timeout: Duration) -> Result<()>;
}

/// Real TCP probe.
pub struct TcpProbe;

#[async_trait]
impl PortProbe for TcpProbe {
    fn available(&self, bind: &str, port: u16) -> Result<()> {
        if port == 0 {
            return Err(Error::InvalidArgs(format!("invalid port {}", port)));
        }

        let addr = format!("{}:{}", bind, port);
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                drop(listener);
                Ok(())
            }
            Err(e) => Err(Error::InvalidArgs(format!(
                "port {} not available on {}: {}",
                port, bind, e
            ))),
        }
    }

    async fn wait_for_port(&self, bind: &str, port: u16, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::InvalidArgs(format!(
                "invalid timeout {:?}",
                timeout
            )));
        }

        let addr = format!("{}:{}", bind, port);
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::InvalidArgs(format!(
                    "timed out waiting for {} after {:?}",
                    addr, timeout
                )));
            }

            let attempt = READINESS_POLL_INTERVAL.min(remaining);
            if let Ok(Ok(conn)) = tokio::time::timeout(attempt, TcpStream::connect(&addr)).await {
                drop(conn);
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(READINESS_POLL_INTERVAL.min(remaining)).await;
        }
    }
}
