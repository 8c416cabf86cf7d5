//! # dbx
//!
//! Manage AWS SSM port-forwarding sessions from one controlling
//! terminal: start named tunnels, list them, stop one or all, and tail
//! their captured output.
//!
//! ## Architecture
//!
//! - [`session::SessionManager`] supervises one child process per
//!   session: it allocates a local port without collisions across
//!   concurrent starts, spawns the `aws ssm start-session` child in its
//!   own process group, bounds startup with a TCP readiness probe, and
//!   drives the stop path through interrupt, kill, and port-release
//!   confirmation.
//! - Each session captures stdout/stderr into a bounded ring buffer and
//!   fans lines out to live subscribers without ever blocking on a slow
//!   reader.
//! - [`tui`] is a single-threaded dashboard over the manager: periodic
//!   list refresh plus one live log subscription at a time.
//!
//! ## Quick start
//!
//! ```no_run
//! use dbx::session::{SessionManager, StartOptions};
//!
//! # async fn example() -> dbx::error::Result<()> {
//! let manager = SessionManager::new();
//! let snapshot = manager
//!     .start(StartOptions {
//!         service: "orders-db".to_string(),
//!         env: "dev".to_string(),
//!         target_instance_id: "i-0abc1234".to_string(),
//!         remote_host: "orders.cluster.internal".to_string(),
//!         remote_port: 5432,
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("listening on {}", snapshot.endpoint());
//! manager.stop(&snapshot.key).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod tui;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{SessionKey, SessionManager, SessionSnapshot, SessionState, StartOptions};
