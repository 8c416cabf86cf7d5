//! Session supervision: the manager, per-session records, port probing,
//! process control, and the child command builder.

pub mod command;
pub mod manager;
pub mod ports;
pub mod process;
pub mod ring;
pub mod types;

pub use command::build_port_forward_args;
pub use manager::{ManagerDefaults, SessionManager, StartOptions};
pub use ports::{PortProbe, TcpProbe};
pub use process::{AwsCliSpawner, SessionSpawner};
pub use ring::{RingBuffer, DEFAULT_RING_BUFFER_LINES};
pub use types::{format_uptime, Session, SessionKey, SessionSnapshot, SessionState};
