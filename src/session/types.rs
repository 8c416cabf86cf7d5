//! Per-session records: identity, lifecycle state, log fan-out.

use super::ring::{RingBuffer, DEFAULT_RING_BUFFER_LINES};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a forwarding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Identifies a session by `service/env`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(service: &str, env: &str) -> Self {
        Self(format!("{}/{}", service, env))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable lifecycle fields, guarded together.
struct Lifecycle {
    state: SessionState,
    pid: Option<u32>,
    start_time: DateTime<Utc>,
    last_error: Option<String>,
}

struct SubscriberSet {
    senders: HashMap<u64, mpsc::Sender<String>>,
    next_id: u64,
}

/// One supervised tunnel process: identity, network parameters, state,
/// log buffer, and live subscribers.
///
/// The manager owns sessions exclusively; everything handed outward is a
/// [`SessionSnapshot`]. Lifecycle state and the subscriber set use
/// parking_lot locks and are never held across an await.
pub struct Session {
    pub key: SessionKey,
    pub service: String,
    pub env: String,

    pub bind: String,
    pub local_port: u16,

    pub remote_host: String,
    pub remote_port: u16,
    pub target_instance_id: String,
    pub region: String,
    pub profile: String,

    lifecycle: RwLock<Lifecycle>,
    cancel: CancellationToken,
    logs: RingBuffer,
    subscribers: Mutex<SubscriberSet>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        service: &str,
        env: &str,
        bind: String,
        local_port: u16,
        remote_host: String,
        remote_port: u16,
        target_instance_id: String,
        region: String,
        profile: String,
    ) -> Self {
        Self {
            key: SessionKey::new(service, env),
            service: service.to_string(),
            env: env.to_string(),
            bind,
            local_port,
            remote_host,
            remote_port,
            target_instance_id,
            region,
            profile,
            lifecycle: RwLock::new(Lifecycle {
                state: SessionState::Starting,
                pid: None,
                start_time: Utc::now(),
                last_error: None,
            }),
            cancel: CancellationToken::new(),
            logs: RingBuffer::new(DEFAULT_RING_BUFFER_LINES),
            subscribers: Mutex::new(SubscriberSet {
                senders: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.read().state
    }

    pub(super) fn set_state(&self, state: SessionState) {
        self.lifecycle.write().state = state;
    }

    pub fn pid(&self) -> Option<u32> {
        self.lifecycle.read().pid
    }

    pub(super) fn set_pid(&self, pid: Option<u32>) {
        self.lifecycle.write().pid = pid;
    }

    pub fn last_error(&self) -> Option<String> {
        self.lifecycle.read().last_error.clone()
    }

    pub(super) fn fail(&self, message: String) {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.state = SessionState::Error;
        lifecycle.last_error = Some(message);
    }

    pub(super) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(super) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Append a line to the ring buffer and broadcast it to subscribers.
    ///
    /// Fan-out is non-blocking: a subscriber with a full buffer loses the
    /// line, a subscriber whose receiver is gone is pruned.
    pub fn append_log(&self, line: &str) {
        self.logs.append(line);

        let mut subs = self.subscribers.lock();
        subs.senders.retain(|_, sender| {
            match sender.try_send(line.to_string()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Up to the last `n` log lines, oldest to newest.
    pub fn last_logs(&self, n: usize) -> Vec<String> {
        self.logs.last(n)
    }

    /// Register a live log subscriber with the given buffer size.
    ///
    /// A buffer of 0 is clamped to 1; fan-out never blocks on a slow
    /// reader, it drops.
    pub fn subscribe_logs(&self, buffer: usize) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let mut subs = self.subscribers.lock();
        subs.next_id += 1;
        let id = subs.next_id;
        subs.senders.insert(id, tx);

        (id, rx)
    }

    /// Drop one subscriber; its channel closes. Unknown ids are ignored.
    pub fn unsubscribe_logs(&self, id: u64) {
        self.subscribers.lock().senders.remove(&id);
    }

    /// Drop every subscriber, closing their channels.
    pub(super) fn close_subscribers(&self) {
        self.subscribers.lock().senders.clear();
    }

    #[cfg(test)]
    pub(super) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().senders.len()
    }

    /// By-value copy of the observable session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let lifecycle = self.lifecycle.read();
        let uptime = (Utc::now() - lifecycle.start_time)
            .to_std()
            .unwrap_or_default();

        SessionSnapshot {
            key: self.key.clone(),
            service: self.service.clone(),
            env: self.env.clone(),
            bind: self.bind.clone(),
            local_port: self.local_port,
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
            target_instance_id: self.target_instance_id.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            pid: lifecycle.pid,
            state: lifecycle.state,
            start_time: lifecycle.start_time,
            uptime,
            last_error: lifecycle.last_error.clone(),
        }
    }
}

/// Read-only copy of a session used by list output and callers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub service: String,
    pub env: String,
    pub bind: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub target_instance_id: String,
    pub region: String,
    pub profile: String,
    pub pid: Option<u32>,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    pub uptime: Duration,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// The `bind:port` endpoint string printed by `connect` and `ls`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.bind, self.local_port)
    }

    /// Compact uptime rendering: `4s`, `2m4s`, `1h2m4s`.
    pub fn uptime_display(&self) -> String {
        format_uptime(self.uptime)
    }
}

/// Render a duration as `4s`, `2m4s`, or `1h2m4s`, flooring at `0s`.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    if total == 0 {
        return "0s".to_string();
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
