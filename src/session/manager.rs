//! The session supervisor: port reservation, spawning, readiness,
//! graceful and forceful stop, and process-wide cleanup.
//!
//! # Concurrency model
//!
//! One `parking_lot::RwLock` guards the session map; port selection and
//! every map mutation happen under the write lock, so two concurrent
//! starts can never pick the same port. Each session carries its own
//! locks for lifecycle state and log fan-out, and the lock order is
//! strictly manager-then-session. Background tasks (two log pumps and one
//! process-wait per session) hold only a `Weak` reference to the manager
//! plus the session key, so a removed session simply stops being found.

use super::command::build_port_forward_args;
use super::ports::{PortProbe, TcpProbe};
use super::process::{self, AwsCliSpawner, SessionSpawner};
use super::types::{Session, SessionKey, SessionSnapshot, SessionState};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_PORT_RANGE_MIN: u16 = 5500;
const DEFAULT_PORT_RANGE_MAX: u16 = 5999;
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Window granted after a forced kill for exit and port release.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Upper bound for one readiness probe attempt between state checks.
const READINESS_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Interval for state and port-release polling.
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Log lines attached to start failures.
const LOG_TAIL_LINES_ON_ERROR: usize = 20;

/// Parameters for starting one session.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub service: String,
    pub env: String,
    /// Local bind address; empty means `127.0.0.1`.
    pub bind: String,
    /// Explicit local port. Overrides the range and fails fast if taken.
    pub local_port: Option<u16>,
    pub port_min: Option<u16>,
    pub port_max: Option<u16>,
    pub target_instance_id: String,
    pub remote_host: String,
    pub remote_port: u16,
    pub region: String,
    pub profile: String,
    pub startup_timeout: Option<Duration>,
}

/// Configured fallbacks applied when `StartOptions` leaves a field unset.
#[derive(Debug, Clone, Copy)]
pub struct ManagerDefaults {
    pub port_min: u16,
    pub port_max: u16,
    pub startup_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for ManagerDefaults {
    fn default() -> Self {
        Self {
            port_min: DEFAULT_PORT_RANGE_MIN,
            port_max: DEFAULT_PORT_RANGE_MAX,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

struct ManagerInner {
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
    defaults: RwLock<ManagerDefaults>,
    probe: Arc<dyn PortProbe>,
    spawner: Arc<dyn SessionSpawner>,
}

/// Tracks active forwarding sessions and their lifecycle.
///
/// Cheap to clone; clones share the same supervisor state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sessions: RwLock::new(HashMap::new()),
                defaults: RwLock::new(ManagerDefaults::default()),
                probe: Arc::new(TcpProbe),
                spawner: Arc::new(AwsCliSpawner),
            }),
        }
    }

    /// Replace the port probe. Must be called before any session exists.
    pub fn with_probe(self, probe: Arc<dyn PortProbe>) -> Self {
        let inner = Arc::new(ManagerInner {
            sessions: RwLock::new(HashMap::new()),
            defaults: RwLock::new(*self.inner.defaults.read()),
            probe,
            spawner: self.inner.spawner.clone(),
        });
        Self { inner }
    }

    /// Replace the process spawner. Must be called before any session exists.
    pub fn with_spawner(self, spawner: Arc<dyn SessionSpawner>) -> Self {
        let inner = Arc::new(ManagerInner {
            sessions: RwLock::new(HashMap::new()),
            defaults: RwLock::new(*self.inner.defaults.read()),
            probe: self.inner.probe.clone(),
            spawner,
        });
        Self { inner }
    }

    /// Overwrite the configured fallbacks (port range and timeouts).
    pub fn set_defaults(&self, defaults: ManagerDefaults) {
        *self.inner.defaults.write() = defaults;
    }

    fn defaults(&self) -> ManagerDefaults {
        *self.inner.defaults.read()
    }

    /// Create and start one forwarding session, blocking until the local
    /// port is ready or startup fails.
    pub async fn start(&self, opts: StartOptions) -> Result<SessionSnapshot> {
        if opts.service.is_empty() || opts.env.is_empty() {
            return Err(Error::InvalidArgs(
                "service and env are required".to_string(),
            ));
        }
        if opts.target_instance_id.is_empty() || opts.remote_host.is_empty() || opts.remote_port == 0
        {
            return Err(Error::InvalidArgs(
                "target_instance_id, remote_host and remote_port are required".to_string(),
            ));
        }

        let key = SessionKey::new(&opts.service, &opts.env);
        let bind = if opts.bind.is_empty() {
            DEFAULT_BIND.to_string()
        } else {
            opts.bind.clone()
        };
        let startup_timeout = opts
            .startup_timeout
            .filter(|t| !t.is_zero())
            .unwrap_or_else(|| self.defaults().startup_timeout);

        // Existence check, port selection, and insertion share one write
        // lock: the reservation is atomic with the map update.
        let session = {
            let mut sessions = self.inner.sessions.write();
            if let Some(existing) = sessions.get(&key) {
                if existing.state() == SessionState::Stopped {
                    sessions.remove(&key);
                } else {
                    return Err(Error::SessionExists { key });
                }
            }

            let port = self.select_port_locked(&sessions, &key, &bind, &opts)?;
            tracing::debug!("allocated local port {}:{} for {}", bind, port, key);

            let session = Arc::new(Session::new(
                &opts.service,
                &opts.env,
                bind,
                port,
                opts.remote_host.clone(),
                opts.remote_port,
                opts.target_instance_id.clone(),
                opts.region.clone(),
                opts.profile.clone(),
            ));
            sessions.insert(key.clone(), session.clone());
            session
        };

        let args = build_port_forward_args(
            &opts.target_instance_id,
            &opts.remote_host,
            opts.remote_port,
            session.local_port,
            &opts.region,
            &opts.profile,
        );

        let mut child = match self.inner.spawner.spawn(&args) {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("failed to start aws command: {}", e);
                session.fail(reason.clone());
                let logs = session.last_logs(LOG_TAIL_LINES_ON_ERROR);
                self.remove_session(&key);
                return Err(Error::SpawnFailed { key, reason, logs });
            }
        };
        session.set_pid(child.id());
        tracing::info!(
            "started {} (pid={:?}) forwarding {}:{} -> {}:{}",
            key,
            child.id(),
            session.bind,
            session.local_port,
            opts.remote_host,
            opts.remote_port
        );

        let weak = Arc::downgrade(&self.inner);
        if let Some(stdout) = child.stdout.take() {
            spawn_log_pump(weak.clone(), key.clone(), BufReader::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_log_pump(weak.clone(), key.clone(), BufReader::new(stderr));
        }
        spawn_wait_task(weak, key.clone(), child, session.cancel_token());

        if let Err(start_err) = self.wait_until_ready(&session, startup_timeout).await {
            match self.stop(&key).await {
                Ok(()) => {}
                Err(e) if e.is_session_not_found() => {}
                Err(e) => {
                    tracing::warn!("cleanup after failed start of {} also failed: {}", key, e)
                }
            }
            return Err(start_err);
        }

        {
            let sessions = self.inner.sessions.read();
            match sessions.get(&key) {
                Some(current) => current.set_state(SessionState::Running),
                // The child died between the last probe and here.
                None => {
                    return Err(Error::ChildExitedBeforeReady {
                        key,
                        reason: "process exited before readiness".to_string(),
                        logs: session.last_logs(LOG_TAIL_LINES_ON_ERROR),
                    });
                }
            }
        }

        Ok(session.snapshot())
    }

    /// Request graceful shutdown, escalating to kill after the stop
    /// timeout, and confirm the local port was released.
    pub async fn stop(&self, key: &SessionKey) -> Result<()> {
        let (session, needs_interrupt) = {
            let mut sessions = self.inner.sessions.write();
            let Some(session) = sessions.get(key).cloned() else {
                return Err(Error::SessionNotFound(key.clone()));
            };

            match session.state() {
                SessionState::Stopped => {
                    sessions.remove(key);
                    session.close_subscribers();
                    return Ok(());
                }
                SessionState::Error => {
                    session.close_subscribers();
                    session.cancel();
                    sessions.remove(key);
                    return Ok(());
                }
                // Another stop is already in flight; wait for it instead
                // of sending a second interrupt.
                SessionState::Stopping => (session, false),
                _ => {
                    session.set_state(SessionState::Stopping);
                    (session, true)
                }
            }
        };

        let Some(pid) = session.pid() else {
            // No process was ever attached.
            self.remove_session(key);
            return Ok(());
        };

        if needs_interrupt {
            tracing::info!("stopping {} (pid={})", key, pid);
            process::interrupt_process(pid).map_err(|e| Error::Process {
                key: key.clone(),
                reason: format!("failed to interrupt process: {}", e),
            })?;
        }

        let stop_timeout = self.defaults().stop_timeout;
        if self
            .wait_for_state(key, SessionState::Stopped, stop_timeout)
            .await
        {
            return self
                .wait_until_port_released(key, &session.bind, session.local_port, stop_timeout)
                .await;
        }

        tracing::warn!("{} did not stop after interrupt, killing", key);
        process::kill_process(pid).map_err(|e| Error::Process {
            key: key.clone(),
            reason: format!("failed to kill process: {}", e),
        })?;
        // Belt and braces: the cancellation token reaches the child even
        // when pid signaling cannot.
        session.cancel();

        if !self.wait_for_state(key, SessionState::Stopped, KILL_WAIT).await {
            return Err(Error::StopTimeout { key: key.clone() });
        }
        self.wait_until_port_released(key, &session.bind, session.local_port, KILL_WAIT)
            .await
    }

    /// Stop every known session; joins failures other than not-found.
    pub async fn stop_all(&self) -> Result<()> {
        let mut keys: Vec<SessionKey> = self.inner.sessions.read().keys().cloned().collect();
        keys.sort();

        let mut errs = Vec::new();
        for key in keys {
            match self.stop(&key).await {
                Ok(()) => {}
                Err(e) if e.is_session_not_found() => {}
                Err(e) => errs.push(e),
            }
        }

        Error::join(errs)
    }

    /// Snapshots of every session, ordered by key for stable output.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.inner.sessions.read();
        let mut out: Vec<SessionSnapshot> = sessions.values().map(|s| s.snapshot()).collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Snapshot for one key, if present.
    pub fn get(&self, key: &SessionKey) -> Option<SessionSnapshot> {
        self.inner.sessions.read().get(key).map(|s| s.snapshot())
    }

    /// Tail of the session's ring buffer, oldest to newest.
    pub fn last_logs(&self, key: &SessionKey, n: usize) -> Result<Vec<String>> {
        let sessions = self.inner.sessions.read();
        let session = sessions
            .get(key)
            .ok_or_else(|| Error::SessionNotFound(key.clone()))?;
        Ok(session.last_logs(n))
    }

    /// Register a live log subscriber on a session.
    pub fn subscribe_logs(
        &self,
        key: &SessionKey,
        buffer: usize,
    ) -> Result<(u64, mpsc::Receiver<String>)> {
        let sessions = self.inner.sessions.read();
        let session = sessions
            .get(key)
            .ok_or_else(|| Error::SessionNotFound(key.clone()))?;
        Ok(session.subscribe_logs(buffer))
    }

    /// Drop a subscriber. Unknown sessions and ids are ignored so
    /// teardown races are harmless.
    pub fn unsubscribe_logs(&self, key: &SessionKey, id: u64) {
        let session = {
            let sessions = self.inner.sessions.read();
            sessions.get(key).cloned()
        };
        if let Some(session) = session {
            session.unsubscribe_logs(id);
        }
    }

    fn select_port_locked(
        &self,
        sessions: &HashMap<SessionKey, Arc<Session>>,
        key: &SessionKey,
        bind: &str,
        opts: &StartOptions,
    ) -> Result<u16> {
        if let Some(port) = opts.local_port.filter(|p| *p > 0) {
            if port_reserved_locked(sessions, bind, port) {
                return Err(Error::PortUnavailable {
                    key: key.clone(),
                    reason: format!("requested port {} already used by another session", port),
                });
            }
            self.inner
                .probe
                .available(bind, port)
                .map_err(|e| Error::PortUnavailable {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            return Ok(port);
        }

        let defaults = self.defaults();
        let min = opts.port_min.unwrap_or(defaults.port_min);
        let max = opts.port_max.unwrap_or(defaults.port_max);
        if min == 0 || min > max {
            return Err(Error::InvalidArgs(format!(
                "invalid port range {}-{}",
                min, max
            )));
        }

        // Deterministic ascending scan; first bindable port wins.
        for port in min..=max {
            if port_reserved_locked(sessions, bind, port) {
                continue;
            }
            if self.inner.probe.available(bind, port).is_ok() {
                return Ok(port);
            }
        }

        Err(Error::RangeExhausted {
            key: key.clone(),
            bind: bind.to_string(),
            min,
            max,
        })
    }

    async fn wait_until_ready(&self, session: &Arc<Session>, timeout: Duration) -> Result<()> {
        let key = &session.key;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ReadinessTimeout {
                    key: key.clone(),
                    logs: session.last_logs(LOG_TAIL_LINES_ON_ERROR),
                });
            }

            let interval = READINESS_PROBE_INTERVAL.min(remaining);
            if self
                .inner
                .probe
                .wait_for_port(&session.bind, session.local_port, interval)
                .await
                .is_ok()
            {
                return Ok(());
            }

            // Between probes, check whether the session died underneath us.
            let present = self.inner.sessions.read().contains_key(key);
            let state = session.state();
            if !present || state == SessionState::Stopped || state == SessionState::Error {
                let reason = session
                    .last_error()
                    .unwrap_or_else(|| "process exited before readiness".to_string());
                return Err(Error::ChildExitedBeforeReady {
                    key: key.clone(),
                    reason,
                    logs: session.last_logs(LOG_TAIL_LINES_ON_ERROR),
                });
            }
        }
    }

    /// Poll until the session reaches `desired` or the timeout elapses.
    /// A session gone from the map has observed its child exit, which
    /// counts as `Stopped`.
    async fn wait_for_state(
        &self,
        key: &SessionKey,
        desired: SessionState,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let state = {
                let sessions = self.inner.sessions.read();
                sessions.get(key).map(|s| s.state())
            };
            match state {
                None => return desired == SessionState::Stopped,
                Some(state) if state == desired => return true,
                Some(_) => {}
            }

            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(STATE_POLL_INTERVAL).await;
        }
    }

    async fn wait_until_port_released(
        &self,
        key: &SessionKey,
        bind: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<()> {
        if port == 0 {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.probe.available(bind, port).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::PortNotReleased {
                    key: key.clone(),
                    bind: bind.to_string(),
                    port,
                });
            }
            tokio::time::sleep(STATE_POLL_INTERVAL).await;
        }
    }

    /// Remove a session from the map, marking it stopped and closing its
    /// subscribers. Absent keys are fine.
    fn remove_session(&self, key: &SessionKey) {
        let mut sessions = self.inner.sessions.write();
        if let Some(session) = sessions.remove(key) {
            session.set_state(SessionState::Stopped);
            session.close_subscribers();
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn port_reserved_locked(
    sessions: &HashMap<SessionKey, Arc<Session>>,
    bind: &str,
    port: u16,
) -> bool {
    sessions
        .values()
        .any(|s| s.bind == bind && s.local_port == port && s.state() != SessionState::Stopped)
}

/// Scan one output stream line by line into the session's log buffer.
///
/// The session pointer is looked up per line and the map lock released
/// before appending, so the pump never holds the manager lock while
/// fanning out.
fn spawn_log_pump<R>(inner: Weak<ManagerInner>, key: SessionKey, reader: R)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(session) = lookup_session(&inner, &key) else {
                        return;
                    };
                    session.append_log(&line);
                }
                Ok(None) => return,
                Err(e) => {
                    if let Some(session) = lookup_session(&inner, &key) {
                        session.append_log(&format!("log stream error: {}", e));
                    }
                    return;
                }
            }
        }
    });
}

fn lookup_session(inner: &Weak<ManagerInner>, key: &SessionKey) -> Option<Arc<Session>> {
    let inner = inner.upgrade()?;
    let sessions = inner.sessions.read();
    sessions.get(key).cloned()
}

/// Reap the child and retire its session.
///
/// An operator-initiated stop removes the entry silently; an unexpected
/// exit is recorded in the log buffer first. Either way the subscribers
/// are closed and the entry leaves the map, releasing the reservation.
fn spawn_wait_task(
    inner: Weak<ManagerInner>,
    key: SessionKey,
    mut child: Child,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                child.wait().await
            }
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut sessions = inner.sessions.write();
        let Some(session) = sessions.get(&key).cloned() else {
            return;
        };

        if session.state() != SessionState::Stopping {
            match &status {
                Ok(s) if s.success() => session.append_log("process exited cleanly"),
                Ok(s) => session.append_log(&format!("process exited: {}", s)),
                Err(e) => session.append_log(&format!("process exited: {}", e)),
            }
            tracing::debug!("{} exited unexpectedly: {:?}", key, status);
        }

        session.set_state(SessionState::Stopped);
        session.close_subscribers();
        sessions.remove(&key);
    });
}
