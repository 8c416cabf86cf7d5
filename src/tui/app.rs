//! Dashboard state: panes, selection, follow mode, and the single live
//! log subscription.

use crate::config::{Config, Defaults, EnvConfig};
use crate::session::{SessionKey, SessionManager, SessionSnapshot, StartOptions};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Lines kept in the logs pane view buffer.
const LOG_VIEW_BUFFER: usize = 1000;

/// Buffer for the live subscription; the fan-out drops when it is full.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Targets,
    Sessions,
    Logs,
}

impl Pane {
    fn next(self) -> Pane {
        match self {
            Pane::Targets => Pane::Sessions,
            Pane::Sessions => Pane::Logs,
            Pane::Logs => Pane::Targets,
        }
    }
}

/// One connectable entry from the config.
#[derive(Debug, Clone)]
pub struct Target {
    pub service: String,
    pub env: String,
    pub key: SessionKey,
    pub env_cfg: EnvConfig,
}

/// Messages posted back to the event loop by one-shot tasks.
///
/// Log messages carry the app-level subscription token, not the
/// manager's per-session id: ids restart per session, so only the token
/// can tell a live stream from a superseded one.
#[derive(Debug)]
pub enum AppMsg {
    ActionResult { text: String, level: StatusLevel },
    LogLine { token: u64, line: String },
    LogClosed { token: u64 },
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

struct Subscription {
    key: SessionKey,
    /// Manager-side subscriber id, needed to unsubscribe.
    id: u64,
    /// App-side token identifying this subscription's message stream.
    token: u64,
}

pub struct App {
    manager: SessionManager,
    defaults: Defaults,

    pub targets: Vec<Target>,
    pub sessions: Vec<SessionSnapshot>,

    pub focused: Pane,
    pub target_selected: usize,
    pub session_selected: usize,
    /// Scroll offset from the bottom of the log view.
    pub log_scroll: usize,

    pub follow_logs: bool,
    subscription: Option<Subscription>,
    /// Key the logs pane is currently bound to.
    pub log_key: Option<SessionKey>,
    pub log_lines: VecDeque<String>,

    pub status: Option<StatusMessage>,

    pub terminal_width: u16,
    pub terminal_height: u16,

    next_token: u64,
    tx: mpsc::UnboundedSender<AppMsg>,
}

impl App {
    pub fn new(manager: SessionManager, config: &Config) -> (Self, mpsc::UnboundedReceiver<AppMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut targets: Vec<Target> = config
            .services
            .iter()
            .flat_map(|svc| {
                svc.envs.iter().map(|(env_name, env_cfg)| Target {
                    service: svc.name.clone(),
                    env: env_name.clone(),
                    key: SessionKey::new(&svc.name, env_name),
                    env_cfg: env_cfg.clone(),
                })
            })
            .collect();
        targets.sort_by(|a, b| a.key.cmp(&b.key));

        let status = if targets.is_empty() {
            Some(StatusMessage {
                text: "no configured targets found".to_string(),
                level: StatusLevel::Warning,
                expires_at: Instant::now() + Duration::from_secs(3600),
            })
        } else {
            None
        };

        let app = Self {
            manager,
            defaults: config.defaults.effective(),
            targets,
            sessions: Vec::new(),
            focused: Pane::Targets,
            target_selected: 0,
            session_selected: 0,
            log_scroll: 0,
            follow_logs: false,
            subscription: None,
            log_key: None,
            log_lines: VecDeque::new(),
            status,
            terminal_width: 80,
            terminal_height: 24,
            next_token: 0,
            tx,
        };

        (app, rx)
    }

    /// Periodic refresh: pull a fresh snapshot list and expire status.
    pub fn on_tick(&mut self) {
        self.sessions = self.manager.list();

        if !self.targets.is_empty() {
            self.target_selected = self.target_selected.min(self.targets.len() - 1);
        }
        self.session_selected = self
            .session_selected
            .min(self.sessions.len().saturating_sub(1));

        if let Some(ref status) = self.status {
            if Instant::now() >= status.expires_at {
                self.status = None;
            }
        }

        // The list may have shifted under the selection.
        self.sync_log_view();
    }

    pub fn on_resize(&mut self, width: u16, height: u16) {
        self.terminal_width = width;
        self.terminal_height = height;
    }

    /// Handle one key press. Returns false when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
            return false;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.quit();
                return false;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.move_selection(1);
                self.sync_log_view();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.move_selection(-1);
                self.sync_log_view();
            }
            KeyCode::Tab => {
                self.focused = self.focused.next();
                self.sync_log_view();
            }
            KeyCode::Char('c') => self.dispatch_connect(),
            KeyCode::Char('s') => self.dispatch_stop(),
            KeyCode::Char('S') => self.dispatch_stop_all(),
            KeyCode::Char('l') => self.toggle_follow(),
            _ => {}
        }

        true
    }

    /// Handle one message posted by a background task.
    pub fn handle_msg(&mut self, msg: AppMsg) {
        match msg {
            AppMsg::ActionResult { text, level } => self.set_status(text, level),
            AppMsg::LogLine { token, line } => {
                // Lines from a superseded subscription are discarded.
                if self.subscription.as_ref().is_some_and(|s| s.token == token) {
                    self.push_log_line(line);
                }
            }
            AppMsg::LogClosed { token } => {
                if self.subscription.as_ref().is_some_and(|s| s.token == token) {
                    self.subscription = None;
                    self.set_status("log stream ended".to_string(), StatusLevel::Info);
                }
            }
        }
    }

    /// Tear down the live subscription before leaving. Idempotent.
    pub fn quit(&mut self) {
        self.unsubscribe_current();
    }

    fn move_selection(&mut self, delta: i64) {
        match self.focused {
            Pane::Targets => {
                self.target_selected = step(self.target_selected, delta, self.targets.len());
            }
            Pane::Sessions => {
                self.session_selected = step(self.session_selected, delta, self.sessions.len());
            }
            Pane::Logs => {
                // j scrolls toward the newest line, k away from it.
                let max = self.log_lines.len();
                if delta > 0 {
                    self.log_scroll = self.log_scroll.saturating_sub(1);
                } else {
                    self.log_scroll = (self.log_scroll + 1).min(max.saturating_sub(1));
                }
            }
        }
    }

    /// The session key the focused pane implies for the log view.
    fn implied_key(&self) -> Option<SessionKey> {
        match self.focused {
            Pane::Targets => self.targets.get(self.target_selected).map(|t| t.key.clone()),
            Pane::Sessions => self
                .sessions
                .get(self.session_selected)
                .map(|s| s.key.clone()),
            Pane::Logs => self.log_key.clone(),
        }
    }

    /// Re-bind the log view to the currently implied key.
    ///
    /// At most one subscription is live at any time: a change of key
    /// first unsubscribes the old id, then subscribes the new key when
    /// follow mode is on.
    fn sync_log_view(&mut self) {
        let new_key = self.implied_key();
        if new_key == self.log_key && (self.subscription.is_some() || !self.follow_logs) {
            return;
        }

        if new_key != self.log_key {
            self.unsubscribe_current();
            self.log_lines.clear();
            self.log_scroll = 0;
            self.log_key = new_key;
        }

        if self.follow_logs && self.subscription.is_none() {
            self.try_subscribe();
        }
    }

    fn toggle_follow(&mut self) {
        self.follow_logs = !self.follow_logs;
        if self.follow_logs {
            self.sync_log_view();
            if self.subscription.is_none() {
                self.try_subscribe();
            }
        } else {
            self.unsubscribe_current();
        }
    }

    fn try_subscribe(&mut self) {
        let Some(key) = self.log_key.clone() else {
            return;
        };

        // No session for this key yet means nothing to follow.
        if let Ok((id, mut rx)) = self.manager.subscribe_logs(&key, SUBSCRIBER_BUFFER) {
            // Seed with history; live lines append from here on.
            self.log_lines = self
                .manager
                .last_logs(&key, LOG_VIEW_BUFFER)
                .unwrap_or_default()
                .into();
            self.log_scroll = 0;

            self.next_token += 1;
            let token = self.next_token;
            self.subscription = Some(Subscription { key, id, token });

            let tx = self.tx.clone();
            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    if tx.send(AppMsg::LogLine { token, line }).is_err() {
                        return;
                    }
                }
                let _ = tx.send(AppMsg::LogClosed { token });
            });
        }
    }

    fn unsubscribe_current(&mut self) {
        if let Some(sub) = self.subscription.take() {
            self.manager.unsubscribe_logs(&sub.key, sub.id);
        }
    }

    fn push_log_line(&mut self, line: String) {
        self.log_lines.push_back(line);
        while self.log_lines.len() > LOG_VIEW_BUFFER {
            self.log_lines.pop_front();
        }
    }

    fn dispatch_connect(&mut self) {
        let Some(target) = self.targets.get(self.target_selected).cloned() else {
            self.set_status("no target selected".to_string(), StatusLevel::Warning);
            return;
        };

        let configured_port = (target.env_cfg.local_port > 0).then_some(target.env_cfg.local_port as u16);
        let opts = StartOptions {
            service: target.service.clone(),
            env: target.env.clone(),
            bind: self.defaults.bind.clone(),
            local_port: configured_port,
            port_min: Some(self.defaults.port_range[0] as u16),
            port_max: Some(self.defaults.port_range[1] as u16),
            target_instance_id: target.env_cfg.target_instance_id.clone(),
            remote_host: target.env_cfg.remote_host.clone(),
            remote_port: target.env_cfg.remote_port as u16,
            region: self.defaults.region.clone(),
            profile: self.defaults.profile.clone(),
            startup_timeout: Some(Duration::from_secs(self.defaults.startup_timeout_seconds)),
        };

        self.set_status(format!("connecting {}...", target.key), StatusLevel::Info);

        let manager = self.manager.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let msg = match manager.start(opts).await {
                Ok(snapshot) => AppMsg::ActionResult {
                    text: format!("connected {} at {}", snapshot.key, snapshot.endpoint()),
                    level: StatusLevel::Success,
                },
                Err(e) => AppMsg::ActionResult {
                    text: e.to_string(),
                    level: StatusLevel::Error,
                },
            };
            let _ = tx.send(msg);
        });
    }

    fn dispatch_stop(&mut self) {
        let Some(session) = self.sessions.get(self.session_selected) else {
            self.set_status("no session selected".to_string(), StatusLevel::Warning);
            return;
        };
        let key = session.key.clone();

        self.set_status(format!("stopping {}...", key), StatusLevel::Info);

        let manager = self.manager.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let msg = match manager.stop(&key).await {
                Ok(()) => AppMsg::ActionResult {
                    text: format!("stopped {}", key),
                    level: StatusLevel::Success,
                },
                Err(e) => AppMsg::ActionResult {
                    text: e.to_string(),
                    level: StatusLevel::Error,
                },
            };
            let _ = tx.send(msg);
        });
    }

    fn dispatch_stop_all(&mut self) {
        self.set_status("stopping all sessions...".to_string(), StatusLevel::Info);

        let manager = self.manager.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let msg = match manager.stop_all().await {
                Ok(()) => AppMsg::ActionResult {
                    text: "stopped all sessions".to_string(),
                    level: StatusLevel::Success,
                },
                Err(e) => AppMsg::ActionResult {
                    text: e.to_string(),
                    level: StatusLevel::Error,
                },
            };
            let _ = tx.send(msg);
        });
    }

    fn set_status(&mut self, text: String, level: StatusLevel) {
        let ttl = match level {
            StatusLevel::Error => Duration::from_secs(8),
            _ => Duration::from_secs(4),
        };
        self.status = Some(StatusMessage {
            text,
            level,
            expires_at: Instant::now() + ttl,
        });
    }

    /// True when a session exists for the target key (any state).
    pub fn target_has_session(&self, key: &SessionKey) -> bool {
        self.sessions.iter().any(|s| &s.key == key)
    }

    #[cfg(test)]
    fn subscription_info(&self) -> Option<(SessionKey, u64)> {
        self.subscription.as_ref().map(|s| (s.key.clone(), s.token))
    }
}

fn step(current: usize, delta: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let max = len - 1;
    if delta > 0 {
        current.saturating_add(1).min(max)
    } else {
        current.saturating_sub(1)
    }
}
