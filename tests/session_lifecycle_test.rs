//! End-to-end lifecycle tests driving the session manager with stub
//! probes and real (local) child processes.

use async_trait::async_trait;
use dbx::error::{Error, Result};
use dbx::session::{
    ManagerDefaults, PortProbe, SessionKey, SessionManager, SessionSpawner, SessionState,
    StartOptions,
};
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Probe that reports every port free and every readiness wait done.
struct AlwaysReadyProbe;

#[async_trait]
impl PortProbe for AlwaysReadyProbe {
    fn available(&self, _bind: &str, _port: u16) -> Result<()> {
        Ok(())
    }

    async fn wait_for_port(&self, _bind: &str, _port: u16, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Probe whose readiness wait never succeeds.
struct NeverReadyProbe;

#[async_trait]
impl PortProbe for NeverReadyProbe {
    fn available(&self, _bind: &str, _port: u16) -> Result<()> {
        Ok(())
    }

    async fn wait_for_port(&self, _bind: &str, _port: u16, timeout: Duration) -> Result<()> {
        tokio::time::sleep(timeout).await;
        Err(Error::InvalidArgs("not ready".to_string()))
    }
}

/// Probe that grants the first availability check (allocation) and then
/// reports the port busy forever, simulating a descendant that never
/// lets go of the listener.
struct StickyPortProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl PortProbe for StickyPortProbe {
    fn available(&self, _bind: &str, port: u16) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(())
        } else {
            Err(Error::InvalidArgs(format!("port {} busy", port)))
        }
    }

    async fn wait_for_port(&self, _bind: &str, _port: u16, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

fn spawn_shell(script: &str) -> io::Result<Child> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

/// Long-lived child, the happy path stand-in for the tunnel process.
struct SleepSpawner;

impl SessionSpawner for SleepSpawner {
    fn spawn(&self, _args: &[String]) -> io::Result<Child> {
        spawn_shell("sleep 30")
    }
}

/// Child that prints a line and keeps running.
struct EchoThenSleepSpawner;

impl SessionSpawner for EchoThenSleepSpawner {
    fn spawn(&self, _args: &[String]) -> io::Result<Child> {
        spawn_shell("echo boom; sleep 30")
    }
}

/// Child that dies immediately.
struct ExitSpawner;

impl SessionSpawner for ExitSpawner {
    fn spawn(&self, _args: &[String]) -> io::Result<Child> {
        spawn_shell("exit 1")
    }
}

fn opts(service: &str, env: &str) -> StartOptions {
    StartOptions {
        service: service.to_string(),
        env: env.to_string(),
        target_instance_id: "i-0abc".to_string(),
        remote_host: "db.internal".to_string(),
        remote_port: 5432,
        ..Default::default()
    }
}

fn fast_defaults() -> ManagerDefaults {
    ManagerDefaults {
        startup_timeout: Duration::from_millis(500),
        stop_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

#[tokio::test]
#[cfg(unix)]
async fn start_stop_roundtrip() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    let snapshot = manager.start(opts("svc", "dev")).await.unwrap();
    assert_eq!(snapshot.state, SessionState::Running);
    assert_eq!(snapshot.key.to_string(), "svc/dev");
    assert!((5500..=5999).contains(&snapshot.local_port));
    assert!(snapshot.pid.is_some());
    assert_eq!(manager.list().len(), 1);

    manager.stop(&snapshot.key).await.unwrap();
    assert!(manager.list().is_empty());
    assert!(manager.get(&snapshot.key).is_none());
}

#[tokio::test]
#[cfg(unix)]
async fn restart_same_key_after_stop() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    let first = manager.start(opts("svc", "dev")).await.unwrap();
    manager.stop(&first.key).await.unwrap();

    let second = manager.start(opts("svc", "dev")).await.unwrap();
    assert_eq!(second.state, SessionState::Running);
    manager.stop(&second.key).await.unwrap();
}

#[tokio::test]
#[cfg(unix)]
async fn duplicate_start_is_rejected() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    let snapshot = manager.start(opts("svc1", "dev")).await.unwrap();

    let err = manager
        .start(StartOptions {
            local_port: Some(55499),
            ..opts("svc1", "dev")
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "svc1/dev: session already exists");

    manager.stop(&snapshot.key).await.unwrap();
}

#[tokio::test]
#[cfg(unix)]
async fn stop_is_idempotent_while_stopping() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    let snapshot = manager.start(opts("svc", "dev")).await.unwrap();

    // Two concurrent stops: one interrupts, the other waits for the
    // same transition. Both succeed.
    let (a, b) = tokio::join!(manager.stop(&snapshot.key), manager.stop(&snapshot.key));
    let not_found_ok = |r: &dbx::error::Result<()>| match r {
        Ok(()) => true,
        Err(e) => e.is_session_not_found(),
    };
    assert!(not_found_ok(&a));
    assert!(not_found_ok(&b));
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn stop_unknown_session_reports_not_found() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    let err = manager
        .stop(&SessionKey::new("ghost", "dev"))
        .await
        .unwrap_err();
    assert!(err.is_session_not_found());
    assert_eq!(err.to_string(), "ghost/dev: session not found");
}

#[tokio::test]
#[cfg(unix)]
async fn readiness_timeout_attaches_recent_logs() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(NeverReadyProbe))
        .with_spawner(Arc::new(EchoThenSleepSpawner));
    manager.set_defaults(fast_defaults());

    let err = manager.start(opts("svc", "dev")).await.unwrap_err();
    let rendered = err.to_string();
    assert!(matches!(err, Error::ReadinessTimeout { .. }));
    assert!(rendered.contains("svc/dev: failed to start session"));
    assert!(rendered.contains("timed out waiting for local port readiness"));
    assert!(rendered.contains("recent logs:"));
    assert!(rendered.contains("boom"));

    // The failed session was cleaned up.
    assert!(manager.list().is_empty());
}

#[tokio::test]
#[cfg(unix)]
async fn child_exit_before_readiness_fails_the_start() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(NeverReadyProbe))
        .with_spawner(Arc::new(ExitSpawner));
    manager.set_defaults(ManagerDefaults {
        startup_timeout: Duration::from_secs(5),
        ..fast_defaults()
    });

    let err = manager.start(opts("svc", "dev")).await.unwrap_err();
    assert!(matches!(err, Error::ChildExitedBeforeReady { .. }));
    assert!(manager.list().is_empty());
}

#[tokio::test]
#[cfg(unix)]
async fn unreleased_port_is_surfaced_by_stop() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(StickyPortProbe {
            calls: AtomicUsize::new(0),
        }))
        .with_spawner(Arc::new(SleepSpawner));
    manager.set_defaults(fast_defaults());

    let snapshot = manager
        .start(StartOptions {
            local_port: Some(5555),
            ..opts("svc", "dev")
        })
        .await
        .unwrap();

    let err = manager.stop(&snapshot.key).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "svc/dev: process stopped but local port 127.0.0.1:5555 is still in use"
    );
}

#[tokio::test]
#[cfg(unix)]
async fn stop_closes_subscribers_and_later_unsubscribe_is_harmless() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    let snapshot = manager.start(opts("svc", "dev")).await.unwrap();
    let (id, mut rx) = manager.subscribe_logs(&snapshot.key, 16).unwrap();

    manager.stop(&snapshot.key).await.unwrap();

    // The channel drains whatever was in flight and then closes.
    while rx.recv().await.is_some() {}

    // Unsubscribing after removal must not fail.
    manager.unsubscribe_logs(&snapshot.key, id);
}

#[tokio::test]
#[cfg(unix)]
async fn stop_all_empties_the_manager() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(AlwaysReadyProbe))
        .with_spawner(Arc::new(SleepSpawner));

    manager.start(opts("svc1", "dev")).await.unwrap();
    manager.start(opts("svc2", "qa")).await.unwrap();
    assert_eq!(manager.list().len(), 2);

    manager.stop_all().await.unwrap();
    assert!(manager.list().is_empty());
}

#[tokio::test]
#[cfg(unix)]
async fn subscriber_sees_child_output_in_order() {
    let manager = SessionManager::new()
        .with_probe(Arc::new(NeverReadyProbe))
        .with_spawner(Arc::new(EchoThenSleepSpawner));
    manager.set_defaults(ManagerDefaults {
        startup_timeout: Duration::from_secs(3),
        ..fast_defaults()
    });

    // Run the start in the background; it will block on readiness long
    // enough for us to observe logs.
    let bg = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start(opts("svc", "dev")).await })
    };

    // Wait for the session to appear, then read its log tail.
    let key = SessionKey::new("svc", "dev");
    let mut logs = Vec::new();
    for _ in 0..50 {
        if let Ok(tail) = manager.last_logs(&key, 20) {
            if !tail.is_empty() {
                logs = tail;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(logs, vec!["boom".to_string()]);

    let _ = bg.await.unwrap();
}
