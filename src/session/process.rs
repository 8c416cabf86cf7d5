//! Child process primitives: spawning and platform-specific signaling.
//!
//! On unix the child is placed in its own process group so that interrupt
//! and kill reach helper processes the tunnel binary forks (the session
//! plugin, for one); signaling the leader alone leaves the port held. On
//! Windows there are no POSIX process groups, so the adapter falls back to
//! tree termination via `taskkill`. Callers never branch on platform.

use std::io;
use std::process::Stdio;
use tokio::process::{Child, Command};

#[cfg(unix)]
pub use unix::{interrupt_process, kill_process};
#[cfg(windows)]
pub use windows::{interrupt_process, kill_process};

/// Program name for the tunnel child.
const AWS_PROGRAM: &str = "aws";

/// Spawns one tunnel child process with piped output.
///
/// Injected into the session manager so tests can substitute a stub that
/// spawns an arbitrary local process instead of the aws CLI.
pub trait SessionSpawner: Send + Sync {
    fn spawn(&self, args: &[String]) -> io::Result<Child>;
}

/// Spawns `aws` with the given arguments.
pub struct AwsCliSpawner;

impl SessionSpawner for AwsCliSpawner {
    fn spawn(&self, args: &[String]) -> io::Result<Child> {
        let mut cmd = Command::new(AWS_PROGRAM);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn()
    }
}

#[cfg(unix)]
mod unix {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use std::io;

    /// Ask the session's process group to shut down gracefully.
    ///
    /// "Already exited" and "no such process" count as success.
    pub fn interrupt_process(pid: u32) -> io::Result<()> {
        signal_group(pid, Signal::SIGINT)
    }

    /// Forcefully terminate the session's process group.
    pub fn kill_process(pid: u32) -> io::Result<()> {
        signal_group(pid, Signal::SIGKILL)
    }

    /// Signal the whole process group, falling back to the leader alone.
    fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
        // PIDs outside the signalable range mean the handle was never
        // populated or the process is long gone.
        if pid == 0 || pid > i32::MAX as u32 {
            return Ok(());
        }
        let pid = Pid::from_raw(pid as i32);

        match killpg(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    "killpg({}, {}) failed: {}, falling back to direct signal",
                    pid,
                    signal,
                    e
                );
            }
        }

        match kill(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::other(format!(
                "failed to signal pid={}: {}",
                pid, e
            ))),
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::io;
    use std::process::Command;

    pub fn interrupt_process(pid: u32) -> io::Result<()> {
        taskkill(pid, false)
    }

    pub fn kill_process(pid: u32) -> io::Result<()> {
        taskkill(pid, true)
    }

    /// Terminate via `taskkill /T`, which walks the child tree for us.
    fn taskkill(pid: u32, force: bool) -> io::Result<()> {
        if pid == 0 {
            return Ok(());
        }

        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string(), "/T"]);
        if force {
            cmd.arg("/F");
        }

        // A missing process reports failure through the exit status; that
        // counts as success, same as ESRCH on unix.
        let _ = cmd.output()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_invalid_pids_is_a_no_op() {
        assert!(interrupt_process(0).is_ok());
        assert!(kill_process(0).is_ok());
        #[cfg(unix)]
        {
            assert!(interrupt_process(i32::MAX as u32 + 1).is_ok());
        }
    }

    #[test]
    #[cfg(unix)]
    fn signaling_a_dead_pid_is_success() {
        // Near PID_MAX on Linux; almost certainly unused.
        assert!(interrupt_process(4_194_303).is_ok());
        assert!(kill_process(4_194_303).is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_reaches_a_spawned_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30").process_group(0).kill_on_drop(true);
        let mut child = cmd.spawn().unwrap();
        let pid = child.id().unwrap();

        kill_process(pid).unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
