//! Daemon lifecycle helpers shared by the dictation and commands CLIs.
//!
//! "Daemonizing" is re-executing the current binary with the `run`
//! subcommand in its own process group, stdout/stderr appended to the log
//! file. The pid file written by the worker is the liveness contract;
//! callers poll it rather than the child handle.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use sotto_foundation::{state::pid_alive, StateFiles};

/// Outcome token vocabulary for `daemon-start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    StartFailed,
}

impl StartOutcome {
    pub fn token(self) -> &'static str {
        match self {
            StartOutcome::Started => "started",
            StartOutcome::AlreadyRunning => "already-running",
            StartOutcome::StartFailed => "start-failed",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            StartOutcome::StartFailed => 1,
            _ => 0,
        }
    }
}

/// Spawn the worker and wait up to 3 s for its pid file to go live.
pub fn start_daemon(state: &StateFiles, log_path: &Path) -> StartOutcome {
    if state.daemon_alive() {
        return StartOutcome::AlreadyRunning;
    }
    state.clear_stop();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut child = match spawn_worker(log_path) {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("failed to spawn worker: {}", e);
            return StartOutcome::StartFailed;
        }
    };

    for _ in 0..60 {
        if state.daemon_alive() {
            return StartOutcome::Started;
        }
        thread::sleep(Duration::from_millis(50));
    }

    // Model load can outlast the poll window; a still-running child counts
    // as started.
    match child.try_wait() {
        Ok(None) => StartOutcome::Started,
        _ => StartOutcome::StartFailed,
    }
}

fn spawn_worker(log_path: &Path) -> std::io::Result<std::process::Child> {
    let exe = std::env::current_exe()?;
    let log = OpenOptions::new().create(true).append(true).open(log_path)?;
    let log_err = log.try_clone()?;

    let mut command = Command::new(exe);
    command
        .arg("run")
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(log_err);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.spawn()
}

/// Stop the worker: sentinel file, SIGTERM, up to 4 s of grace, SIGKILL.
/// Returns true when a live daemon was actually stopped.
pub fn stop_daemon(state: &StateFiles) -> bool {
    let Some(pid) = state.read_pid() else {
        state.clear_all();
        return false;
    };
    if !pid_alive(pid) {
        state.clear_all();
        return false;
    }

    state.request_stop();
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

    for _ in 0..80 {
        if !pid_alive(pid) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    if pid_alive(pid) {
        tracing::warn!("worker {} ignored SIGTERM, sending SIGKILL", pid);
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }

    state.clear_all();
    true
}
