//! Filesystem-backed daemon state.
//!
//! Each daemon owns a directory under the runtime dir holding three files:
//! `loop.pid` (ASCII pid of the worker), `stop` (shutdown sentinel), and
//! `typing.on` (typing-enabled flag, dictation only). The files are the
//! single source of truth for "daemon alive" and "typing enabled"; any
//! process may flip the flag files, and every transition goes through the
//! methods here so the touch/unlink discipline stays in one place.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::StateError;

/// `$XDG_RUNTIME_DIR`, falling back to `/tmp/<uid>`.
pub fn runtime_dir() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(format!("/tmp/{}", nix::unistd::getuid())),
    }
}

/// Coarse daemon status derived from the state files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Stopped,
    Running,
    Typing,
}

/// Handle on one daemon's state directory.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    pub fn new(daemon_name: &str) -> Self {
        Self::in_dir(runtime_dir(), daemon_name)
    }

    pub fn in_dir(base: impl AsRef<Path>, daemon_name: &str) -> Self {
        Self {
            dir: base.as_ref().join(daemon_name),
        }
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join("loop.pid")
    }

    pub fn stop_file(&self) -> PathBuf {
        self.dir.join("stop")
    }

    pub fn typing_file(&self) -> PathBuf {
        self.dir.join("typing.on")
    }

    pub fn ensure_dir(&self) -> Result<(), StateError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn write_pid(&self, pid: u32) -> Result<(), StateError> {
        self.ensure_dir()?;
        fs::write(self.pid_file(), pid.to_string()).map_err(|source| StateError::Io {
            path: self.pid_file(),
            source,
        })
    }

    pub fn read_pid(&self) -> Option<u32> {
        let text = fs::read_to_string(self.pid_file()).ok()?;
        text.trim().parse().ok()
    }

    /// True iff the pid file names a live process.
    pub fn daemon_alive(&self) -> bool {
        self.read_pid().is_some_and(pid_alive)
    }

    pub fn request_stop(&self) {
        let _ = self.ensure_dir();
        touch(&self.stop_file());
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_file().exists()
    }

    pub fn clear_stop(&self) {
        remove_quiet(&self.stop_file());
    }

    pub fn set_typing(&self, enabled: bool) {
        if enabled {
            let _ = self.ensure_dir();
            touch(&self.typing_file());
        } else {
            remove_quiet(&self.typing_file());
        }
    }

    pub fn typing_enabled(&self) -> bool {
        self.typing_file().exists()
    }

    pub fn status(&self) -> DaemonStatus {
        if !self.daemon_alive() {
            DaemonStatus::Stopped
        } else if self.typing_enabled() {
            DaemonStatus::Typing
        } else {
            DaemonStatus::Running
        }
    }

    /// Remove pid, stop, and typing files. Safe to call from any process;
    /// callers use it both for clean shutdown and to reap stale state.
    pub fn clear_all(&self) {
        remove_quiet(&self.pid_file());
        remove_quiet(&self.stop_file());
        remove_quiet(&self.typing_file());
    }
}

/// `kill(pid, 0)` liveness probe.
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn touch(path: &Path) {
    if let Err(e) = fs::OpenOptions::new().create(true).append(true).open(path) {
        tracing::warn!("failed to touch {}: {}", path.display(), e);
    }
}

fn remove_quiet(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pid_roundtrip_and_liveness() {
        let tmp = TempDir::new().unwrap();
        let state = StateFiles::in_dir(tmp.path(), "sotto-dictate");

        assert_eq!(state.read_pid(), None);
        assert!(!state.daemon_alive());

        state.write_pid(std::process::id()).unwrap();
        assert_eq!(state.read_pid(), Some(std::process::id()));
        assert!(state.daemon_alive());
    }

    #[test]
    fn stale_pid_reads_as_stopped() {
        let tmp = TempDir::new().unwrap();
        let state = StateFiles::in_dir(tmp.path(), "sotto-dictate");

        // Positive, far above any kernel pid_max, so certainly not alive.
        state.write_pid(i32::MAX as u32).unwrap();
        assert!(!state.daemon_alive());
        assert_eq!(state.status(), DaemonStatus::Stopped);
    }

    #[test]
    fn typing_flag_toggles() {
        let tmp = TempDir::new().unwrap();
        let state = StateFiles::in_dir(tmp.path(), "sotto-dictate");

        assert!(!state.typing_enabled());
        state.set_typing(true);
        assert!(state.typing_enabled());
        state.set_typing(true); // idempotent
        state.set_typing(false);
        assert!(!state.typing_enabled());
        state.set_typing(false); // idempotent
    }

    #[test]
    fn status_reflects_pid_and_flag() {
        let tmp = TempDir::new().unwrap();
        let state = StateFiles::in_dir(tmp.path(), "sotto-dictate");

        assert_eq!(state.status(), DaemonStatus::Stopped);
        state.write_pid(std::process::id()).unwrap();
        assert_eq!(state.status(), DaemonStatus::Running);
        state.set_typing(true);
        assert_eq!(state.status(), DaemonStatus::Typing);
    }

    #[test]
    fn clear_all_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let state = StateFiles::in_dir(tmp.path(), "sotto-commands");

        state.write_pid(1).unwrap();
        state.request_stop();
        state.set_typing(true);
        state.clear_all();

        assert!(!state.pid_file().exists());
        assert!(!state.stop_file().exists());
        assert!(!state.typing_file().exists());
    }

    #[test]
    fn stop_sentinel_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let state = StateFiles::in_dir(tmp.path(), "sotto-commands");

        assert!(!state.stop_requested());
        state.request_stop();
        assert!(state.stop_requested());
        state.clear_stop();
        assert!(!state.stop_requested());
    }
}
