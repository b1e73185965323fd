use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use super::LifecycleError;

/// Operating-system process control behind the lifecycle manager.
pub trait ProcessSpawner: Send + Sync {
    /// Start `binary` detached and headless, serving on `bind_addr`
    /// (`host:port`). Returns the child's PID.
    fn spawn(&self, binary: &Path, bind_addr: &str) -> Result<u32, LifecycleError>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to exit.
    fn terminate(&self, pid: u32) -> Result<(), LifecycleError>;
}

/// Spawns `ollama serve` in its own process group with stdio discarded.
#[derive(Default)]
pub struct SystemSpawner {
    // Children we started, kept so exited ones get reaped instead of
    // lingering as zombies that still answer liveness checks.
    children: Mutex<HashMap<u32, Child>>,
}

impl SystemSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(alive)` when `pid` is one of our children.
    fn child_status(&self, pid: u32) -> Option<bool> {
        let mut children = self.children.lock().ok()?;
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(_)) | Err(_) => {
                children.remove(&pid);
                Some(false)
            }
        }
    }
}

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, binary: &Path, bind_addr: &str) -> Result<u32, LifecycleError> {
        let mut command = Command::new(binary);
        command
            .arg("serve")
            .env("OLLAMA_HOST", bind_addr)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group: terminal signals aimed at us do not reach it.
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|e| LifecycleError::Spawn(format!("{}: {e}", binary.display())))?;
        let pid = child.id();
        if let Ok(mut children) = self.children.lock() {
            children.insert(pid, child);
        }
        Ok(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        if let Some(alive) = self.child_status(pid) {
            return alive;
        }
        os::is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> Result<(), LifecycleError> {
        os::terminate(pid)?;
        // Reap if it already exited; otherwise a later liveness check will.
        let _ = self.child_status(pid);
        Ok(())
    }
}

#[cfg(unix)]
mod os {
    use super::LifecycleError;

    fn as_pid(pid: u32) -> Option<libc::pid_t> {
        // 0 and negative values address process groups, never a single process.
        libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
    }

    pub fn is_alive(pid: u32) -> bool {
        let Some(pid) = as_pid(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs the permission and existence check only.
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    pub fn terminate(pid: u32) -> Result<(), LifecycleError> {
        let Some(raw) = as_pid(pid) else {
            return Err(LifecycleError::Terminate {
                pid,
                reason: "invalid pid".into(),
            });
        };
        // SAFETY: sends SIGTERM to a single positive PID.
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(LifecycleError::Terminate {
            pid,
            reason: err.to_string(),
        })
    }
}

#[cfg(not(unix))]
mod os {
    use super::LifecycleError;

    pub fn is_alive(pid: u32) -> bool {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH"])
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }

    pub fn terminate(pid: u32) -> Result<(), LifecycleError> {
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status()
            .map_err(|e| LifecycleError::Terminate {
                pid,
                reason: e.to_string(),
            })?;
        if status.success() || !is_alive(pid) {
            Ok(())
        } else {
            Err(LifecycleError::Terminate {
                pid,
                reason: format!("taskkill exited with {status}"),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_terminate_real_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-server");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let spawner = SystemSpawner::new();
        let pid = spawner.spawn(&script, "127.0.0.1:0").unwrap();
        assert!(spawner.is_alive(pid));

        spawner.terminate(pid).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while spawner.is_alive(pid) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!spawner.is_alive(pid));
    }

    #[test]
    fn missing_binary_fails_to_spawn() {
        let spawner = SystemSpawner::new();
        let err = spawner
            .spawn(Path::new("/nonexistent/ollama"), "127.0.0.1:0")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Spawn(_)));
    }

    #[test]
    fn pid_zero_is_never_alive_or_signalled() {
        assert!(!os::is_alive(0));
        assert!(os::terminate(0).is_err());
    }
}
