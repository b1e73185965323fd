//! Ownership of the local model server process.
//!
//! The manager starts `ollama serve` on demand, bound to loopback, records
//! its PID so a crashed run can be cleaned up next time, and stops it again
//! after an idle window. It never touches a server it did not start.

pub mod binary;
pub mod pid_file;
pub mod probe;
pub mod spawner;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::{self, EngineSettings};

pub use probe::{HealthProbe, HttpHealthProbe};
pub use spawner::{ProcessSpawner, SystemSpawner};

/// Interface the managed server binds to.
pub const LOOPBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Model server binary not found")]
    BinaryNotFound,

    #[error("Failed to start model server: {0}")]
    Spawn(String),

    #[error("Model server did not become healthy within {0:?}")]
    StartupTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PID file does not contain a process id: '{0}'")]
    InvalidPidFile(String),

    #[error("Failed to terminate process {pid}: {reason}")]
    Terminate { pid: u32, reason: String },
}

/// Lifecycle of the server this manager owns. A server started by someone
/// else is reachable but never reflected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotRunning,
    Starting,
    Running,
    Stopping,
    /// A server from a previous run is still alive and being cleaned up.
    Orphaned,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub port: u16,
    /// Explicit binary; skips discovery when it exists.
    pub binary: Option<PathBuf>,
    pub pid_file: PathBuf,
    pub idle_timeout: Duration,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
}

impl LifecycleConfig {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            port: settings.ollama_port,
            binary: settings.ollama_binary.clone(),
            pid_file: config::pid_file_path(),
            idle_timeout: settings.idle_timeout,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    fn bind_addr(&self) -> String {
        format!("{LOOPBACK_HOST}:{}", self.port)
    }
}

struct Inner {
    state: LifecycleState,
    owned_pid: Option<u32>,
}

/// Idle countdown bookkeeping. A timer only acts if its generation is
/// still current and no request is in flight.
#[derive(Default)]
struct IdleState {
    generation: u64,
    active_requests: usize,
    timer: Option<JoinHandle<()>>,
}

impl IdleState {
    /// Invalidate and abort any pending countdown.
    fn cancel(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Marks one local-model request in flight. The idle countdown is paused
/// while any guard is alive and restarts when the last one drops.
#[must_use = "the request is only tracked while the guard is alive"]
pub struct ActiveRequest {
    manager: Arc<LifecycleManager>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        {
            let mut idle = self.manager.idle();
            idle.active_requests = idle.active_requests.saturating_sub(1);
        }
        self.manager.reset_idle_timer();
    }
}

pub struct LifecycleManager {
    config: LifecycleConfig,
    spawner: Arc<dyn ProcessSpawner>,
    probe: Arc<dyn HealthProbe>,
    binary: Mutex<Option<PathBuf>>,
    inner: Mutex<Inner>,
    // Held across spawn-and-wait so concurrent callers share one start.
    start_lock: tokio::sync::Mutex<()>,
    idle: Mutex<IdleState>,
}

impl LifecycleManager {
    /// Manager backed by real processes and an HTTP health probe.
    pub fn new(config: LifecycleConfig) -> Arc<Self> {
        let probe = Arc::new(HttpHealthProbe::new(LOOPBACK_HOST, config.port));
        Self::with_parts(config, Arc::new(SystemSpawner::new()), probe)
    }

    pub fn with_parts(
        config: LifecycleConfig,
        spawner: Arc<dyn ProcessSpawner>,
        probe: Arc<dyn HealthProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            spawner,
            probe,
            binary: Mutex::new(None),
            inner: Mutex::new(Inner {
                state: LifecycleState::NotRunning,
                owned_pid: None,
            }),
            start_lock: tokio::sync::Mutex::new(()),
            idle: Mutex::new(IdleState::default()),
        })
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn state(&self) -> LifecycleState {
        self.inner().state
    }

    /// Whether the running server was started by this manager.
    pub fn owns_server(&self) -> bool {
        self.inner().owned_pid.is_some()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn idle(&self) -> MutexGuard<'_, IdleState> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LifecycleState) {
        self.inner().state = state;
    }

    /// Locate the server binary. A successful lookup is cached for the
    /// life of the manager.
    pub fn find_binary(&self) -> Option<PathBuf> {
        let mut cached = self.binary.lock().unwrap_or_else(|e| e.into_inner());
        if cached.is_none() {
            *cached = binary::locate_binary(self.config.binary.as_deref());
        }
        cached.clone()
    }

    /// Reachability of the local endpoint, whoever started it.
    pub async fn is_running(&self) -> bool {
        self.probe.is_healthy().await
    }

    /// Make sure a server answers on the local endpoint. Failures are
    /// logged and reported as `false`.
    pub async fn ensure_running(&self) -> bool {
        match self.try_ensure_running().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Local model server unavailable");
                false
            }
        }
    }

    pub async fn try_ensure_running(&self) -> Result<(), LifecycleError> {
        if self.is_running().await {
            return Ok(());
        }
        let _guard = self.start_lock.lock().await;
        // Another caller may have finished starting it while we waited.
        if self.is_running().await {
            return Ok(());
        }

        self.set_state(LifecycleState::Starting);
        let result = self.start_and_wait().await;
        if result.is_err() {
            self.set_state(LifecycleState::NotRunning);
        }
        result
    }

    async fn start_and_wait(&self) -> Result<(), LifecycleError> {
        let binary = self.find_binary().ok_or(LifecycleError::BinaryNotFound)?;
        let started = tokio::time::Instant::now();
        let pid = self.spawner.spawn(&binary, &self.config.bind_addr())?;
        tracing::info!(pid, binary = %binary.display(), port = self.config.port, "Spawned local model server");

        if let Err(e) = pid_file::write_pid(&self.config.pid_file, pid) {
            tracing::warn!(pid, error = %e, "Could not record model server PID");
        }
        self.inner().owned_pid = Some(pid);

        let deadline = started + self.config.startup_timeout;
        loop {
            if self.probe.is_healthy().await {
                self.set_state(LifecycleState::Running);
                tracing::info!(
                    pid,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Local model server ready"
                );
                return Ok(());
            }
            if !self.spawner.is_alive(pid) {
                self.release(pid);
                return Err(LifecycleError::Spawn(format!(
                    "process {pid} exited during startup"
                )));
            }
            if tokio::time::Instant::now() >= deadline {
                self.terminate_owned();
                return Err(LifecycleError::StartupTimeout(self.config.startup_timeout));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Forget `pid` and its PID file without signalling it.
    fn release(&self, pid: u32) {
        let mut inner = self.inner();
        if inner.owned_pid == Some(pid) {
            inner.owned_pid = None;
        }
        drop(inner);
        if let Err(e) = pid_file::remove_pid(&self.config.pid_file) {
            tracing::warn!(error = %e, "Could not remove PID file");
        }
    }

    fn terminate_owned(&self) -> bool {
        let Some(pid) = self.inner().owned_pid.take() else {
            return false;
        };
        self.set_state(LifecycleState::Stopping);
        match self.spawner.terminate(pid) {
            Ok(()) => tracing::info!(pid, "Stopped local model server"),
            Err(e) => tracing::warn!(pid, error = %e, "Failed to stop local model server"),
        }
        if let Err(e) = pid_file::remove_pid(&self.config.pid_file) {
            tracing::warn!(error = %e, "Could not remove PID file");
        }
        self.set_state(LifecycleState::NotRunning);
        true
    }

    /// Stop the server if this manager started it. Returns whether a
    /// process was signalled.
    pub fn stop_if_owned(&self) -> bool {
        self.idle().cancel();
        self.terminate_owned()
    }

    #[cfg(test)]
    fn take_idle_timer(&self) -> Option<JoinHandle<()>> {
        self.idle().timer.take()
    }

    /// Kill a server left behind by a previous run. Returns whether one
    /// was found alive. Never fails: a missing, unreadable or stale PID
    /// file is cleaned up and reported as `false`.
    pub fn cleanup_orphan(&self) -> bool {
        let path = &self.config.pid_file;
        let pid = match pid_file::read_pid(path) {
            Ok(Some(pid)) => pid,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable PID file");
                let _ = pid_file::remove_pid(path);
                return false;
            }
        };

        if !self.spawner.is_alive(pid) {
            tracing::debug!(pid, "Stale PID file, process already gone");
            let _ = pid_file::remove_pid(path);
            return false;
        }

        self.set_state(LifecycleState::Orphaned);
        tracing::info!(pid, "Terminating orphaned model server from a previous run");
        if let Err(e) = self.spawner.terminate(pid) {
            tracing::warn!(pid, error = %e, "Failed to terminate orphaned model server");
        }
        if let Err(e) = pid_file::remove_pid(path) {
            tracing::warn!(error = %e, "Could not remove PID file");
        }
        self.set_state(LifecycleState::NotRunning);
        true
    }

    /// Run once at startup, before any extraction is accepted.
    pub fn init(&self) {
        self.cleanup_orphan();
    }

    /// Mark a request as started. Pending idle shutdowns are cancelled
    /// until the returned guard drops.
    pub fn begin_request(self: &Arc<Self>) -> ActiveRequest {
        let mut idle = self.idle();
        idle.active_requests += 1;
        idle.cancel();
        drop(idle);
        ActiveRequest {
            manager: Arc::clone(self),
        }
    }

    /// Restart the idle countdown. When it elapses with no further reset
    /// and no request in flight, the owned server is stopped.
    pub fn reset_idle_timer(self: &Arc<Self>) {
        if !self.owns_server() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime for the idle timer; leaving the server up");
            return;
        };

        let mut idle = self.idle();
        if idle.active_requests > 0 {
            return;
        }
        idle.cancel();
        let generation = idle.generation;
        let manager: Weak<Self> = Arc::downgrade(self);
        let timeout = self.config.idle_timeout;
        idle.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(manager) = manager.upgrade() {
                manager.on_idle_timeout(generation);
            }
        }));
    }

    /// Stop the owned server if the countdown `generation` is still the
    /// current one and nothing is in flight. Returns whether it stopped.
    fn on_idle_timeout(&self, generation: u64) -> bool {
        let mut idle = self.idle();
        if idle.generation != generation || idle.active_requests > 0 {
            return false;
        }
        // Our own handle; dropping it detaches rather than aborts.
        idle.timer = None;
        tracing::info!(idle_secs = self.config.idle_timeout.as_secs(), "Idle timeout reached");
        // Lock stays held through the stop; begin_request waits on it.
        self.terminate_owned()
    }

    /// Stop an owned server. Call on every clean exit path.
    pub fn shutdown(&self) {
        self.stop_if_owned();
    }
}
