//! Worker process supervision.
//!
//! Spawns the tool-server worker with:
//! - `kill_on_drop(true)` so an abandoned worker never outlives the client.
//! - `env_clear()` plus an allowlist, so only the variables the worker needs
//!   (and the ones configured explicitly) reach it.
//! - stderr forwarded line by line to `tracing` under the `worker.stderr`
//!   target.
//!
//! A monitor task owns the [`Child`]. It records the exit status, runs the
//! registered exit handlers, and performs the SIGTERM, grace period, then
//! SIGKILL sequence when termination is requested.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::worker::{WorkerIo, WorkerLauncher};
use crate::{AppError, Result};

/// Environment variables inherited by the worker when the configuration
/// does not list its own.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "NODE_PATH",
    "NODE_EXTRA_CA_CERTS",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Configuration for spawning the worker process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Runtime executable.
    pub runtime: String,
    /// Script handed to the runtime.
    pub script_path: PathBuf,
    /// Arguments appended after the script.
    pub args: Vec<String>,
    /// Variables copied from the parent environment when set there.
    pub inherit_env: Vec<String>,
    /// Variables set explicitly.
    pub env: HashMap<String, String>,
    /// Time between SIGTERM and SIGKILL during termination.
    pub shutdown_grace: Duration,
}

impl SpawnConfig {
    /// Build a spawn configuration from the `[worker]` config section.
    #[must_use]
    pub fn from_worker_config(config: &WorkerConfig) -> Self {
        let inherit_env = config.inherit_env.clone().unwrap_or_else(|| {
            ALLOWED_ENV_VARS.iter().map(|&key| key.to_owned()).collect()
        });

        Self {
            runtime: config.runtime.clone(),
            script_path: config.script_path.clone(),
            args: config.args.clone(),
            inherit_env,
            env: config.env.clone(),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_millis),
        }
    }
}

/// How and why the worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Human-readable description.
    pub reason: String,
    /// Whether the client asked for the termination.
    pub requested: bool,
}

type ExitHandler = Box<dyn FnOnce(&WorkerExit) + Send>;

enum ExitState {
    Running(Vec<ExitHandler>),
    Exited(WorkerExit),
}

/// Handle to a running worker process.
///
/// Dropping the handle requests termination.
pub struct WorkerProcess {
    pid: Option<u32>,
    state: Arc<Mutex<ExitState>>,
    terminate: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("pid", &self.pid)
            .field("exit", &self.exit_status())
            .finish_non_exhaustive()
    }
}

impl WorkerProcess {
    /// OS process identifier, if the platform reported one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit record once the process has ended.
    #[must_use]
    pub fn exit_status(&self) -> Option<WorkerExit> {
        match &*lock(&self.state) {
            ExitState::Running(_) => None,
            ExitState::Exited(exit) => Some(exit.clone()),
        }
    }

    /// Whether the process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Register a handler that runs once when the process exits.
    ///
    /// Runs immediately when the process has already exited.
    pub fn on_exit<F>(&self, handler: F)
    where
        F: FnOnce(&WorkerExit) + Send + 'static,
    {
        let exited = {
            let mut state = lock(&self.state);
            match &mut *state {
                ExitState::Running(handlers) => {
                    handlers.push(Box::new(handler));
                    return;
                }
                ExitState::Exited(exit) => exit.clone(),
            }
        };
        handler(&exited);
    }

    /// Terminate the process and wait for the monitor to record its exit.
    ///
    /// Sends SIGTERM (on Unix), waits up to the configured grace period, then
    /// kills the process. Safe to call more than once.
    pub async fn kill(&mut self) -> Option<WorkerExit> {
        self.terminate.cancel();
        if let Some(monitor) = self.monitor.take() {
            if let Err(err) = monitor.await {
                warn!(%err, "worker monitor task failed");
            }
        }
        self.exit_status()
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.terminate.cancel();
    }
}

/// Stdio and handle of a freshly spawned worker.
#[derive(Debug)]
pub struct SpawnedWorker {
    /// Process handle.
    pub process: WorkerProcess,
    /// Worker stdin (requests).
    pub stdin: ChildStdin,
    /// Worker stdout (replies).
    pub stdout: ChildStdout,
}

/// Spawn the worker process described by `config`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn worker …")` when the OS refuses to
///   start the runtime (missing executable, permissions).
/// - `AppError::Spawn("failed to capture …")` when a stdio pipe is missing.
pub fn spawn_worker(config: &SpawnConfig) -> Result<SpawnedWorker> {
    let mut cmd = Command::new(&config.runtime);
    cmd.arg(&config.script_path).args(&config.args);

    cmd.env_clear();
    for key in &config.inherit_env {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    cmd.envs(&config.env);

    cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn worker '{} {}': {err}",
            config.runtime,
            config.script_path.display()
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture worker stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture worker stdout".into()))?;
    let stderr = child.stderr.take();

    let pid = child.id();
    info!(pid, runtime = %config.runtime, script = %config.script_path.display(), "worker spawned");

    if let Some(stderr) = stderr {
        forward_stderr(pid, stderr);
    }

    let state = Arc::new(Mutex::new(ExitState::Running(Vec::new())));
    let terminate = CancellationToken::new();
    let monitor = monitor_exit(
        pid,
        child,
        Arc::clone(&state),
        terminate.clone(),
        config.shutdown_grace,
    );

    Ok(SpawnedWorker {
        process: WorkerProcess {
            pid,
            state,
            terminate,
            monitor: Some(monitor),
        },
        stdin,
        stdout,
    })
}

/// Launcher that spawns a real worker process per connection.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: SpawnConfig,
}

impl ProcessLauncher {
    /// Launcher for the given spawn configuration.
    #[must_use]
    pub fn new(config: SpawnConfig) -> Self {
        Self { config }
    }

    /// Spawn configuration in use.
    #[must_use]
    pub fn config(&self) -> &SpawnConfig {
        &self.config
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<WorkerIo>> + Send + '_>> {
        Box::pin(async move {
            let spawned = spawn_worker(&self.config)?;
            Ok(WorkerIo {
                reader: Box::new(spawned.stdout),
                writer: Box::new(spawned.stdin),
                process: Some(spawned.process),
            })
        })
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn lock(state: &Mutex<ExitState>) -> MutexGuard<'_, ExitState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn forward_stderr(pid: Option<u32>, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => info!(target: "worker.stderr", pid, "{line}"),
                Ok(None) => break,
                Err(err) => {
                    debug!(pid, %err, "worker stderr closed with error");
                    break;
                }
            }
        }
    });
}

fn monitor_exit(
    pid: Option<u32>,
    mut child: Child,
    state: Arc<Mutex<ExitState>>,
    terminate: CancellationToken,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let exit = tokio::select! {
            result = child.wait() => describe_exit(pid, result, false),
            () = terminate.cancelled() => terminate_gracefully(pid, &mut child, grace).await,
        };

        if exit.requested {
            info!(pid, reason = %exit.reason, "worker stopped");
        } else {
            warn!(pid, reason = %exit.reason, "worker exited unexpectedly");
        }

        let handlers = {
            let mut guard = lock(&state);
            match std::mem::replace(&mut *guard, ExitState::Exited(exit.clone())) {
                ExitState::Running(handlers) => handlers,
                ExitState::Exited(_) => Vec::new(),
            }
        };

        for handler in handlers {
            handler(&exit);
        }
    })
}

async fn terminate_gracefully(pid: Option<u32>, child: &mut Child, grace: Duration) -> WorkerExit {
    request_terminate(pid);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => describe_exit(pid, result, true),
        Err(_elapsed) => {
            warn!(pid, ?grace, "worker ignored termination request, killing");
            if let Err(err) = child.kill().await {
                warn!(pid, %err, "failed to kill worker");
            }
            describe_exit(pid, child.wait().await, true)
        }
    }
}

#[cfg(unix)]
fn request_terminate(pid: Option<u32>) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_terminate(_pid: Option<u32>) {
    // No polite termination signal; the grace period simply elapses and the
    // process is killed.
}

fn describe_exit(
    pid: Option<u32>,
    result: std::io::Result<std::process::ExitStatus>,
    requested: bool,
) -> WorkerExit {
    match result {
        Ok(status) => {
            let exit_code = status.code();
            let reason = exit_code.map_or_else(
                || "worker process terminated by signal".to_owned(),
                |code| format!("worker process exited with code {code}"),
            );
            WorkerExit {
                exit_code,
                reason,
                requested,
            }
        }
        Err(err) => {
            warn!(pid, %err, "error waiting for worker process");
            WorkerExit {
                exit_code: None,
                reason: format!("wait error: {err}"),
                requested,
            }
        }
    }
}
