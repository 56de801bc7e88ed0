use std::{fs::File, process::Stdio, sync::Arc, time::Duration};

use tokio::{
    process::Child,
    sync::watch,
    time,
};

use crate::{ArkutilsError, ArkutilsResult, CommandSpec, ReadinessProbe, SpawnedProbe};

use super::command::spawn_error;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How often a readiness probe is retried while the process is alive.
pub const PROBE_INTERVAL: Duration = Duration::from_millis(250);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Launches one long-running process in its own session with its output bound to a log file.
///
/// The supervisor never restarts a process and never waits for it to finish. It reports a
/// failure only when the process cannot be spawned at all; everything after that is visible
/// through the [`SupervisedProcess`] state channel.
pub struct Supervisor {
    /// A name for the process used in logs
    name: String,

    /// The command to launch
    spec: CommandSpec,

    /// How readiness is decided
    probe: Arc<dyn ReadinessProbe>,
}

/// A handle to a launched process.
///
/// Dropping the handle does not affect the process; a background task keeps reaping it and
/// publishing state changes.
#[derive(Debug, Clone)]
pub struct SupervisedProcess {
    /// The name the process was launched under
    name: String,

    /// The OS process id
    pid: u32,

    /// Latest observed state
    state: watch::Receiver<ProcessState>,
}

/// What the supervisor currently knows about a launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// The process was spawned; readiness has not been confirmed.
    Spawned,

    /// The readiness probe succeeded.
    Ready,

    /// The process has exited.
    Exited {
        /// The exit code, if the process was not killed by a signal.
        code: Option<i32>,
    },
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Supervisor {
    /// Creates a supervisor for `spec`. Readiness defaults to "spawned".
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            probe: Arc::new(SpawnedProbe),
        }
    }

    /// Uses `probe` to decide when the process is ready.
    pub fn with_probe(mut self, probe: impl ReadinessProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Spawns the process with stdout and stderr appended to `log`.
    ///
    /// The child is placed in a new session so that signals aimed at the caller's terminal
    /// do not reach it. Must be called from within a Tokio runtime.
    pub fn launch(self, log: File) -> ArkutilsResult<SupervisedProcess> {
        let stderr_log = log.try_clone()?;

        let mut command = self.spec.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr_log));

        // SAFETY: setsid is async-signal-safe and touches no memory of the parent.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()?;
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| spawn_error(&self.spec, e))?;
        let pid = child
            .id()
            .ok_or_else(|| ArkutilsError::ProcessIdNotFound(self.name.clone()))?;

        tracing::info!(
            process = %self.name,
            pid,
            probe = %self.probe.describe(),
            "launched `{}`",
            self.spec.cmdline()
        );

        let (state_tx, state_rx) = watch::channel(ProcessState::Spawned);
        tokio::spawn(watch_child(
            self.name.clone(),
            child,
            self.probe,
            state_tx,
        ));

        Ok(SupervisedProcess {
            name: self.name,
            pid,
            state: state_rx,
        })
    }
}

impl SupervisedProcess {
    /// The OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The name the process was launched under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The latest observed state.
    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Waits until the process is either ready or gone, and returns that state.
    pub async fn ready(&self) -> ProcessState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|state| *state != ProcessState::Spawned).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Sleeps for `interval` and returns whatever state the process is in afterwards.
    pub async fn settle(&self, interval: Duration) -> ProcessState {
        time::sleep(interval).await;
        self.state()
    }
}

impl ProcessState {
    /// Returns true if the process has exited.
    pub fn has_exited(&self) -> bool {
        matches!(self, ProcessState::Exited { .. })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reaps `child` and drives its readiness probe until it is ready.
async fn watch_child(
    name: String,
    mut child: Child,
    probe: Arc<dyn ReadinessProbe>,
    state_tx: watch::Sender<ProcessState>,
) {
    let mut ticker = time::interval(PROBE_INTERVAL);
    let mut ready = false;

    loop {
        tokio::select! {
            status = child.wait() => {
                let code = match status {
                    Ok(status) => {
                        if status.success() {
                            tracing::info!(process = %name, "process exited successfully");
                        } else {
                            tracing::warn!(process = %name, "process exited with status: {}", status);
                        }
                        status.code()
                    }
                    Err(e) => {
                        tracing::error!(process = %name, "failed to wait for process: {}", e);
                        None
                    }
                };
                state_tx.send_replace(ProcessState::Exited { code });
                return;
            }
            _ = ticker.tick(), if !ready => {
                if probe.is_ready().await {
                    ready = true;
                    tracing::debug!(process = %name, "process is ready");
                    state_tx.send_replace(ProcessState::Ready);
                }
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
