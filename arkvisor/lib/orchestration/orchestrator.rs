use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use arkutils::{
    ArkutilsError, ProcessState, ProcessTable, SupervisedProcess, Supervisor, SystemProcessTable,
};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    artifact::ArtifactStore,
    config::ArkvisorConfig,
    helpers::{HelperCommand, PidFile},
    logsink::{LogManager, LogRetentionPolicy},
    ArkvisorError, ArkvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Drives the lifecycle of VMs: create, start, migrate, stop, status and logs.
///
/// The orchestrator keeps no record of VMs between calls. Everything it needs is
/// reconstructed from the output tree, the pid files and the process table, so a restarted
/// daemon picks up where the previous one left off. The only in-memory state is a lock per
/// VM name that serializes mutating operations on the same VM.
pub struct Orchestrator {
    /// The configuration.
    pub(super) config: Arc<ArkvisorConfig>,

    /// Bundle downloads and extraction.
    pub(super) artifacts: ArtifactStore,

    /// The host process table.
    pub(super) processes: Arc<dyn ProcessTable>,

    /// How long request logs are kept.
    pub(super) retention: LogRetentionPolicy,

    /// One lock per VM name.
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// What a create, start or migrate request launched.
#[derive(Debug, Clone)]
pub struct Launched {
    /// The VM name.
    pub name: String,

    /// The request's log directory.
    pub logs_path: PathBuf,

    /// The helpers launched, in launch order.
    pub helpers: Vec<LaunchedHelper>,
}

/// A helper launched by a request and its state when the request returned.
#[derive(Debug, Clone)]
pub struct LaunchedHelper {
    /// The component name.
    pub component: String,

    /// The spawned pid.
    pub pid: u32,

    /// The state observed when the request returned.
    pub state: ProcessState,
}

/// The advisory status of a VM's services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmStatus {
    /// The VM name.
    pub name: String,

    /// Whether each service appears to be running.
    pub services: ServiceStatus,
}

/// Per-service liveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// The host-wide NAT service.
    pub nat: bool,

    /// The VM's peer.
    pub peer: bool,

    /// The VM's forwarder.
    pub forwarder: bool,
}

/// What a stop request did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// The VM name.
    pub name: String,

    /// Processes sent `SIGTERM`.
    pub terminated: Vec<u32>,

    /// Processes that could not be signalled, with the reason.
    pub failed: Vec<(u32, String)>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Creates an orchestrator that inspects the real process table.
    pub fn new(config: ArkvisorConfig) -> ArkvisorResult<Self> {
        Self::with_process_table(config, Arc::new(SystemProcessTable))
    }

    /// Creates an orchestrator that inspects `processes` instead of the real process table.
    pub fn with_process_table(
        config: ArkvisorConfig,
        processes: Arc<dyn ProcessTable>,
    ) -> ArkvisorResult<Self> {
        config.validate()?;

        let artifacts =
            ArtifactStore::new(*config.get_download_timeout(), *config.get_download_retries())?;
        let retention = LogRetentionPolicy::new(*config.get_log_max_age(), true);

        Ok(Self {
            config: Arc::new(config),
            artifacts,
            processes,
            retention,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The configuration.
    pub fn get_config(&self) -> &ArkvisorConfig {
        &self.config
    }

    /// Looks every helper program up on `PATH` and returns the ones that cannot be found.
    ///
    /// Privileged helpers are resolved by the wrapper at launch time, possibly against a
    /// different `PATH`, so a miss here is worth a warning rather than a refusal to serve.
    pub fn missing_helpers(&self) -> Vec<(String, ArkutilsError)> {
        let binaries = self.config.get_binaries();
        let mut programs = vec![
            binaries.get_packager(),
            binaries.get_nat(),
            binaries.get_snapshotter(),
            binaries.get_peer(),
            binaries.get_forwarder(),
        ];
        if *self.config.get_privileged() {
            programs.push(binaries.get_sudo());
        }

        programs
            .into_iter()
            .filter_map(|program| {
                arkutils::resolve_program(program)
                    .err()
                    .map(|e| (program.clone(), e))
            })
            .collect()
    }

    /// Waits for exclusive use of `vm`.
    pub(super) async fn lock_vm(&self, vm: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks
                .entry(vm.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Allocates the log directory of a request.
    pub(super) async fn open_logs(&self, vm: &str) -> ArkvisorResult<LogManager> {
        LogManager::new(self.config.log_dir(), vm, &self.retention).await
    }

    /// Launches a long-running helper with its output bound to the component's log.
    ///
    /// Only a failure to spawn is an error. The pid file is written under `vm`'s run
    /// directory, or the host-wide one when `vm` is `None`.
    pub(super) async fn launch(
        &self,
        logs: &mut LogManager,
        vm: Option<&str>,
        command: HelperCommand,
    ) -> ArkvisorResult<SupervisedProcess> {
        let component = command.component();
        let mut supervisor = Supervisor::new(
            format!("{}/{}", logs.vm(), component),
            command.to_spec(),
        );
        if let Some(probe) = command.probe() {
            supervisor = supervisor.with_probe(probe);
        }

        let log = logs.open(component.as_str())?;
        log.log(format!("Starting {component}"));
        let process = supervisor
            .launch(log.try_clone_file()?)
            .map_err(|source| {
                log.log(format!("Error starting {component}: {source}"));
                ArkvisorError::HelperLaunch {
                    component: component.to_string(),
                    source,
                }
            })?;

        let record = PidFile::new(component, process.pid(), command.tag(), command.program());
        let path = PidFile::path(&self.config.run_dir(), vm, component);
        if let Err(e) = record.write(&path).await {
            tracing::warn!("failed to write pid file {}: {}", path.display(), e);
        }

        Ok(process)
    }

    /// Sleeps for the settle interval, warning if `process` exits in the meantime.
    pub(super) async fn settle(&self, process: &SupervisedProcess) {
        tracing::info!(
            "waiting {:?} for {} to initialize",
            self.config.get_settle_interval(),
            process.name()
        );

        if let ProcessState::Exited { code } = process.settle(*self.config.get_settle_interval()).await {
            tracing::warn!(
                "{} exited during the settle interval with code {:?}",
                process.name(),
                code
            );
        }
    }
}

impl Launched {
    pub(super) fn new(name: &str, logs: &LogManager) -> Self {
        Self {
            name: name.to_string(),
            logs_path: logs.base_dir().to_path_buf(),
            helpers: Vec::new(),
        }
    }

    pub(super) fn push(&mut self, component: &str, process: &SupervisedProcess) {
        self.helpers.push(LaunchedHelper {
            component: component.to_string(),
            pid: process.pid(),
            state: process.state(),
        });
    }

    /// Returns the pid of the launched `component`, if it was launched.
    pub fn pid_of(&self, component: &str) -> Option<u32> {
        self.helpers
            .iter()
            .find(|h| h.component == component)
            .map(|h| h.pid)
    }
}

impl ServiceStatus {
    /// Returns true if every service appears to be running.
    pub fn all_running(&self) -> bool {
        self.nat && self.peer && self.forwarder
    }
}
