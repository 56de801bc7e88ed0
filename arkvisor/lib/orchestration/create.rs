use arkutils::ArkutilsError;

use crate::{
    artifact::ArtifactStore,
    config::VmConfig,
    devices::{extraction_devices, packaging_devices, DeviceName},
    helpers::{host_command, Component, HelperCommand, PidFile},
    layout::VmLayout,
    ArkvisorError, ArkvisorResult,
};

use super::{Launched, Orchestrator};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Builds a VM from scratch and starts packaging it.
    ///
    /// Destroys any previous tree of the VM, downloads and extracts the configured bundles
    /// into `blueprint/`, makes sure NAT is running and launches the snapshotter. Returns
    /// once the snapshotter has been spawned; packaging itself continues in the background
    /// and its completion is not observed.
    pub async fn create(&self, vm: VmConfig) -> ArkvisorResult<Launched> {
        vm.validate()?;
        let name = vm.get_name().as_str();
        let _guard = self.lock_vm(name).await;

        tracing::info!(vm = %name, "creating vm");
        let mut logs = self.open_logs(name).await?;
        let layout = VmLayout::new(&self.config, name);
        tracing::info!(
            vm = %name,
            "using directories: base={}, blueprint={}",
            layout.get_base().display(),
            layout.get_blueprint().display()
        );

        layout.reset().await?;
        self.fix_ownership(&layout).await?;

        for artifact in self.config.get_artifacts() {
            self.artifacts
                .download(artifact.get_url(), &layout.archive_path(artifact))
                .await?;
        }

        self.load_nbd_module().await?;

        for artifact in self.config.get_artifacts() {
            let archive = layout.archive_path(artifact);
            let devices = extraction_devices(artifact.get_devices(), layout.get_blueprint());
            let command = HelperCommand::packager_extract(&self.config, &archive, &devices)?;
            self.artifacts.extract(&command, &archive).await?;
        }

        let blueprint_files: Vec<_> = DeviceName::ALL
            .iter()
            .filter_map(|d| d.blueprint_file())
            .map(|file| layout.get_blueprint().join(file))
            .collect();
        ArtifactStore::verify_non_empty(&blueprint_files).await?;

        let mut launched = Launched::new(name, &logs);

        if self.nat_pid().await.is_some() {
            tracing::info!(vm = %name, "NAT service already running, not launching another");
        } else {
            let nat = self
                .launch(&mut logs, None, HelperCommand::nat(&self.config))
                .await?;
            self.settle(&nat).await;
            launched.push(Component::Nat.as_str(), &nat);
        }

        let devices = packaging_devices(layout.get_blueprint(), layout.get_package());
        let command = HelperCommand::snapshotter(&self.config, &vm, &devices)?;
        let snapshotter = self.launch(&mut logs, Some(name), command).await?;
        launched.push(Component::Snapshotter.as_str(), &snapshotter);

        tracing::info!(vm = %name, "vm creation initiated");
        logs.close();

        Ok(launched)
    }

    /// Returns the pid of a NAT service this arkvisor launched that is still running.
    pub(super) async fn nat_pid(&self) -> Option<u32> {
        let path = PidFile::path(&self.config.run_dir(), None, Component::Nat);
        let record = match PidFile::read(&path).await {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!("failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        record
            .is_alive_in(&self.processes.list())
            .then_some(record.pid)
    }

    async fn fix_ownership(&self, layout: &VmLayout) -> ArkvisorResult<()> {
        let Some(owner) = self.config.get_owner() else {
            return Ok(());
        };

        let base = layout.get_base().display().to_string();
        let spec = host_command(&self.config, "chown", ["-R", owner.as_str(), base.as_str()]);
        arkutils::run_captured(&spec)
            .await
            .map_err(|source| host_preparation("chown", source))?;

        Ok(())
    }

    async fn load_nbd_module(&self) -> ArkvisorResult<()> {
        if !*self.config.get_load_nbd_module() {
            return Ok(());
        }

        let nbds_max = format!("nbds_max={}", self.config.get_nbd_max_devices());
        let spec = host_command(&self.config, "modprobe", ["nbd", nbds_max.as_str()]);
        arkutils::run_captured(&spec)
            .await
            .map_err(|source| host_preparation("modprobe", source))?;

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn host_preparation(step: &str, source: ArkutilsError) -> ArkvisorError {
    ArkvisorError::HostPreparation {
        step: step.to_string(),
        source,
    }
}
