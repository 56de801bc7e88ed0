use crate::{
    config::validate_vm_name,
    devices::build_descriptors,
    helpers::{Component, HelperCommand},
    layout::VmLayout,
    ArkvisorError, ArkvisorResult,
};

use super::{Launched, Orchestrator};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Resumes a packaged VM on this host.
    ///
    /// The peer listens for migration requests on the configured listen address and the
    /// forwarder exposes the guest service on the start address.
    pub async fn start(&self, name: &str) -> ArkvisorResult<Launched> {
        validate_vm_name(name)?;

        let _guard = self.lock_vm(name).await;

        let layout = VmLayout::new(&self.config, name);
        if let Some(missing) = layout.missing_package_file().await {
            return Err(ArkvisorError::NotPackaged {
                name: name.to_string(),
                missing,
            });
        }

        tracing::info!(vm = %name, "starting vm");

        let launched = self
            .run_instance(
                &layout,
                "",
                self.config.get_peer_listen_addr(),
                self.config.get_start_external_addr(),
            )
            .await?;

        tracing::info!(vm = %name, "vm started");
        Ok(launched)
    }

    /// Launches the peer and then the forwarder of `layout`'s VM, settling in between.
    pub(super) async fn run_instance(
        &self,
        layout: &VmLayout,
        raddr: &str,
        laddr: &str,
        external_addr: &str,
    ) -> ArkvisorResult<Launched> {
        let name = layout.get_name().as_str();
        let mut logs = self.open_logs(name).await?;
        layout.ensure_instance().await?;

        let descriptors =
            build_descriptors(layout.get_package(), layout.get_instance(), self.config.get_tuning());
        let command = HelperCommand::peer(&self.config, name, raddr, laddr, &descriptors)?;
        let peer = self.launch(&mut logs, Some(name), command).await?;
        self.settle(&peer).await;

        let mut launched = Launched::new(name, &logs);
        launched.push(Component::Peer.as_str(), &peer);

        let command = HelperCommand::forwarder(&self.config, name, external_addr)?;
        let forwarder = self.launch(&mut logs, Some(name), command).await?;
        launched.push(Component::Forwarder.as_str(), &forwarder);

        logs.close();
        Ok(launched)
    }
}
