use std::net::IpAddr;

use crate::{config::validate_vm_name, layout::VmLayout, ArkvisorError, ArkvisorResult};

use super::{Launched, Orchestrator};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Pulls a running VM from `source` onto this host.
    ///
    /// The local peer connects to the source's peer port and the forwarder exposes the guest
    /// service on the migrate address. Returns once both helpers have been launched; the
    /// migration itself continues in the background.
    pub async fn migrate(&self, name: &str, source: &str) -> ArkvisorResult<Launched> {
        validate_vm_name(name)?;
        let raddr = remote_peer_addr(source, *self.config.get_peer_port())?;

        let _guard = self.lock_vm(name).await;
        tracing::info!(vm = %name, source = %source, "migrating vm");

        let layout = VmLayout::new(&self.config, name);
        let launched = self
            .run_instance(&layout, &raddr, "", self.config.get_migrate_external_addr())
            .await?;

        tracing::info!(vm = %name, "migration initiated");
        Ok(launched)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Formats the address of the peer on `source`, bracketing IPv6 literals.
pub fn remote_peer_addr(source: &str, port: u16) -> ArkvisorResult<String> {
    let source = source.trim();
    if source.is_empty() {
        return Err(ArkvisorError::InvalidRequest(
            "source_ip must not be empty".to_string(),
        ));
    }

    match source.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => Ok(format!("[{ip}]:{port}")),
        Ok(IpAddr::V4(ip)) => Ok(format!("{ip}:{port}")),
        Err(_) if is_hostname(source) => Ok(format!("{source}:{port}")),
        Err(_) => Err(ArkvisorError::InvalidRequest(format!(
            "source_ip is not an address or host name: {source}"
        ))),
    }
}

fn is_hostname(s: &str) -> bool {
    s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
