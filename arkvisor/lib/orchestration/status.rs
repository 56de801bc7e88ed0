use arkutils::ProcessEntry;
use regex::Regex;

use crate::{
    config::validate_vm_name,
    helpers::{program_name, Component, PidFile},
    ArkvisorResult,
};

use super::{Orchestrator, ServiceStatus, VmStatus};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Reports which services of the VM `name` appear to be running.
    ///
    /// The answer is advisory: a service counts as running if its pid file points at a live
    /// process of the right program, or if any process command line looks like it. Nothing
    /// is changed on the host.
    pub async fn status(&self, name: &str) -> ArkvisorResult<VmStatus> {
        validate_vm_name(name)?;

        let processes = self.processes.list();
        let run_dir = self.config.run_dir();
        let binaries = self.config.get_binaries();
        let tag = self.config.instance_tag(name);

        let nat_name = program_name(binaries.get_nat());
        let nat = recorded_alive(&PidFile::path(&run_dir, None, Component::Nat), &processes)
            .await
            || any_match(&Regex::new(&regex::escape(nat_name)), &processes);

        let mut services = ServiceStatus {
            nat,
            ..Default::default()
        };

        for (component, program) in [
            (Component::Peer, binaries.get_peer()),
            (Component::Forwarder, binaries.get_forwarder()),
        ] {
            let path = PidFile::path(&run_dir, Some(name), component);
            let running = recorded_alive(&path, &processes).await
                || any_match(&helper_pattern(&tag, program_name(program)), &processes);

            match component {
                Component::Peer => services.peer = running,
                _ => services.forwarder = running,
            }
        }

        tracing::debug!(vm = %name, ?services, "status");
        Ok(VmStatus {
            name: name.to_string(),
            services,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Matches the command line of a tagged helper: the tag, then later the program name.
fn helper_pattern(tag: &str, program: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?:^|[\s/]){}(?:[:\s]|$).*{}",
        regex::escape(tag),
        regex::escape(program)
    ))
}

fn any_match(pattern: &Result<Regex, regex::Error>, processes: &[ProcessEntry]) -> bool {
    match pattern {
        Ok(pattern) => processes.iter().any(|p| pattern.is_match(&p.cmdline)),
        Err(e) => {
            tracing::warn!("invalid status pattern: {}", e);
            false
        }
    }
}

async fn recorded_alive(path: &std::path::Path, processes: &[ProcessEntry]) -> bool {
    match PidFile::read(path).await {
        Ok(Some(record)) => record.is_alive_in(processes),
        Ok(None) => false,
        Err(e) => {
            tracing::warn!("failed to read pid file {}: {}", path.display(), e);
            false
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
