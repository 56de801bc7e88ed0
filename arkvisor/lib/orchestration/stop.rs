use std::collections::HashSet;

use regex::Regex;

use crate::{
    config::validate_vm_name,
    helpers::{host_command, PidFile},
    ArkvisorError, ArkvisorResult,
};

use super::{Orchestrator, StopReport};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Orchestrator {
    /// Terminates every helper process of the VM `name`.
    ///
    /// Helpers recorded in the VM's pid files are signalled first, then any process whose
    /// command line carries the VM's instance tag. The host-wide NAT service is never
    /// touched. Processes that cannot be signalled are reported rather than failing the stop.
    pub async fn stop(&self, name: &str) -> ArkvisorResult<StopReport> {
        validate_vm_name(name)?;
        let _guard = self.lock_vm(name).await;
        tracing::info!(vm = %name, "stopping vm");

        let mut report = StopReport {
            name: name.to_string(),
            ..Default::default()
        };
        let mut signalled = HashSet::new();

        let run_dir = self.config.run_dir().join(name);
        let records = match PidFile::read_all(&run_dir).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("failed to read pid files in {}: {}", run_dir.display(), e);
                Vec::new()
            }
        };

        let processes = self.processes.list();
        for (_, record) in &records {
            if record.is_alive_in(&processes) && signalled.insert(record.pid) {
                self.signal(record.pid, &mut report).await;
            }
        }

        let pattern = tag_pattern(&self.config.instance_tag(name))?;
        for entry in self.processes.find_matching(&pattern) {
            if signalled.insert(entry.pid) {
                tracing::debug!(pid = entry.pid, "matched {}", entry.cmdline);
                self.signal(entry.pid, &mut report).await;
            }
        }

        for (path, _) in records {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("failed to remove pid file {}: {}", path.display(), e);
            }
        }

        tracing::info!(
            vm = %name,
            "vm stopped: {} terminated, {} failed",
            report.terminated.len(),
            report.failed.len()
        );

        Ok(report)
    }

    async fn signal(&self, pid: u32, report: &mut StopReport) {
        let error = match self.processes.terminate(pid) {
            Ok(()) => {
                report.terminated.push(pid);
                return;
            }
            Err(e) => e,
        };

        // Privileged helpers run as root and can only be signalled through the wrapper.
        if error.is_permission_denied() && *self.config.get_privileged() {
            let pid_arg = pid.to_string();
            let spec = host_command(&self.config, "kill", ["-TERM", pid_arg.as_str()]);
            match arkutils::run_captured(&spec).await {
                Ok(_) => {
                    report.terminated.push(pid);
                    return;
                }
                Err(e) => {
                    tracing::warn!(pid, "failed to terminate through {}: {}", spec.program(), e);
                    report.failed.push((pid, e.to_string()));
                    return;
                }
            }
        }

        tracing::warn!(pid, "failed to terminate: {}", error);
        report.failed.push((pid, error.to_string()));
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Matches a command line whose `argv[0]`, or any later word, is exactly `tag` or starts
/// with `tag:`. `ark-foo` does not match `ark-foobar`.
pub fn tag_pattern(tag: &str) -> ArkvisorResult<Regex> {
    Regex::new(&format!(r"(?:^|[\s/]){}(?:[:\s]|$)", regex::escape(tag)))
        .map_err(|e| ArkvisorError::custom(anyhow::anyhow!("invalid tag pattern: {e}")))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
