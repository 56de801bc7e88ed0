use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use regex::Regex;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::{ArkutilsError, ArkutilsResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// The process id.
    pub pid: u32,

    /// The full command line, arguments joined by single spaces.
    pub cmdline: String,
}

/// The process table of the current host.
///
/// Kept behind a trait so that lookups by command line can be exercised without real
/// processes carrying the expected `argv[0]`.
pub trait ProcessTable: Send + Sync {
    /// Lists every visible process except the calling one.
    fn list(&self) -> Vec<ProcessEntry>;

    /// Asks a process to terminate with `SIGTERM`.
    fn terminate(&self, pid: u32) -> ArkutilsResult<()>;

    /// Lists the processes whose command line matches `pattern`.
    fn find_matching(&self, pattern: &Regex) -> Vec<ProcessEntry> {
        self.list()
            .into_iter()
            .filter(|entry| pattern.is_match(&entry.cmdline))
            .collect()
    }
}

/// The real process table, read through `sysinfo` and signalled through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl ProcessTable for SystemProcessTable {
    fn list(&self) -> Vec<ProcessEntry> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        let own_pid = std::process::id();
        system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                cmdline: process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .filter(|entry| !entry.cmdline.is_empty())
            .collect()
    }

    fn terminate(&self, pid: u32) -> ArkutilsResult<()> {
        terminate_process(pid)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Sends `SIGTERM` to `pid`.
pub fn terminate_process(pid: u32) -> ArkutilsResult<()> {
    let target = Pid::from_raw(pid as i32);
    signal::kill(target, Signal::SIGTERM).map_err(|source| ArkutilsError::Signal { pid, source })
}

/// Returns true if `pid` names a live process, including one we may not signal.
pub fn is_process_running(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::process::Command;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
        assert!(!is_process_running(0));
    }

    #[test]
    fn test_find_matching_sees_child_and_terminate_stops_it() {
        let mut child = Command::new("sleep").arg("37.5").spawn().unwrap();
        let pid = child.id();

        let table = SystemProcessTable;
        let pattern = Regex::new(r"^sleep 37\.5$").unwrap();
        let found = table.find_matching(&pattern);
        assert!(found.iter().any(|entry| entry.pid == pid));

        table.terminate(pid).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());

        std::thread::sleep(Duration::from_millis(50));
        assert!(!table.find_matching(&pattern).iter().any(|e| e.pid == pid));
    }

    #[test]
    fn test_terminate_missing_process_is_an_error() {
        // Reap a child so its pid is known to be gone.
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let err = terminate_process(pid).unwrap_err();
        assert!(matches!(err, ArkutilsError::Signal { source: Errno::ESRCH, .. }));
        assert!(!err.is_permission_denied());
    }
}
