//! Process table inspection for the companion process.

use sysinfo::{ProcessRefreshKind, System, UpdateKind};

/// Returns true if any live process mentions `marker` in its arguments.
///
/// Enumeration problems simply yield fewer processes, so the answer degrades
/// to "not confirmed running".
pub fn is_process_running(marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }

    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));

    let own_pid = sysinfo::get_current_pid().ok();
    sys.processes()
        .iter()
        .filter(|(pid, _)| Some(**pid) != own_pid)
        .any(|(_, process)| cmd_references(process.cmd(), marker))
}

/// Whether any argument of a command line contains `marker`.
pub fn cmd_references(cmd: &[String], marker: &str) -> bool {
    !marker.is_empty() && cmd.iter().any(|arg| arg.contains(marker))
}
