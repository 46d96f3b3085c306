// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Session termination with a self-termination guard.

use std::collections::HashSet;

use log::{error, info, warn};

use crate::errors::TerminationError;
use crate::host::{Host, ProcessHandle};
use crate::tracer::SessionHandle;

/// Our own pid followed by every ancestor reachable in `table`.
pub fn caller_chain(table: &[ProcessHandle], own_pid: u32) -> Vec<u32> {
    let mut chain = vec![own_pid];
    let mut seen = HashSet::from([own_pid]);
    let mut current = own_pid;
    while let Some(proc) = table.iter().find(|p| p.pid == current) {
        let parent = proc.parent_pid;
        if parent == 0 || !seen.insert(parent) {
            break;
        }
        chain.push(parent);
        current = parent;
    }
    chain
}

/// Forcefully end `session` and its descendants.
///
/// A session that is already gone, or whose pid now belongs to a different
/// program, counts as terminated. Terminating this process or one of its
/// ancestors is refused.
pub fn terminate(host: &dyn Host, session: &SessionHandle) -> Result<(), TerminationError> {
    let pid = session.pid;
    let table = host.process_table().map_err(|e| TerminationError::Failed {
        pid,
        message: format!("cannot verify target against a fresh process table: {e}"),
    })?;

    let chain = caller_chain(&table, host.current_pid());
    if chain.contains(&pid) {
        error!("refusing to terminate pid {pid}: it is in our own process ancestry {chain:?}");
        return Err(TerminationError::GuardRefused { pid });
    }

    let Some(current) = table.iter().find(|p| p.pid == pid) else {
        info!("session pid {pid} already exited");
        return Ok(());
    };
    if !current.display_name.eq_ignore_ascii_case(&session.display_name) {
        warn!(
            "pid {pid} is now '{}' (was '{}'); the pid was reused, not terminating",
            current.display_name, session.display_name
        );
        return Ok(());
    }

    match host.terminate_tree(pid) {
        Ok(()) => {
            info!("terminated session pid {pid} ({})", session.display_name);
            Ok(())
        }
        Err(TerminationError::NotFound { .. }) => {
            info!("session pid {pid} exited before it could be terminated");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use crate::tracer::SessionKind;

    const OWN_PID: u32 = 500;

    fn session(pid: u32, display_name: &str) -> SessionHandle {
        SessionHandle {
            pid,
            kind: SessionKind::ConsoleHost,
            display_name: display_name.to_string(),
        }
    }

    fn host() -> FakeHost {
        FakeHost::new()
            .with_current_pid(OWN_PID)
            .with_process(1, 0, "init", "")
            .with_process(400, 1, "cmd.exe", "cmd.exe")
            .with_process(450, 400, "powershell.exe", "powershell")
            .with_process(OWN_PID, 450, "hotdeploy", "hotdeploy --no-pause")
            .with_process(20, 1, "cmd.exe", "cmd /k hotdeploy-console.bat")
            .with_process(30, 20, "java.exe", "java -jar sfs2x.jar")
    }

    #[test]
    fn test_caller_chain() {
        let host = host();
        let table = host.process_table().unwrap();
        assert_eq!(caller_chain(&table, OWN_PID), vec![OWN_PID, 450, 400, 1]);
        assert_eq!(caller_chain(&table, 9999), vec![9999]);
    }

    #[test]
    fn test_terminates_tree() {
        let host = host();
        terminate(&host, &session(20, "cmd.exe")).unwrap();
        assert_eq!(host.terminated(), vec![20]);
        assert!(!host.is_alive(30));
        assert!(host.is_alive(OWN_PID));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let host = host();
        terminate(&host, &session(20, "cmd.exe")).unwrap();
        terminate(&host, &session(20, "cmd.exe")).unwrap();
        assert_eq!(host.terminated(), vec![20]);
    }

    #[test]
    fn test_guard_refuses_self_and_ancestors() {
        let host = host();
        for pid in [OWN_PID, 450, 400, 1] {
            match terminate(&host, &session(pid, "whatever")) {
                Err(TerminationError::GuardRefused { pid: refused }) => assert_eq!(refused, pid),
                other => panic!("expected GuardRefused for {pid}, got {other:?}"),
            }
        }
        assert!(host.terminated().is_empty());
        assert!(host.is_alive(OWN_PID));
    }

    #[test]
    fn test_reused_pid_is_left_alone() {
        let host = host();
        terminate(&host, &session(30, "cmd.exe")).unwrap();
        assert!(host.terminated().is_empty());
        assert!(host.is_alive(30));
    }

    #[test]
    fn test_permission_denied_is_surfaced() {
        let host = host().deny_termination(20);
        assert!(matches!(
            terminate(&host, &session(20, "cmd.exe")),
            Err(TerminationError::PermissionDenied { pid: 20 })
        ));
    }

    #[test]
    fn test_unverifiable_target_is_not_killed() {
        let host = host().failing_process_table();
        assert!(matches!(
            terminate(&host, &session(20, "cmd.exe")),
            Err(TerminationError::Failed { pid: 20, .. })
        ));
        assert!(host.terminated().is_empty());
    }
}
