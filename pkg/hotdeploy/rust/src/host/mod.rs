// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! OS capability interface.
//!
//! Everything that depends on the platform (socket table format, process
//! table format, tree termination, console spawning) lives behind [`Host`].
//! The correlation logic in `resolver`, `tracer` and `terminator` only ever
//! sees the plain snapshots defined here, so it can be exercised against a
//! fabricated process table.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use log::debug;

use crate::errors::{HostError, TerminationError};

#[cfg(any(test, feature = "test-helpers"))]
pub mod fake;
#[cfg(target_os = "linux")]
pub mod procfs;
#[cfg(all(unix, not(target_os = "linux")))]
pub mod ps;
#[cfg(unix)]
mod unix;
pub mod windows;

/// Snapshot of one live process at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub parent_pid: u32,
    pub command_line: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Listening,
    Other,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketState::Listening => write!(f, "LISTENING"),
            SocketState::Other => write!(f, "OTHER"),
        }
    }
}

/// One row of a socket-table query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub port: u16,
    pub pid: u32,
    pub state: SocketState,
}

/// Kind of script a console on this host can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    /// `cmd.exe` batch file.
    Batch,
    /// POSIX `sh` script.
    Shell,
}

impl ScriptFlavor {
    pub fn extension(self) -> &'static str {
        match self {
            ScriptFlavor::Batch => "bat",
            ScriptFlavor::Shell => "sh",
        }
    }
}

/// What the launcher asks the host to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRequest {
    pub wrapper: PathBuf,
    pub working_dir: PathBuf,
    pub title: String,
}

pub trait Host: Send + Sync {
    /// Point-in-time TCP socket table.
    fn socket_table(&self) -> Result<Vec<PortBinding>, HostError>;

    /// Point-in-time process table.
    fn process_table(&self) -> Result<Vec<ProcessHandle>, HostError>;

    /// Forcefully end `pid` and its descendants.
    fn terminate_tree(&self, pid: u32) -> Result<(), TerminationError>;

    /// Open a new detached console running `request.wrapper`. Returns once the
    /// spawn is confirmed, not when the console exits.
    fn spawn_console(&self, request: &ConsoleRequest) -> io::Result<()>;

    fn script_flavor(&self) -> ScriptFlavor;

    fn current_pid(&self) -> u32 {
        std::process::id()
    }
}

/// The host implementation for the platform this binary was built for.
#[cfg(target_os = "linux")]
pub fn native(console_command: Vec<String>) -> Box<dyn Host> {
    Box::new(procfs::ProcfsHost::new(console_command))
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn native(console_command: Vec<String>) -> Box<dyn Host> {
    Box::new(ps::PsHost::new(console_command))
}

#[cfg(windows)]
pub fn native(_console_command: Vec<String>) -> Box<dyn Host> {
    Box::new(windows::WindowsHost::new())
}

/// Run a query tool to completion and return its stdout.
fn run_tool(program: &str, args: &[&str]) -> Result<String, HostError> {
    let command = format!("{program} {}", args.join(" "));
    let output = std::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .map_err(|source| HostError::Command {
            command: command.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(HostError::CommandStatus {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Pids of every process in the subtree rooted at `root`, excluding `root`,
/// ordered parents before children.
pub fn descendants(table: &[ProcessHandle], root: u32) -> Vec<u32> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for proc in table {
            if proc.parent_pid == parent
                && proc.pid != parent
                && proc.pid != root
                && !found.contains(&proc.pid)
            {
                found.push(proc.pid);
                frontier.push(proc.pid);
            }
        }
    }
    found
}

/// Detach every process whose recorded parent started after it did.
///
/// Such a parent cannot be the real one: the original exited and its pid was
/// handed to an unrelated process. `started` maps pids to start times in any
/// unit that only grows; pids missing from it are left untouched.
pub fn orphan_reused_parents(table: &mut [ProcessHandle], started: &HashMap<u32, u64>) {
    for proc in table.iter_mut() {
        let (Some(own), Some(parent)) = (started.get(&proc.pid), started.get(&proc.parent_pid))
        else {
            continue;
        };
        if parent > own {
            debug!(
                "pid {} outlived its parent; pid {} now belongs to a newer process",
                proc.pid, proc.parent_pid
            );
            proc.parent_pid = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: u32, parent_pid: u32) -> ProcessHandle {
        ProcessHandle {
            pid,
            parent_pid,
            command_line: String::new(),
            display_name: format!("p{pid}"),
        }
    }

    #[test]
    fn test_descendants() {
        let table = vec![
            proc(1, 0),
            proc(10, 1),
            proc(11, 10),
            proc(12, 10),
            proc(13, 12),
            proc(20, 1),
        ];
        let mut found = descendants(&table, 10);
        found.sort();
        assert_eq!(found, vec![11, 12, 13]);
        assert!(descendants(&table, 13).is_empty());
        assert!(descendants(&table, 999).is_empty());
    }

    #[test]
    fn test_descendants_survives_cycles() {
        let table = vec![proc(5, 6), proc(6, 5), proc(0, 0)];
        let found = descendants(&table, 5);
        assert_eq!(found, vec![6]);
        assert!(descendants(&table, 0).is_empty());
    }

    #[test]
    fn test_orphan_reused_parents() {
        let mut table = vec![proc(1, 0), proc(20, 1), proc(30, 20), proc(40, 30), proc(50, 99)];
        // 20 was started after 30, so 30's real parent is gone.
        let started = HashMap::from([(1, 1), (20, 500), (30, 100), (40, 100)]);
        orphan_reused_parents(&mut table, &started);

        let parents: Vec<(u32, u32)> = table.iter().map(|p| (p.pid, p.parent_pid)).collect();
        assert_eq!(parents, vec![(1, 0), (20, 1), (30, 0), (40, 30), (50, 99)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool() {
        assert_eq!(run_tool("echo", &["hello"]).unwrap(), "hello\n");
        assert!(matches!(
            run_tool("false", &[]),
            Err(HostError::CommandStatus { .. })
        ));
        assert!(matches!(
            run_tool("/nonexistent/tool", &[]),
            Err(HostError::Command { .. })
        ));
    }

    #[test]
    fn test_script_flavor_extension() {
        assert_eq!(ScriptFlavor::Batch.extension(), "bat");
        assert_eq!(ScriptFlavor::Shell.extension(), "sh");
    }
}
