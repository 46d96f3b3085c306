// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Windows host driven by the stock command-line tools.
//!
//! Socket ownership comes from `netstat -ano`, the process table from a
//! CIM query rendered as JSON, and tree termination from `taskkill /T /F`.
//! The parsers are plain functions so they are tested on every platform.

use std::collections::HashMap;
use std::io;
use std::process::{Command, Stdio};

use log::{debug, info};
use serde::Deserialize;

use super::{
    ConsoleRequest, Host, PortBinding, ProcessHandle, ScriptFlavor, SocketState,
    orphan_reused_parents, run_tool,
};
use crate::errors::{HostError, TerminationError};

// `ParentProcessId` is never cleared when the parent exits, so the creation
// time is needed to tell a live parent from a reused pid.
const PROCESS_QUERY: &str = "Get-CimInstance Win32_Process | \
     Select-Object ProcessId,ParentProcessId,Name,CommandLine,\
     @{Name='CreationTicks';Expression={$_.CreationDate.Ticks}} | \
     ConvertTo-Json -Compress";

#[derive(Debug, Default)]
pub struct WindowsHost;

impl WindowsHost {
    pub fn new() -> Self {
        Self
    }
}

impl Host for WindowsHost {
    fn socket_table(&self) -> Result<Vec<PortBinding>, HostError> {
        let output = run_tool("netstat", &["-ano", "-p", "TCP"])?;
        let mut bindings = parse_netstat(&output);
        // `-p TCP` omits IPv6 on some releases.
        if let Ok(v6) = run_tool("netstat", &["-ano", "-p", "TCPv6"]) {
            bindings.extend(parse_netstat(&v6));
        }
        Ok(bindings)
    }

    fn process_table(&self) -> Result<Vec<ProcessHandle>, HostError> {
        let output = run_tool(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", PROCESS_QUERY],
        )?;
        parse_process_json(&output)
    }

    fn terminate_tree(&self, pid: u32) -> Result<(), TerminationError> {
        let pid_arg = pid.to_string();
        let output = Command::new("taskkill")
            .args(["/PID", &pid_arg, "/T", "/F"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TerminationError::Failed {
                pid,
                message: format!("could not run taskkill: {e}"),
            })?;
        if output.status.success() {
            info!("taskkill ended process tree rooted at pid {pid}");
            return Ok(());
        }
        let mut message = String::from_utf8_lossy(&output.stderr).into_owned();
        message.push_str(&String::from_utf8_lossy(&output.stdout));
        Err(classify_taskkill_failure(pid, &message))
    }

    fn spawn_console(&self, request: &ConsoleRequest) -> io::Result<()> {
        // `start` returns as soon as the new console exists.
        let mut command = Command::new("cmd");
        command.arg("/c").arg("start");
        push_title(&mut command, &request.title);
        let status = command
            .arg("cmd")
            .arg("/k")
            .arg(&request.wrapper)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(io::Error::other(format!("start exited with {status}")));
        }
        info!("console '{}' opened", request.title);
        Ok(())
    }

    fn script_flavor(&self) -> ScriptFlavor {
        ScriptFlavor::Batch
    }
}

/// `start` takes its first quoted argument as the window title, so the title
/// must be quoted even when it has no spaces.
#[cfg(windows)]
fn push_title(command: &mut Command, title: &str) {
    use std::os::windows::process::CommandExt;
    command.raw_arg(format!("\"{}\"", title.replace('"', "")));
}

#[cfg(not(windows))]
fn push_title(command: &mut Command, title: &str) {
    command.arg(title);
}

/// Parse `netstat -ano` output. Only TCP rows are kept; header lines and UDP
/// rows (which have no state column) are skipped.
pub fn parse_netstat(output: &str) -> Vec<PortBinding> {
    output.lines().filter_map(parse_netstat_line).collect()
}

fn parse_netstat_line(line: &str) -> Option<PortBinding> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [proto, local, _remote, state, pid] = fields.as_slice() else {
        return None;
    };
    if !proto.eq_ignore_ascii_case("TCP") {
        return None;
    }
    let (_, port) = local.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let pid = pid.parse().ok()?;
    let state = if state.eq_ignore_ascii_case("LISTENING") {
        SocketState::Listening
    } else {
        SocketState::Other
    };
    Some(PortBinding { port, pid, state })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimProcess {
    process_id: u32,
    parent_process_id: u32,
    name: Option<String>,
    command_line: Option<String>,
    /// `CreationDate` in 100ns ticks; absent for protected system processes.
    creation_ticks: Option<u64>,
}

/// `ConvertTo-Json` emits a bare object when only one row matches.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<CimProcess>),
    One(CimProcess),
}

pub fn parse_process_json(output: &str) -> Result<Vec<ProcessHandle>, HostError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(HostError::Parse {
            what: "process table",
            context: "empty output".to_string(),
        });
    }
    let rows = match serde_json::from_str::<OneOrMany>(trimmed) {
        Ok(OneOrMany::Many(rows)) => rows,
        Ok(OneOrMany::One(row)) => vec![row],
        Err(e) => {
            return Err(HostError::Parse {
                what: "process table",
                context: e.to_string(),
            });
        }
    };
    debug!("process query returned {} rows", rows.len());
    let started: HashMap<u32, u64> = rows
        .iter()
        .filter_map(|row| Some((row.process_id, row.creation_ticks?)))
        .collect();
    let mut table: Vec<ProcessHandle> = rows
        .into_iter()
        .map(|row| ProcessHandle {
            pid: row.process_id,
            parent_pid: row.parent_process_id,
            command_line: row.command_line.unwrap_or_default(),
            display_name: row.name.unwrap_or_default(),
        })
        .collect();
    orphan_reused_parents(&mut table, &started);
    Ok(table)
}

pub fn classify_taskkill_failure(pid: u32, message: &str) -> TerminationError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") {
        TerminationError::NotFound { pid }
    } else if lower.contains("access is denied") {
        TerminationError::PermissionDenied { pid }
    } else {
        TerminationError::Failed {
            pid,
            message: message.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSTAT: &str = "
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1044
  TCP    0.0.0.0:9933           0.0.0.0:0              LISTENING       4242
  TCP    127.0.0.1:9933         127.0.0.1:51012        ESTABLISHED     4242
  TCP    127.0.0.1:9933         127.0.0.1:50999        TIME_WAIT       0
  TCP    [::]:9933              [::]:0                 LISTENING       4242
  UDP    0.0.0.0:5353           *:*                                    2210
";

    #[test]
    fn test_parse_netstat() {
        let rows = parse_netstat(NETSTAT);
        assert_eq!(rows.len(), 5);
        assert_eq!(
            rows[1],
            PortBinding {
                port: 9933,
                pid: 4242,
                state: SocketState::Listening
            }
        );
        assert_eq!(rows[3].state, SocketState::Other);
        assert_eq!(rows[3].pid, 0);
        assert_eq!(rows[4].port, 9933, "IPv6 address with brackets");
    }

    #[test]
    fn test_parse_netstat_ignores_noise() {
        assert!(parse_netstat("").is_empty());
        assert!(parse_netstat("  TCP  garbage").is_empty());
        assert!(parse_netstat("  TCP    0.0.0.0:notaport  0.0.0.0:0  LISTENING  1").is_empty());
    }

    #[test]
    fn test_parse_process_json_array() {
        let json = r#"[
            {"ProcessId":0,"ParentProcessId":0,"Name":"System Idle Process","CommandLine":null},
            {"ProcessId":800,"ParentProcessId":700,"Name":"cmd.exe","CommandLine":"cmd /k C:\\deploy\\hotdeploy-console.bat"},
            {"ProcessId":4242,"ParentProcessId":800,"Name":"java.exe","CommandLine":"java -jar sfs2x.jar"}
        ]"#;
        let table = parse_process_json(json).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].command_line, "");
        assert_eq!(table[1].display_name, "cmd.exe");
        assert_eq!(table[2].parent_pid, 800);
    }

    #[test]
    fn test_parse_process_json_single_object() {
        let json = r#"{"ProcessId":9,"ParentProcessId":1,"Name":"java.exe","CommandLine":"java"}"#;
        let table = parse_process_json(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].pid, 9);
    }

    #[test]
    fn test_parse_process_json_reused_parent_pid() {
        // java's console exited; pid 800 now belongs to a cmd.exe opened later.
        let json = r#"[
            {"ProcessId":700,"ParentProcessId":4,"Name":"explorer.exe","CommandLine":"explorer","CreationTicks":638000000000000000},
            {"ProcessId":4242,"ParentProcessId":800,"Name":"java.exe","CommandLine":"java -jar sfs2x.jar","CreationTicks":638000000100000000},
            {"ProcessId":800,"ParentProcessId":700,"Name":"cmd.exe","CommandLine":"cmd /k C:\\deploy\\hotdeploy-console.bat","CreationTicks":638000000200000000},
            {"ProcessId":4,"ParentProcessId":0,"Name":"System","CommandLine":null,"CreationTicks":null}
        ]"#;
        let table = parse_process_json(json).unwrap();
        let parent_of = |pid: u32| table.iter().find(|p| p.pid == pid).unwrap().parent_pid;
        assert_eq!(parent_of(4242), 0);
        assert_eq!(parent_of(800), 700);
        assert_eq!(parent_of(700), 4, "no creation time for System");

        let host = crate::host::fake::FakeHost::new();
        for proc in &table {
            host.add_process(proc.pid, proc.parent_pid, &proc.display_name, &proc.command_line);
        }
        let signatures = crate::tracer::ConsoleSignatures::new(vec!["cmd.exe".to_string()]);
        assert_eq!(crate::tracer::trace_session_for(&host, 4242, &signatures), None);
    }

    #[test]
    fn test_parse_process_json_errors() {
        assert!(matches!(
            parse_process_json("  "),
            Err(HostError::Parse { .. })
        ));
        assert!(matches!(
            parse_process_json("not json"),
            Err(HostError::Parse { .. })
        ));
    }

    #[test]
    fn test_classify_taskkill_failure() {
        assert!(matches!(
            classify_taskkill_failure(5, "ERROR: The process \"5\" not found."),
            TerminationError::NotFound { pid: 5 }
        ));
        assert!(matches!(
            classify_taskkill_failure(
                5,
                "ERROR: The process with PID 5 could not be terminated.\nReason: Access is denied."
            ),
            TerminationError::PermissionDenied { pid: 5 }
        ));
        assert!(matches!(
            classify_taskkill_failure(5, "something else"),
            TerminationError::Failed { pid: 5, .. }
        ));
    }
}
