// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host for Unix systems without procfs (macOS, the BSDs), built on `lsof`
//! and `ps`.

use std::collections::HashMap;
use std::io;

use log::debug;

use super::{
    ConsoleRequest, Host, PortBinding, ProcessHandle, ScriptFlavor, SocketState, run_tool, unix,
};
use crate::errors::{HostError, TerminationError};

pub struct PsHost {
    console_command: Vec<String>,
}

impl PsHost {
    pub fn new(console_command: Vec<String>) -> Self {
        Self { console_command }
    }
}

impl Host for PsHost {
    fn socket_table(&self) -> Result<Vec<PortBinding>, HostError> {
        match run_tool("lsof", &["-nP", "-iTCP", "-sTCP:LISTEN", "-Fpn"]) {
            Ok(output) => Ok(parse_lsof(&output)),
            // lsof exits 1 when nothing matches.
            Err(HostError::CommandStatus { stderr, .. }) if stderr.is_empty() => {
                debug!("lsof reported no listening sockets");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn process_table(&self) -> Result<Vec<ProcessHandle>, HostError> {
        let names = run_tool("ps", &["-A", "-o", "pid=,ppid=,comm="])?;
        let args = run_tool("ps", &["-A", "-o", "pid=,args="])?;
        Ok(parse_ps(&names, &args))
    }

    fn terminate_tree(&self, pid: u32) -> Result<(), TerminationError> {
        unix::kill_tree(pid, self.process_table())
    }

    fn spawn_console(&self, request: &ConsoleRequest) -> io::Result<()> {
        unix::spawn_console(&self.console_command, request)
    }

    fn script_flavor(&self) -> ScriptFlavor {
        ScriptFlavor::Shell
    }
}

/// Parse `lsof -F pn` field output: a `p<pid>` line starts each process and
/// is followed by one `n<addr>:<port>` line per socket.
fn parse_lsof(output: &str) -> Vec<PortBinding> {
    let mut bindings = Vec::new();
    let mut current = None;
    for line in output.lines() {
        if let Some(pid) = line.strip_prefix('p') {
            current = pid.parse::<u32>().ok();
        } else if let Some(name) = line.strip_prefix('n')
            && let Some(pid) = current
            && let Some((_, port)) = name.rsplit_once(':')
            && let Ok(port) = port.parse::<u16>()
        {
            bindings.push(PortBinding {
                port,
                pid,
                state: SocketState::Listening,
            });
        }
    }
    bindings
}

fn split_pid(line: &str) -> Option<(u32, &str)> {
    let line = line.trim_start();
    let (pid, rest) = line.split_once(char::is_whitespace)?;
    Some((pid.parse().ok()?, rest.trim_start()))
}

fn parse_ps(names: &str, args: &str) -> Vec<ProcessHandle> {
    let command_lines: HashMap<u32, &str> = args
        .lines()
        .filter_map(split_pid)
        .map(|(pid, rest)| (pid, rest.trim_end()))
        .collect();

    names
        .lines()
        .filter_map(|line| {
            let (pid, rest) = split_pid(line)?;
            let (ppid, comm) = split_pid(rest)?;
            let comm = comm.trim_end();
            // comm is a full path on macOS.
            let display_name = comm.rsplit('/').next().unwrap_or(comm).to_string();
            Some(ProcessHandle {
                pid,
                parent_pid: ppid,
                command_line: command_lines.get(&pid).copied().unwrap_or_default().to_string(),
                display_name,
            })
        })
        .collect()
}
