// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process ancestry tracing.
//!
//! The service process is not what the operator sees; the console that
//! started it is. Given the service pid, walk parent links until the first
//! ancestor that looks like a console host.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, info, warn};

use crate::host::{Host, ProcessHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    ConsoleHost,
    Unknown,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::ConsoleHost => write!(f, "console host"),
            SessionKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// The console presumed to host the service. `display_name` is recorded at
/// trace time so a reused pid can be told apart later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub pid: u32,
    pub kind: SessionKind,
    pub display_name: String,
}

/// Case-insensitive markers identifying console-host processes.
#[derive(Debug, Clone)]
pub struct ConsoleSignatures {
    signatures: Vec<String>,
}

impl ConsoleSignatures {
    pub fn new(signatures: Vec<String>) -> Self {
        let signatures = signatures
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { signatures }
    }

    /// The signature `process` matches, if any: its display name equals the
    /// signature, or its command line contains it.
    pub fn matching(&self, process: &ProcessHandle) -> Option<&str> {
        let command_line = process.command_line.to_lowercase();
        self.signatures
            .iter()
            .find(|sig| {
                process.display_name.eq_ignore_ascii_case(sig)
                    || command_line.contains(sig.as_str())
            })
            .map(String::as_str)
    }

    pub fn classify(&self, process: &ProcessHandle) -> SessionKind {
        if self.matching(process).is_some() {
            SessionKind::ConsoleHost
        } else {
            SessionKind::Unknown
        }
    }
}

/// Nearest console-host ancestor of `pid`, from a fresh process table.
///
/// `pid` itself is never a candidate. The walk ends at pid 0, at a process
/// that is its own parent, at a parent missing from the table, or on a
/// cycle.
pub fn trace_session_for(
    host: &dyn Host,
    pid: u32,
    signatures: &ConsoleSignatures,
) -> Option<SessionHandle> {
    let table = match host.process_table() {
        Ok(table) => table,
        Err(e) => {
            warn!("process table query failed, cannot trace pid {pid}: {e}");
            return None;
        }
    };
    let by_pid: HashMap<u32, &ProcessHandle> = table.iter().map(|p| (p.pid, p)).collect();

    let Some(service) = by_pid.get(&pid) else {
        info!("pid {pid} exited before it could be traced");
        return None;
    };
    debug!("tracing console for pid {pid} ({})", service.display_name);

    let mut visited = HashSet::from([pid]);
    let mut current = service.parent_pid;
    loop {
        if current == 0 {
            debug!("reached pid 0 without finding a console");
            return None;
        }
        if !visited.insert(current) {
            warn!("parent cycle detected at pid {current} while tracing pid {pid}");
            return None;
        }
        let Some(ancestor) = by_pid.get(&current) else {
            debug!("parent pid {current} is not in the process table");
            return None;
        };
        if let Some(signature) = signatures.matching(ancestor) {
            info!(
                "pid {pid} is hosted by console pid {} ({}, matched '{signature}')",
                ancestor.pid, ancestor.display_name
            );
            return Some(SessionHandle {
                pid: ancestor.pid,
                kind: SessionKind::ConsoleHost,
                display_name: ancestor.display_name.clone(),
            });
        }
        if ancestor.parent_pid == ancestor.pid {
            return None;
        }
        current = ancestor.parent_pid;
    }
}
