// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Linux host backed by procfs.
//!
//! Socket ownership is recovered the same way `ss -p` does it: the socket
//! tables in `net/tcp{,6}` give `local port → inode`, and the `fd` links of
//! every process give `inode → pid`. Sockets in TIME_WAIT carry inode 0 and
//! have no owner, so they never produce a binding.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{
    ConsoleRequest, Host, PortBinding, ProcessHandle, ScriptFlavor, SocketState,
    orphan_reused_parents, unix,
};
use crate::errors::{HostError, TerminationError};

type Ino = u64;

const TCP_LISTEN: u8 = 0x0A;
const SOCKET_TABLES: [&str; 2] = ["tcp", "tcp6"];

fn default_root() -> PathBuf {
    std::env::var("HOST_PROC")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/proc"))
}

pub struct ProcfsHost {
    root: PathBuf,
    console_command: Vec<String>,
}

impl ProcfsHost {
    pub fn new(console_command: Vec<String>) -> Self {
        Self::with_root(default_root(), console_command)
    }

    pub fn with_root(root: PathBuf, console_command: Vec<String>) -> Self {
        Self {
            root,
            console_command,
        }
    }

    fn pid_dirs(&self) -> Result<Vec<(u32, PathBuf)>, HostError> {
        let entries = fs::read_dir(&self.root).map_err(|source| HostError::Read {
            path: self.root.clone(),
            source,
        })?;
        let mut pids: Vec<(u32, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let pid = entry.file_name().to_str()?.parse::<u32>().ok()?;
                Some((pid, entry.path()))
            })
            .collect();
        pids.sort_by_key(|(pid, _)| *pid);
        Ok(pids)
    }

    /// Map socket inodes to the pid holding them open. Processes we are not
    /// allowed to inspect, or that exit mid-scan, are skipped.
    fn socket_owners(&self) -> Result<HashMap<Ino, u32>, HostError> {
        let mut owners = HashMap::new();
        for (pid, dir) in self.pid_dirs()? {
            let Ok(fds) = fs::read_dir(dir.join("fd")) else {
                continue;
            };
            for fd in fds.filter_map(Result::ok) {
                let Ok(link) = fs::read_link(fd.path()) else {
                    continue;
                };
                if let Some(inode) = socket_inode(&link) {
                    owners.entry(inode).or_insert(pid);
                }
            }
        }
        Ok(owners)
    }
}

impl Host for ProcfsHost {
    fn socket_table(&self) -> Result<Vec<PortBinding>, HostError> {
        let mut sockets = Vec::new();
        let mut readable = 0;
        for table in SOCKET_TABLES {
            let path = self.root.join("net").join(table);
            match read_socket_table(&path) {
                Ok(rows) => {
                    readable += 1;
                    sockets.extend(rows);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} not present", path.display());
                }
                Err(source) => return Err(HostError::Read { path, source }),
            }
        }
        if readable == 0 {
            return Err(HostError::Read {
                path: self.root.join("net").join("tcp"),
                source: io::Error::new(io::ErrorKind::NotFound, "no TCP socket table"),
            });
        }

        let owners = self.socket_owners()?;
        let mut bindings = Vec::new();
        for socket in sockets {
            match owners.get(&socket.inode) {
                Some(&pid) => bindings.push(PortBinding {
                    port: socket.port,
                    pid,
                    state: socket.state(),
                }),
                None if socket.state() == SocketState::Listening => warn!(
                    "port {} is listening but its owner is not visible (inode {}); insufficient permissions?",
                    socket.port, socket.inode
                ),
                None => {}
            }
        }
        Ok(bindings)
    }

    fn process_table(&self) -> Result<Vec<ProcessHandle>, HostError> {
        let mut table = Vec::new();
        let mut started = HashMap::new();
        for (pid, dir) in self.pid_dirs()? {
            // The process may exit between listing and reading.
            let Ok(stat) = fs::read_to_string(dir.join("stat")) else {
                continue;
            };
            let Some(stat) = parse_stat(&stat) else {
                debug!("unparseable stat for pid {pid}");
                continue;
            };
            let command_line = fs::read(dir.join("cmdline"))
                .map(|raw| parse_cmdline(&raw))
                .unwrap_or_default();
            if let Some(start_time) = stat.start_time {
                started.insert(pid, start_time);
            }
            table.push(ProcessHandle {
                pid,
                parent_pid: stat.parent_pid,
                command_line,
                display_name: stat.comm,
            });
        }
        // The table is not read atomically, so a parent can exit and have its
        // pid reused while the walk is in progress.
        orphan_reused_parents(&mut table, &started);
        Ok(table)
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

#[derive(Debug, PartialEq, Eq)]
struct SocketRow {
    port: u16,
    state: u8,
    inode: Ino,
}

impl SocketRow {
    fn state(&self) -> SocketState {
        if self.state == TCP_LISTEN {
            SocketState::Listening
        } else {
            SocketState::Other
        }
    }
}

fn read_socket_table(path: &Path) -> io::Result<Vec<SocketRow>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut rows = Vec::new();
    // First line is the column header.
    for line in reader.lines().skip(1) {
        let line = line?;
        match parse_socket_line(&line) {
            Some(row) => rows.push(row),
            None => debug!("skipping malformed socket line in {}: {line}", path.display()),
        }
    }
    Ok(rows)
}

fn get_fields(line: &str) -> Option<(&str, &str, &str)> {
    let mut iter = line.split_whitespace();
    let local_address = iter.nth(1)?; // field 1: local address
    let state = iter.nth(1)?; // field 3: state (skip field 2)
    let inode = iter.nth(5)?; // field 9: inode (skip fields 4-8)
    Some((local_address, state, inode))
}

fn parse_socket_line(line: &str) -> Option<SocketRow> {
    let (local_address, state, inode) = get_fields(line)?;
    let state = u8::from_str_radix(state, 16).ok()?;
    let (_, port) = local_address.rsplit_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let inode = inode.parse::<Ino>().ok()?;
    Some(SocketRow { port, state, inode })
}

/// `socket:[12345]` → 12345
fn socket_inode(link: &Path) -> Option<Ino> {
    link.to_str()?
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[derive(Debug, PartialEq, Eq)]
struct StatFields {
    comm: String,
    parent_pid: u32,
    /// Clock ticks since boot (field 22).
    start_time: Option<u64>,
}

/// Extract comm, ppid and start time from `/proc/<pid>/stat`. The command name is
/// wrapped in parentheses and may itself contain spaces or parentheses, so
/// the fields after it are located from the last `)`.
fn parse_stat(stat: &str) -> Option<StatFields> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let comm = stat.get(open + 1..close)?.to_string();
    // Fields after the command name start at field 3 (state).
    let mut rest = stat.get(close + 1..)?.split_whitespace();
    let _state = rest.next()?;
    let parent_pid = rest.next()?.parse().ok()?;
    let start_time = rest.nth(17).and_then(|field| field.parse().ok());
    Some(StatFields {
        comm,
        parent_pid,
        start_time,
    })
}

fn parse_cmdline(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .replace('\0', " ")
}
