// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Signal-based termination and console spawning shared by the Unix hosts.

use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use super::{ConsoleRequest, ProcessHandle, descendants};
use crate::errors::{HostError, TerminationError};

fn to_pid(pid: u32) -> Result<Pid, TerminationError> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| TerminationError::Failed {
            pid,
            message: "pid out of range".to_string(),
        })
}

/// SIGKILL `root`, then every descendant found in `table`. The root goes
/// first so it cannot fork replacements for children being killed.
pub(super) fn kill_tree(
    root: u32,
    table: Result<Vec<ProcessHandle>, HostError>,
) -> Result<(), TerminationError> {
    let children = match table {
        Ok(table) => descendants(&table, root),
        Err(e) => {
            warn!("process table unavailable, killing pid {root} alone: {e}");
            Vec::new()
        }
    };

    match kill(to_pid(root)?, Signal::SIGKILL) {
        Ok(()) => info!("sent SIGKILL to pid {root}"),
        Err(Errno::ESRCH) => return Err(TerminationError::NotFound { pid: root }),
        Err(Errno::EPERM) => return Err(TerminationError::PermissionDenied { pid: root }),
        Err(e) => {
            return Err(TerminationError::Failed {
                pid: root,
                message: e.to_string(),
            });
        }
    }

    for child in children {
        match kill(to_pid(child)?, Signal::SIGKILL) {
            Ok(()) => debug!("sent SIGKILL to descendant pid {child}"),
            Err(Errno::ESRCH) => debug!("descendant pid {child} already gone"),
            Err(e) => warn!("could not kill descendant pid {child}: {e}"),
        }
    }
    Ok(())
}

/// Run `sh <wrapper>` behind the configured terminal prefix, in its own
/// process group so the operator's Ctrl-C does not reach it.
pub(super) fn spawn_console(
    console_command: &[String],
    request: &ConsoleRequest,
) -> io::Result<()> {
    let mut argv: Vec<OsString> = console_command.iter().map(OsString::from).collect();
    argv.push(OsString::from("sh"));
    argv.push(request.wrapper.clone().into_os_string());

    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty console command"));
    };

    let mut child = Command::new(program)
        .args(args)
        .current_dir(&request.working_dir)
        .stdin(Stdio::null())
        .process_group(0)
        .spawn()?;

    info!(
        "console spawned (pid={}, cmd={})",
        child.id(),
        program.to_string_lossy()
    );

    // Reap the console when it eventually closes.
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}
