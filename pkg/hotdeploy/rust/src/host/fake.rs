// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory [`Host`] with a fabricated process and socket table.
//!
//! Terminating a pid removes it and its descendants from the table along
//! with every socket they owned, so a second query observes the effect the
//! way it would on a real system.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    ConsoleRequest, Host, PortBinding, ProcessHandle, ScriptFlavor, SocketState, descendants,
};
use crate::errors::{HostError, TerminationError};

/// Side-effecting host call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Terminate(u32),
    Spawn(PathBuf),
}

#[derive(Debug, Default)]
struct FakeState {
    processes: Vec<ProcessHandle>,
    sockets: Vec<PortBinding>,
    terminated: Vec<u32>,
    spawned: Vec<ConsoleRequest>,
    calls: Vec<FakeCall>,
    protected: HashSet<u32>,
    socket_queries: usize,
    fail_socket_table: bool,
    fail_process_table: bool,
    fail_spawn: bool,
}

#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<FakeState>,
    current_pid: u32,
    flavor: ScriptFlavor,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            current_pid: std::process::id(),
            flavor: ScriptFlavor::Shell,
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_process(
        self,
        pid: u32,
        parent_pid: u32,
        display_name: &str,
        command_line: &str,
    ) -> Self {
        self.add_process(pid, parent_pid, display_name, command_line);
        self
    }

    pub fn with_listener(self, port: u16, pid: u32) -> Self {
        self.add_socket(PortBinding {
            port,
            pid,
            state: SocketState::Listening,
        });
        self
    }

    pub fn with_socket(self, binding: PortBinding) -> Self {
        self.add_socket(binding);
        self
    }

    pub fn with_current_pid(mut self, pid: u32) -> Self {
        self.current_pid = pid;
        self
    }

    pub fn with_flavor(mut self, flavor: ScriptFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Make `terminate_tree(pid)` fail with `PermissionDenied`.
    pub fn deny_termination(self, pid: u32) -> Self {
        self.state().protected.insert(pid);
        self
    }

    pub fn failing_socket_table(self) -> Self {
        self.state().fail_socket_table = true;
        self
    }

    pub fn failing_process_table(self) -> Self {
        self.state().fail_process_table = true;
        self
    }

    pub fn failing_spawn(self) -> Self {
        self.state().fail_spawn = true;
        self
    }

    pub fn add_process(&self, pid: u32, parent_pid: u32, display_name: &str, command_line: &str) {
        let mut state = self.state();
        state.processes.retain(|p| p.pid != pid);
        state.processes.push(ProcessHandle {
            pid,
            parent_pid,
            command_line: command_line.to_string(),
            display_name: display_name.to_string(),
        });
    }

    pub fn add_socket(&self, binding: PortBinding) {
        self.state().sockets.push(binding);
    }

    /// Pids passed to `terminate_tree` that were actually ended, in order.
    pub fn terminated(&self) -> Vec<u32> {
        self.state().terminated.clone()
    }

    pub fn spawned(&self) -> Vec<ConsoleRequest> {
        self.state().spawned.clone()
    }

    /// Successful terminations and spawns, interleaved in call order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state().calls.clone()
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.state().processes.iter().any(|p| p.pid == pid)
    }

    pub fn socket_queries(&self) -> usize {
        self.state().socket_queries
    }
}

impl Host for FakeHost {
    fn socket_table(&self) -> Result<Vec<PortBinding>, HostError> {
        let mut state = self.state();
        state.socket_queries += 1;
        if state.fail_socket_table {
            return Err(HostError::CommandStatus {
                command: "fake socket table".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(state.sockets.clone())
    }

    fn process_table(&self) -> Result<Vec<ProcessHandle>, HostError> {
        let state = self.state();
        if state.fail_process_table {
            return Err(HostError::Parse {
                what: "process table",
                context: "injected failure".to_string(),
            });
        }
        Ok(state.processes.clone())
    }

    fn terminate_tree(&self, pid: u32) -> Result<(), TerminationError> {
        let mut state = self.state();
        if state.protected.contains(&pid) {
            return Err(TerminationError::PermissionDenied { pid });
        }
        if !state.processes.iter().any(|p| p.pid == pid) {
            return Err(TerminationError::NotFound { pid });
        }
        let mut gone = descendants(&state.processes, pid);
        gone.push(pid);
        state.processes.retain(|p| !gone.contains(&p.pid));
        state.sockets.retain(|s| !gone.contains(&s.pid));
        state.terminated.push(pid);
        state.calls.push(FakeCall::Terminate(pid));
        Ok(())
    }

    fn spawn_console(&self, request: &ConsoleRequest) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_spawn {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no terminal available"));
        }
        state.spawned.push(request.clone());
        state.calls.push(FakeCall::Spawn(request.wrapper.clone()));
        Ok(())
    }

    fn script_flavor(&self) -> ScriptFlavor {
        self.flavor
    }

    fn current_pid(&self) -> u32 {
        self.current_pid
    }
}
