// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{tool} failed: {diagnostic}")]
    ToolInvocationFailed { tool: String, diagnostic: String },

    #[error("staging failed for {}: {source}", path.display())]
    StagingIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure of a socket-table or process-table query.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("could not run {command}: {source}")]
    Command {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandStatus {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse {what}: {context}")]
    Parse { what: &'static str, context: String },
}

#[derive(Error, Debug)]
pub enum TerminationError {
    #[error("refusing to terminate pid {pid}: it is this process or one of its ancestors")]
    GuardRefused { pid: u32 },

    #[error("permission denied terminating pid {pid}")]
    PermissionDenied { pid: u32 },

    #[error("pid {pid} not found")]
    NotFound { pid: u32 },

    #[error("could not terminate pid {pid}: {message}")]
    Failed { pid: u32, message: String },
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("could not write wrapper {}: {source}", path.display())]
    Wrapper {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not spawn console `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}
