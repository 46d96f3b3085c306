// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Port-to-process resolution.

use log::{debug, info, warn};

use crate::host::{Host, PortBinding, SocketState};

/// Find the process listening on `port`.
///
/// Returns `None` when nothing listens there, and also when the socket table
/// cannot be queried: a restart then proceeds as if no prior instance ran.
/// The returned pid is a snapshot and must be re-validated before use.
pub fn resolve(host: &dyn Host, port: u16) -> Option<PortBinding> {
    let table = match host.socket_table() {
        Ok(table) => table,
        Err(e) => {
            warn!("socket table query failed, assuming nothing listens on port {port}: {e}");
            return None;
        }
    };

    let listeners: Vec<PortBinding> = table
        .into_iter()
        .filter(|row| row.port == port && row.state == SocketState::Listening)
        .collect();

    let first = *listeners.first()?;

    let mut owners: Vec<u32> = listeners.iter().map(|row| row.pid).collect();
    owners.sort_unstable();
    owners.dedup();
    if owners.len() > 1 {
        warn!(
            "port {port} has listeners in {} processes {owners:?}; using pid {}",
            owners.len(),
            first.pid
        );
    } else {
        debug!("port {port} has {} listening socket(s)", listeners.len());
    }

    info!("port {port} is owned by pid {}", first.pid);
    Some(first)
}
