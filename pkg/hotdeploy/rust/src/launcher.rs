// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Service relaunch in a fresh console.
//!
//! The console runs a small wrapper script rather than the start script
//! directly, so that when the service stops the console prints a banner and
//! waits instead of vanishing with the last log lines. The wrapper is deleted
//! after a grace period; by then the console has already read it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::errors::LaunchError;
use crate::host::{ConsoleRequest, Host, ScriptFlavor};

const RULE: &str = "========================================";

/// Deferred wrapper removal.
///
/// Each scheduled removal is a task that fires after its delay unless the
/// scheduler is shut down first. A cancelled removal leaves the file behind;
/// the next deploy writes the same path again.
#[derive(Debug, Clone, Default)]
pub struct CleanupScheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete `path` after `delay`. Must be called from within a tokio runtime.
    pub fn schedule(&self, path: PathBuf, delay: Duration) {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("removal of {} cancelled", path.display());
                }
                _ = tokio::time::sleep(delay) => {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => debug!("removed {}", path.display()),
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => warn!("could not remove {}: {e}", path.display()),
                    }
                }
            }
        });
    }

    /// Number of removals not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every scheduled removal to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding removals and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.token.cancel();
        self.tracker.wait().await;
    }
}

/// Quote `value` for a POSIX shell.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Wrapper script text for `flavor`.
pub fn render_wrapper(
    flavor: ScriptFlavor,
    title: &str,
    start_command: &Path,
    working_dir: &Path,
) -> String {
    let start = start_command.display().to_string();
    let dir = working_dir.display().to_string();
    match flavor {
        ScriptFlavor::Batch => {
            let lines = [
                "@echo off".to_string(),
                format!("title {title}"),
                "echo.".to_string(),
                format!("echo {RULE}"),
                format!("echo   {title}"),
                "echo   Starting server with logs...".to_string(),
                format!("echo {RULE}"),
                "echo.".to_string(),
                format!("cd /d \"{dir}\""),
                format!("call \"{start}\""),
                "echo.".to_string(),
                format!("echo {RULE}"),
                "echo   Server stopped. Press any key to close.".to_string(),
                format!("echo {RULE}"),
                "pause".to_string(),
            ];
            let mut script = lines.join("\r\n");
            script.push_str("\r\n");
            script
        }
        ScriptFlavor::Shell => {
            let lines = [
                "#!/bin/sh".to_string(),
                format!("printf '\\033]0;%s\\007' {}", sh_quote(title)),
                "echo".to_string(),
                format!("echo '{RULE}'"),
                format!("echo {}", sh_quote(&format!("  {title}"))),
                "echo '  Starting server with logs...'".to_string(),
                format!("echo '{RULE}'"),
                "echo".to_string(),
                format!("cd {} || exit 1", sh_quote(&dir)),
                format!("sh {}", sh_quote(&start)),
                "echo".to_string(),
                format!("echo '{RULE}'"),
                "echo '  Server stopped. Press Enter to close.'".to_string(),
                format!("echo '{RULE}'"),
                "read _".to_string(),
            ];
            let mut script = lines.join("\n");
            script.push('\n');
            script
        }
    }
}

pub struct Launcher {
    host: Arc<dyn Host>,
    scheduler: CleanupScheduler,
    title: String,
    grace: Duration,
}

impl Launcher {
    pub fn new(
        host: Arc<dyn Host>,
        scheduler: CleanupScheduler,
        title: String,
        grace: Duration,
    ) -> Self {
        Self {
            host,
            scheduler,
            title,
            grace,
        }
    }

    /// Write the wrapper to `wrapper_path` and open a console running it.
    /// Returns once the console is spawned; the service may still be starting.
    pub async fn launch(
        &self,
        start_command: &Path,
        working_dir: &Path,
        wrapper_path: &Path,
    ) -> Result<(), LaunchError> {
        let flavor = self.host.script_flavor();
        let script = render_wrapper(flavor, &self.title, start_command, working_dir);
        tokio::fs::write(wrapper_path, script)
            .await
            .map_err(|source| LaunchError::Wrapper {
                path: wrapper_path.to_path_buf(),
                source,
            })?;
        debug!("wrote {} wrapper {}", flavor.extension(), wrapper_path.display());

        let console_dir = wrapper_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| working_dir.to_path_buf());
        let request = ConsoleRequest {
            wrapper: wrapper_path.to_path_buf(),
            working_dir: console_dir,
            title: self.title.clone(),
        };

        if let Err(source) = self.host.spawn_console(&request) {
            if let Err(e) = tokio::fs::remove_file(wrapper_path).await {
                debug!("could not remove unused wrapper {}: {e}", wrapper_path.display());
            }
            return Err(LaunchError::Spawn {
                command: format!("console running {}", wrapper_path.display()),
                source,
            });
        }

        info!(
            "service console launched ({} in {})",
            start_command.display(),
            working_dir.display()
        );
        self.scheduler.schedule(wrapper_path.to_path_buf(), self.grace);
        Ok(())
    }
}
