// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Fail-fast Build → Stage → Restart → Cleanup sequencing.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::{error, info, warn};

use crate::config::DeployConfig;
use crate::errors::TerminationError;
use crate::host::Host;
use crate::launcher::{CleanupScheduler, Launcher};
use crate::state::{Phase, PipelineState};
use crate::toolchain::{Archiver, CompileRequest, Compiler};
use crate::tracer::{ConsoleSignatures, SessionHandle};
use crate::{resolver, sources, stage, terminator, tracer};

pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResult {
    pub phase: Phase,
    pub ok: bool,
    pub message: String,
}

/// The console currently believed to host the service. Tracking a new
/// session replaces the previous one.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Option<SessionHandle>,
}

impl SessionSlot {
    pub fn replace(&mut self, session: SessionHandle) -> Option<SessionHandle> {
        let previous = self.current.replace(session);
        if let Some(prev) = &previous {
            info!("no longer tracking console pid {}", prev.pid);
        }
        previous
    }

    pub fn take(&mut self) -> Option<SessionHandle> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }
}

/// The four deploy phases. Each returns a summary on success.
#[async_trait]
pub trait DeployPhases: Send + Sync {
    async fn build(&self) -> Result<String>;
    async fn stage(&self) -> Result<String>;
    async fn restart(&self, slot: &mut SessionSlot) -> Result<String>;
    async fn cleanup(&self) -> Result<String>;
}

#[derive(Debug)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub results: Vec<PhaseResult>,
    /// Console left tracked after the run, if termination did not succeed.
    pub session: Option<SessionHandle>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        match self.state {
            PipelineState::Failed(phase) => Some(phase),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self.state {
            PipelineState::Done => 0,
            PipelineState::Failed(Phase::Build) => 2,
            PipelineState::Failed(Phase::Stage) => 3,
            PipelineState::Failed(Phase::Restart) => 4,
            PipelineState::Failed(Phase::Cleanup) => 5,
            // A run that never reached a terminal state.
            _ => EXIT_CONFIG,
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    state: PipelineState,
    slot: SessionSlot,
    results: Vec<PhaseResult>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            slot: SessionSlot::default(),
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            error!("illegal pipeline transition {} -> {next}", self.state);
            return;
        }
        self.state = next;
    }

    /// Run every phase in order, stopping at the first failure.
    pub async fn run(mut self, phases: &dyn DeployPhases) -> PipelineReport {
        for phase in Phase::ALL {
            self.transition(phase.running_state());
            info!("phase {phase} starting");
            let outcome = match phase {
                Phase::Build => phases.build().await,
                Phase::Stage => phases.stage().await,
                Phase::Restart => phases.restart(&mut self.slot).await,
                Phase::Cleanup => phases.cleanup().await,
            };
            match outcome {
                Ok(message) => {
                    info!("phase {phase} succeeded: {message}");
                    self.results.push(PhaseResult {
                        phase,
                        ok: true,
                        message,
                    });
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    error!("phase {phase} failed: {message}");
                    self.results.push(PhaseResult {
                        phase,
                        ok: false,
                        message,
                    });
                    self.transition(PipelineState::Failed(phase));
                    return self.finish();
                }
            }
        }
        self.transition(PipelineState::Done);
        self.finish()
    }

    fn finish(mut self) -> PipelineReport {
        PipelineReport {
            state: self.state,
            results: self.results,
            session: self.slot.take(),
        }
    }
}

/// The real phases, wired to a host and the JDK collaborators.
pub struct Deployment {
    config: DeployConfig,
    host: Arc<dyn Host>,
    compiler: Box<dyn Compiler>,
    archiver: Box<dyn Archiver>,
    launcher: Launcher,
    signatures: ConsoleSignatures,
}

impl Deployment {
    pub fn new(
        config: DeployConfig,
        host: Arc<dyn Host>,
        compiler: Box<dyn Compiler>,
        archiver: Box<dyn Archiver>,
        scheduler: CleanupScheduler,
    ) -> Self {
        let launcher = Launcher::new(
            host.clone(),
            scheduler,
            config.console_title.clone(),
            config.wrapper_grace(),
        );
        let signatures = ConsoleSignatures::new(config.console_signatures());
        Self {
            config,
            host,
            compiler,
            archiver,
            launcher,
            signatures,
        }
    }

    /// Stop the console hosting whatever listens on the service port.
    /// Returns whether anything was terminated.
    fn stop_previous_instance(&self, slot: &mut SessionSlot) -> bool {
        let port = self.config.service_port;
        let host = self.host.as_ref();

        let Some(binding) = resolver::resolve(host, port) else {
            info!("nothing listening on port {port}, no previous instance to stop");
            return false;
        };
        let Some(session) = tracer::trace_session_for(host, binding.pid, &self.signatures) else {
            warn!(
                "pid {} on port {port} has no console ancestor matching {:?}; leaving it running",
                binding.pid,
                self.config.console_signatures()
            );
            return false;
        };

        slot.replace(session.clone());
        match terminator::terminate(host, &session) {
            Ok(()) => {
                slot.take();
                true
            }
            Err(TerminationError::GuardRefused { pid }) => {
                warn!("console pid {pid} hosts this tool; it was left running");
                false
            }
            Err(e) => {
                warn!("{e}; continuing, the old console may still be open");
                false
            }
        }
    }
}

#[async_trait]
impl DeployPhases for Deployment {
    async fn build(&self) -> Result<String> {
        let src = self.config.src_dir();
        let removed = sources::remove_class_files(&src);
        if removed > 0 {
            info!("removed {removed} stale class file(s)");
        }

        let files = sources::find_sources(&src);
        if files.is_empty() {
            bail!("no .java files under {}", src.display());
        }
        info!("found {} source file(s)", files.len());

        let classpath = sources::build_classpath(
            &self.config.service_lib_dir(),
            &self.config.classpath_fallback,
        );
        let count = files.len();
        self.compiler
            .compile(&CompileRequest {
                working_dir: src.clone(),
                sources: files,
                classpath,
                output_dir: src.clone(),
            })
            .await?;

        let artifact = self.config.artifact_path();
        self.archiver.archive(&src, &artifact).await?;
        Ok(format!(
            "compiled {count} source file(s) into {}",
            artifact.display()
        ))
    }

    async fn stage(&self) -> Result<String> {
        let report = stage::stage(&self.config)?;
        Ok(format!(
            "staged {} into {} ({} side-car file(s), {} missing)",
            self.config.extension_file,
            report.target_dir.display(),
            report.sidecars_copied.len(),
            report.sidecars_missing.len()
        ))
    }

    async fn restart(&self, slot: &mut SessionSlot) -> Result<String> {
        let stopped = self.stop_previous_instance(slot);
        if stopped {
            let delay = self.config.lock_release_delay();
            info!("waiting {}s for file locks to release", delay.as_secs());
            tokio::time::sleep(delay).await;
        }

        let wrapper = self.config.wrapper_path(self.host.script_flavor());
        self.launcher
            .launch(
                &self.config.start_script_path(),
                &self.config.service_home_dir(),
                &wrapper,
            )
            .await?;
        Ok(if stopped {
            "previous console terminated, service relaunched".to_string()
        } else {
            "service launched".to_string()
        })
    }

    async fn cleanup(&self) -> Result<String> {
        let report = stage::cleanup(&self.config);
        Ok(format!(
            "removed {} class file(s) and {} artifact(s)",
            report.class_files, report.artifacts
        ))
    }
}
