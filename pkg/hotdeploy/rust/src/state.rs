// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Build,
    Stage,
    Restart,
    Cleanup,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Build, Phase::Stage, Phase::Restart, Phase::Cleanup];

    /// State the pipeline is in while this phase runs.
    pub fn running_state(self) -> PipelineState {
        match self {
            Phase::Build => PipelineState::Building,
            Phase::Stage => PipelineState::Staging,
            Phase::Restart => PipelineState::Restarting,
            Phase::Cleanup => PipelineState::CleaningUp,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Build => write!(f, "build"),
            Phase::Stage => write!(f, "stage"),
            Phase::Restart => write!(f, "restart"),
            Phase::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has run yet.
    Idle,
    Building,
    Staging,
    Restarting,
    CleaningUp,
    /// Every phase succeeded.
    Done,
    /// The named phase failed; later phases never ran.
    Failed(Phase),
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Building)
            | (Building, Staging)
            | (Staging, Restarting)
            | (Restarting, CleaningUp)
            | (CleaningUp, Done) => true,
            (Building, Failed(Phase::Build))
            | (Staging, Failed(Phase::Stage))
            | (Restarting, Failed(Phase::Restart))
            | (CleaningUp, Failed(Phase::Cleanup)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Building => write!(f, "building"),
            PipelineState::Staging => write!(f, "staging"),
            PipelineState::Restarting => write!(f, "restarting"),
            PipelineState::CleaningUp => write!(f, "cleaning up"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(phase) => write!(f, "failed ({phase})"),
        }
    }
}
