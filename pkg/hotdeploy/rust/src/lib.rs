// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing,
        clippy::cast_possible_wrap
    )
)]

pub mod cli;
pub mod config;
pub mod errors;
pub mod host;
pub mod launcher;
pub mod pipeline;
pub mod resolver;
pub mod sources;
pub mod stage;
pub mod state;
pub mod terminator;
pub mod toolchain;
pub mod tracer;

pub use config::{DeployConfig, load_config};
pub use pipeline::{Deployment, Orchestrator, PhaseResult, PipelineReport, SessionSlot};
pub use state::{Phase, PipelineState};
