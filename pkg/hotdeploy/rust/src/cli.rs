// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug, Clone)]
#[command(name = "hotdeploy")]
#[command(about = "Build, stage and restart a service extension in one step")]
#[command(version)]
pub struct Args {
    /// Deploy descriptor (.json, .yaml or .yml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, env = "HOTDEPLOY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also append log lines to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Exit immediately instead of waiting for Enter
    #[arg(long)]
    pub no_pause: bool,
}
