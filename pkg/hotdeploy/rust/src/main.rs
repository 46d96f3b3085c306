// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hotdeploy::cli::Args;
use hotdeploy::config::ArchiverKind;
use hotdeploy::host::{self, Host};
use hotdeploy::launcher::CleanupScheduler;
use hotdeploy::pipeline::{EXIT_CONFIG, EXIT_INTERRUPTED};
use hotdeploy::toolchain::{Archiver, JarArchiver, JavacCompiler, ZipArchiver, discover_java_bin};
use hotdeploy::{Deployment, Orchestrator, PipelineReport, load_config};
use log::{LevelFilter, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

fn prepare(args: &Args, scheduler: CleanupScheduler) -> Result<Deployment> {
    let config = load_config(&args.config)?;
    config.validate()?;

    let java_bin = discover_java_bin(config.java_path.as_deref(), &config.java_version)?;
    let compiler = Box::new(JavacCompiler::new(&java_bin));
    let archiver: Box<dyn Archiver> = match config.archiver {
        ArchiverKind::Jar => Box::new(JarArchiver::new(&java_bin)),
        ArchiverKind::Builtin => Box::new(ZipArchiver),
    };
    let host: Arc<dyn Host> = Arc::from(host::native(config.console_command()));

    Ok(Deployment::new(config, host, compiler, archiver, scheduler))
}

fn summarize(report: &PipelineReport) {
    for result in &report.results {
        if result.ok {
            info!("[ok]     {}: {}", result.phase, result.message);
        } else {
            error!("[failed] {}: {}", result.phase, result.message);
        }
    }
    match report.failed_phase() {
        None => info!("deploy complete"),
        Some(phase) => error!("deploy failed during {phase}"),
    }
    if let Some(session) = &report.session {
        warn!(
            "console pid {} ({}) could not be closed; close it manually",
            session.pid, session.display_name
        );
    }
}

async fn run(args: &Args, scheduler: &CleanupScheduler) -> u8 {
    let deployment = match prepare(args, scheduler.clone()) {
        Ok(deployment) => deployment,
        Err(e) => {
            error!("{e:#}");
            return EXIT_CONFIG;
        }
    };

    tokio::select! {
        report = Orchestrator::new().run(&deployment) => {
            summarize(&report);
            report.exit_code()
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; the target may be partially staged, re-run the deploy to recover");
            EXIT_INTERRUPTED
        }
    }
}

/// Resolves once a line (or EOF) arrives on stdin. The read runs on a
/// detached thread so a pending read never holds up runtime shutdown.
fn stdin_line() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });
    rx
}

/// Returns true when `interrupt` fired before the acknowledgment.
async fn wait_for_ack(ack: impl Future, interrupt: impl Future) -> bool {
    tokio::select! {
        _ = ack => false,
        _ = interrupt => true,
    }
}

/// Keep the console open until the operator has read the output.
async fn pause() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(b"Press Enter to exit...").await;
    let _ = stdout.flush().await;
    if wait_for_ack(stdin_line(), tokio::signal::ctrl_c()).await {
        info!("interrupted at exit prompt");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = hotdeploy_log::parse_level(&args.log_level);
    if let Err(e) = hotdeploy_log::Builder::new("HOTDEPLOY")
        .level(level.unwrap_or(LevelFilter::Info))
        .log_file(args.log_file.as_deref())
        .init()
    {
        let _ = writeln!(std::io::stderr(), "hotdeploy: cannot initialize logging: {e}");
        return ExitCode::from(EXIT_CONFIG);
    }
    if level.is_none() {
        warn!("unknown log level '{}', using info", args.log_level);
    }
    info!("hotdeploy starting (version {})", env!("CARGO_PKG_VERSION"));

    let scheduler = CleanupScheduler::new();
    let code = run(&args, &scheduler).await;

    if !args.no_pause {
        pause().await;
    }
    scheduler.shutdown().await;
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_ends_pause_without_input() {
        let interrupted = wait_for_ack(std::future::pending::<()>(), async {}).await;
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_acknowledgment_ends_pause() {
        let (tx, rx) = oneshot::channel::<()>();
        tx.send(()).unwrap();
        let interrupted = wait_for_ack(rx, std::future::pending::<()>()).await;
        assert!(!interrupted);
    }
}
