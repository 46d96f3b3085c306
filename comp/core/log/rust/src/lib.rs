// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Agent-style `log` backend.
//!
//! Every record is rendered on a single line using the agent log layout:
//!
//! ```text
//! 2026-10-19 08:15:02 UTC | HOTDEPLOY | INFO | (src/pipeline.rs:88 in hotdeploy::pipeline) | build succeeded
//! ```
//!
//! INFO, DEBUG and TRACE go to stdout, WARN and ERROR go to stderr. When a log
//! file is configured every line is also appended to it.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Debug)]
pub enum InitError {
    Io { path: PathBuf, source: io::Error },
    AlreadySet(log::SetLoggerError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Io { path, source } => {
                write!(f, "could not open log file {}: {source}", path.display())
            }
            InitError::AlreadySet(e) => write!(f, "logger already initialized: {e}"),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Io { source, .. } => Some(source),
            InitError::AlreadySet(e) => Some(e),
        }
    }
}

pub struct Builder {
    logger_name: String,
    level: LevelFilter,
    log_file: Option<PathBuf>,
}

impl Builder {
    pub fn new(logger_name: &str) -> Self {
        Self {
            logger_name: logger_name.to_ascii_uppercase(),
            level: LevelFilter::Info,
            log_file: None,
        }
    }

    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn log_file(mut self, path: Option<&Path>) -> Self {
        self.log_file = path.map(Path::to_path_buf);
        self
    }

    pub fn build(self) -> Result<AgentLogger, InitError> {
        let file = match self.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|source| InitError::Io { path, source })?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(AgentLogger {
            logger_name: self.logger_name,
            level: self.level,
            file,
        })
    }

    /// Build the logger and install it as the global `log` backend.
    pub fn init(self) -> Result<(), InitError> {
        let logger = self.build()?;
        let level = logger.level;
        log::set_boxed_logger(Box::new(logger)).map_err(InitError::AlreadySet)?;
        log::set_max_level(level);
        Ok(())
    }
}

pub struct AgentLogger {
    logger_name: String,
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl Log for AgentLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(&self.logger_name, record, OffsetDateTime::now_utc());

        // Console write failures (closed pipe, detached terminal) are not
        // reportable anywhere, so they are dropped.
        let _ = match record.level() {
            Level::Error | Level::Warn => writeln!(io::stderr().lock(), "{line}"),
            _ => writeln!(io::stdout().lock(), "{line}"),
        };

        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = writeln!(file, "{line}");
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Render one record in the agent log layout.
pub fn format_line(logger_name: &str, record: &Record, now: OffsetDateTime) -> String {
    let timestamp = now
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| String::from("0000-00-00 00:00:00"));

    let location = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("{file}:{line}"),
        (Some(file), None) => file.to_string(),
        _ => String::from("unknown"),
    };
    let module = record.module_path().unwrap_or("unknown");

    format!(
        "{timestamp} UTC | {logger_name} | {} | ({location} in {module}) | {}",
        record.level(),
        record.args()
    )
}

/// Parse a level name as accepted on the command line (`info`, `WARN`, `off`...).
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "none" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}
