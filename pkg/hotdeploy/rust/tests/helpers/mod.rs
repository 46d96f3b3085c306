// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use hotdeploy::host::fake::FakeHost;
use hotdeploy::launcher::CleanupScheduler;
use hotdeploy::toolchain::{Compiler, FakeCompiler, ZipArchiver};
use hotdeploy::{DeployConfig, Deployment};

pub const SERVICE_PORT: u16 = 9933;
pub const WRAPPER_NAME: &str = "hotdeploy-console";

/// A project tree and a service installation in a scratch directory.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Lay out `sources` Java files under `project/src` and an `SFS2X` service
    /// home with one library jar and a start script.
    pub fn new(sources: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for i in 0..sources {
            let path = root.join(format!("project/src/com/example/Class{i}.java"));
            write(&path, &format!("package com.example; class Class{i} {{}}"));
        }
        write(&root.join("server/SFS2X/lib/sfs2x.jar"), "jar");
        write(&root.join("server/SFS2X/start.sh"), "#!/bin/sh\nexec java -jar sfs2x.jar\n");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root().join("project")
    }

    pub fn extension_dir(&self) -> PathBuf {
        self.root().join("server/SFS2X/extensions/slots")
    }

    pub fn wrapper_path(&self) -> PathBuf {
        self.root().join(format!("server/{WRAPPER_NAME}.sh"))
    }

    pub fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source_dir": self.source_dir(),
            "target_dir": self.root().join("server"),
            "extension_folder": "slots",
            "extension_file": "slots.jar",
            "start_script": "start.sh",
            "service_port": SERVICE_PORT,
            "lock_release_delay_secs": 0,
            "wrapper_grace_secs": 0,
            "wrapper_name": WRAPPER_NAME,
            "console_signatures": [WRAPPER_NAME],
            "archiver": "builtin",
        })
    }

    pub fn config(&self) -> DeployConfig {
        serde_json::from_value(self.config_json()).unwrap()
    }

    pub fn write_config(&self, config: &serde_json::Value) -> PathBuf {
        let path = self.root().join("hotdeploy.json");
        fs::write(&path, serde_json::to_vec_pretty(config).unwrap()).unwrap();
        path
    }

    /// Files directly inside the extension directory, sorted by name.
    pub fn staged_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.extension_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Every file under the source tree with the given extension.
    pub fn files_with_extension(&self, extension: &str) -> Vec<PathBuf> {
        walk(&self.source_dir())
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == extension))
            .collect()
    }
}

pub fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(walk(&path));
        } else {
            files.push(path);
        }
    }
    files
}

pub fn deployment(
    config: DeployConfig,
    host: Arc<FakeHost>,
    compiler: Box<dyn Compiler>,
    scheduler: CleanupScheduler,
) -> Deployment {
    Deployment::new(config, host, compiler, Box::new(ZipArchiver), scheduler)
}

pub fn fake_compiler() -> Box<dyn Compiler> {
    Box::new(FakeCompiler::new())
}

/// A service on `SERVICE_PORT` running inside a wrapper console, started
/// from a desktop terminal:
///
/// ```text
/// 1 init ─ 10 xterm ─ 20 sh hotdeploy-console.sh ─ 30 java
/// ```
pub fn host_with_running_service() -> FakeHost {
    FakeHost::new()
        .with_process(1, 0, "init", "/sbin/init")
        .with_process(10, 1, "xterm", "xterm")
        .with_process(20, 10, "sh", &format!("sh /srv/server/{WRAPPER_NAME}.sh"))
        .with_process(30, 20, "java", "java -jar sfs2x.jar")
        .with_listener(SERVICE_PORT, 30)
}

/// Run the `hotdeploy` binary to completion.
pub fn run_binary(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hotdeploy"))
        .args(args)
        .env_remove("HOTDEPLOY_LOG_LEVEL")
        .stdin(Stdio::null())
        .output()
        .expect("failed to run hotdeploy")
}
