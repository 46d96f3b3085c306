// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::errors::DeployError;
use crate::host::ScriptFlavor;
use crate::sources;

pub const DEFAULT_CONFIG_FILE: &str = "hotdeploy.json";
pub const DEFAULT_SERVICE_PORT: u16 = 9933;

fn default_java_version() -> String {
    "11".to_string()
}

fn default_source_subdir() -> String {
    "src".to_string()
}

fn default_sidecar_extension() -> String {
    "json".to_string()
}

fn default_service_home() -> String {
    "SFS2X".to_string()
}

fn default_lib_dir() -> String {
    "lib".to_string()
}

fn default_extensions_dir() -> String {
    "extensions".to_string()
}

fn default_required_libs() -> Vec<String> {
    vec!["sfs2x.jar".to_string(), "sfs2x-core.jar".to_string()]
}

fn default_classpath_fallback() -> Vec<String> {
    ["sfs2x.jar", "sfs2x-core.jar", "sfs2x-api.jar", "slf4j-api*.jar", "logback*.jar"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_service_port() -> u16 {
    DEFAULT_SERVICE_PORT
}

fn default_lock_release_delay_secs() -> u64 {
    3
}

fn default_wrapper_grace_secs() -> u64 {
    5
}

fn default_wrapper_name() -> String {
    "hotdeploy-console".to_string()
}

fn default_console_title() -> String {
    "Hot Deploy".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiverKind {
    /// The JDK `jar` tool.
    #[default]
    Jar,
    /// In-process zip writer.
    Builtin,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// JDK `bin` directory. Discovered when absent.
    pub java_path: Option<PathBuf>,
    #[serde(default = "default_java_version")]
    pub java_version: String,

    pub source_dir: PathBuf,
    #[serde(default = "default_source_subdir")]
    pub source_subdir: String,

    pub target_dir: PathBuf,
    pub extension_folder: String,
    pub extension_file: String,

    /// Also accepted as `json_source_dir`, the key used by older descriptors.
    #[serde(alias = "json_source_dir")]
    pub sidecar_dir: Option<PathBuf>,
    #[serde(default, alias = "deploy_json_files")]
    pub sidecar_files: Vec<String>,
    #[serde(default = "default_sidecar_extension")]
    pub sidecar_extension: String,

    #[serde(default = "default_service_home")]
    pub service_home: String,
    pub start_script: Option<String>,
    #[serde(default = "default_lib_dir")]
    pub lib_dir: String,
    #[serde(default = "default_extensions_dir")]
    pub extensions_dir: String,
    #[serde(default = "default_required_libs")]
    pub required_libs: Vec<String>,
    #[serde(default = "default_classpath_fallback")]
    pub classpath_fallback: Vec<String>,

    #[serde(default = "default_service_port")]
    pub service_port: u16,
    #[serde(default = "default_lock_release_delay_secs")]
    pub lock_release_delay_secs: u64,
    #[serde(default = "default_wrapper_grace_secs")]
    pub wrapper_grace_secs: u64,
    #[serde(default = "default_wrapper_name")]
    pub wrapper_name: String,
    #[serde(default = "default_console_title")]
    pub console_title: String,
    pub console_signatures: Option<Vec<String>>,
    pub console_command: Option<Vec<String>>,

    #[serde(default)]
    pub archiver: ArchiverKind,
}

impl DeployConfig {
    pub fn src_dir(&self) -> PathBuf {
        self.source_dir.join(&self.source_subdir)
    }

    pub fn service_home_dir(&self) -> PathBuf {
        self.target_dir.join(&self.service_home)
    }

    pub fn service_lib_dir(&self) -> PathBuf {
        self.service_home_dir().join(&self.lib_dir)
    }

    pub fn start_script_path(&self) -> PathBuf {
        let script = match &self.start_script {
            Some(script) => script.as_str(),
            None if cfg!(windows) => "sfs2x.bat",
            None => "sfs2x.sh",
        };
        self.service_home_dir().join(script)
    }

    /// Directory the artifact and side-car files are staged into.
    pub fn extension_target_dir(&self) -> PathBuf {
        self.service_home_dir()
            .join(&self.extensions_dir)
            .join(&self.extension_folder)
    }

    /// Where the build phase leaves the packaged artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.source_dir.join(&self.extension_file)
    }

    /// Extension of the artifact (`jar`), used to find stale copies.
    pub fn artifact_extension(&self) -> Option<&str> {
        Path::new(&self.extension_file)
            .extension()
            .and_then(|ext| ext.to_str())
    }

    pub fn sidecar_source_dir(&self) -> &Path {
        self.sidecar_dir.as_deref().unwrap_or(&self.source_dir)
    }

    /// File name of a side-car entry; bare names get `sidecar_extension` appended.
    pub fn sidecar_file_name(&self, name: &str) -> String {
        if Path::new(name).extension().is_some() || self.sidecar_extension.is_empty() {
            name.to_string()
        } else {
            format!("{name}.{}", self.sidecar_extension)
        }
    }

    pub fn wrapper_path(&self, flavor: ScriptFlavor) -> PathBuf {
        self.target_dir
            .join(format!("{}.{}", self.wrapper_name, flavor.extension()))
    }

    pub fn lock_release_delay(&self) -> Duration {
        Duration::from_secs(self.lock_release_delay_secs)
    }

    pub fn wrapper_grace(&self) -> Duration {
        Duration::from_secs(self.wrapper_grace_secs)
    }

    pub fn console_signatures(&self) -> Vec<String> {
        match &self.console_signatures {
            Some(signatures) => signatures.clone(),
            None if cfg!(windows) => vec!["cmd.exe".to_string()],
            None => vec![self.wrapper_name.clone(), "xterm".to_string()],
        }
    }

    /// Terminal emulator prefix used on non-Windows hosts; empty means "run detached".
    pub fn console_command(&self) -> Vec<String> {
        match &self.console_command {
            Some(command) => command.clone(),
            None => vec!["x-terminal-emulator".to_string(), "-e".to_string()],
        }
    }

    /// Check the directory layout before any phase runs.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.extension_file.trim().is_empty() {
            return Err(DeployError::ConfigInvalid(
                "extension_file must not be empty".to_string(),
            ));
        }
        if self.extension_folder.trim().is_empty() {
            return Err(DeployError::ConfigInvalid(
                "extension_folder must not be empty".to_string(),
            ));
        }
        if self.service_port == 0 {
            return Err(DeployError::ConfigInvalid(
                "service_port must be non-zero".to_string(),
            ));
        }

        let src_dir = self.src_dir();
        if !src_dir.is_dir() {
            return Err(DeployError::ConfigInvalid(format!(
                "source directory does not exist: {}",
                src_dir.display()
            )));
        }
        if !sources::has_sources(&src_dir) {
            return Err(DeployError::ConfigInvalid(format!(
                "no .java files under {}",
                src_dir.display()
            )));
        }

        let home = self.service_home_dir();
        if !home.is_dir() {
            return Err(DeployError::ConfigInvalid(format!(
                "service home does not exist: {}",
                home.display()
            )));
        }
        let start_script = self.start_script_path();
        if !start_script.is_file() {
            return Err(DeployError::ConfigInvalid(format!(
                "start script not found: {}",
                start_script.display()
            )));
        }

        let lib_dir = self.service_lib_dir();
        for lib in &self.required_libs {
            let path = lib_dir.join(lib);
            if !path.exists() {
                warn!("{lib} not found at {}", path.display());
            }
        }

        debug!(
            "configuration valid (source={}, target={}, port={})",
            self.source_dir.display(),
            self.target_dir.display(),
            self.service_port
        );
        Ok(())
    }
}

/// Load the deploy descriptor. YAML is used for `.yaml`/`.yml`, JSON otherwise.
pub fn load_config(path: &Path) -> Result<DeployConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;

    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");

    let config: DeployConfig = if is_yaml {
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(config)
}
