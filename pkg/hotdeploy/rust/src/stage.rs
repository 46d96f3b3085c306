// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Staging of the artifact and side-car files into the service's extension
//! directory, and the post-deploy sweep of build byproducts.

use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::config::DeployConfig;
use crate::errors::DeployError;
use crate::sources;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    pub target_dir: PathBuf,
    pub stale_removed: usize,
    pub sidecars_copied: Vec<String>,
    pub sidecars_missing: Vec<String>,
}

/// Copy the artifact and side-cars into the extension directory.
///
/// A missing side-car is skipped with a warning. Failing to copy the
/// artifact, or a side-car that exists, fails the stage.
pub fn stage(config: &DeployConfig) -> Result<StageReport, DeployError> {
    let target_dir = config.extension_target_dir();
    fs::create_dir_all(&target_dir).map_err(|source| DeployError::StagingIo {
        path: target_dir.clone(),
        source,
    })?;
    info!("staging into {}", target_dir.display());

    let mut report = StageReport {
        target_dir: target_dir.clone(),
        ..Default::default()
    };

    if let Some(extension) = config.artifact_extension() {
        for stale in sources::top_level_files_with_extension(&target_dir, extension) {
            match fs::remove_file(&stale) {
                Ok(()) => {
                    debug!("removed old artifact {}", stale.display());
                    report.stale_removed += 1;
                }
                Err(e) => warn!("could not remove {}: {e}", stale.display()),
            }
        }
    }

    let artifact = config.artifact_path();
    let staged = target_dir.join(&config.extension_file);
    fs::copy(&artifact, &staged).map_err(|source| DeployError::StagingIo {
        path: artifact.clone(),
        source,
    })?;
    info!("copied {} to {}", artifact.display(), staged.display());

    let sidecar_dir = config.sidecar_source_dir();
    for entry in &config.sidecar_files {
        let name = config.sidecar_file_name(entry);
        let from = sidecar_dir.join(&name);
        if !from.is_file() {
            warn!("side-car file not found, skipping: {}", from.display());
            report.sidecars_missing.push(name);
            continue;
        }
        fs::copy(&from, target_dir.join(&name))
            .map_err(|source| DeployError::StagingIo { path: from, source })?;
        debug!("copied side-car {name}");
        report.sidecars_copied.push(name);
    }

    info!(
        "staged {} and {} side-car file(s), {} missing",
        config.extension_file,
        report.sidecars_copied.len(),
        report.sidecars_missing.len()
    );
    Ok(report)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub class_files: usize,
    pub artifacts: usize,
}

/// Remove compiled classes under the source tree and packaged artifacts left
/// in the source directory. Failures are logged, never fatal.
pub fn cleanup(config: &DeployConfig) -> CleanupReport {
    let class_files = sources::remove_class_files(&config.src_dir());

    let mut artifacts = 0;
    if let Some(extension) = config.artifact_extension() {
        for path in sources::top_level_files_with_extension(&config.source_dir, extension) {
            match fs::remove_file(&path) {
                Ok(()) => artifacts += 1,
                Err(e) => warn!("could not remove {}: {e}", path.display()),
            }
        }
    }

    info!("cleanup removed {class_files} class file(s) and {artifacts} artifact(s)");
    CleanupReport {
        class_files,
        artifacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::valid_layout;

    fn write(path: &std::path::Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_stage_replaces_old_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let config = valid_layout(root.path());
        let target = config.extension_target_dir();
        write(&target.join("old-build.jar"), "old");
        write(&target.join("keep.properties"), "keep");
        write(&config.artifact_path(), "new");

        let report = stage(&config).unwrap();
        assert_eq!(report.stale_removed, 1);
        assert!(!target.join("old-build.jar").exists());
        assert!(target.join("keep.properties").exists());
        assert_eq!(
            fs::read_to_string(target.join(&config.extension_file)).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_stage_missing_sidecar_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let mut config = valid_layout(root.path());
        config.sidecar_files = vec![
            "rooms".to_string(),
            "absent".to_string(),
            "notes.txt".to_string(),
        ];
        write(&config.artifact_path(), "jar");
        write(&config.source_dir.join("rooms.json"), "{}");
        write(&config.source_dir.join("notes.txt"), "n");

        let report = stage(&config).unwrap();
        assert_eq!(report.sidecars_copied, vec!["rooms.json", "notes.txt"]);
        assert_eq!(report.sidecars_missing, vec!["absent.json"]);
        let target = config.extension_target_dir();
        assert!(target.join("rooms.json").exists());
        assert!(target.join("notes.txt").exists());
    }

    #[test]
    fn test_stage_uses_sidecar_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut config = valid_layout(root.path());
        config.sidecar_dir = Some(root.path().join("data"));
        config.sidecar_files = vec!["rooms".to_string()];
        write(&config.artifact_path(), "jar");
        write(&root.path().join("data/rooms.json"), "{}");

        let report = stage(&config).unwrap();
        assert_eq!(report.sidecars_copied, vec!["rooms.json"]);
    }

    #[test]
    fn test_stage_missing_artifact_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let config = valid_layout(root.path());
        match stage(&config) {
            Err(DeployError::StagingIo { path, .. }) => assert_eq!(path, config.artifact_path()),
            other => panic!("expected StagingIo, got {other:?}"),
        }
    }

    #[test]
    fn test_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let config = valid_layout(root.path());
        write(&config.src_dir().join("com/example/Main.class"), "c");
        write(&config.src_dir().join("com/example/Main$Inner.class"), "c");
        write(&config.artifact_path(), "jar");
        write(&config.source_dir.join("nested/other.jar"), "jar");

        let report = cleanup(&config);
        assert_eq!(
            report,
            CleanupReport {
                class_files: 2,
                artifacts: 1
            }
        );
        assert!(config.src_dir().join("com/example/Main.java").exists());
        assert!(config.source_dir.join("nested/other.jar").exists());
        assert_eq!(cleanup(&config), CleanupReport::default());
    }
}
