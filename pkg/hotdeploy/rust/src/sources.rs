// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Source discovery, compiled-output sweeping and classpath assembly.

use std::path::{Path, PathBuf};

use glob_match::glob_match;
use log::{debug, warn};
use walkdir::WalkDir;

pub const SOURCE_EXTENSION: &str = "java";
pub const CLASS_EXTENSION: &str = "class";

#[cfg(windows)]
pub const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
pub const CLASSPATH_SEPARATOR: &str = ":";

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Files under `dir` with the given extension, in walk order. Unreadable
/// entries are skipped.
fn files_with_extension(dir: &Path, extension: &str) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("skipping unreadable entry under {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(move |path| has_extension(path, extension))
}

pub fn has_sources(dir: &Path) -> bool {
    files_with_extension(dir, SOURCE_EXTENSION).next().is_some()
}

pub fn find_sources(dir: &Path) -> Vec<PathBuf> {
    files_with_extension(dir, SOURCE_EXTENSION).collect()
}

/// Remove compiled output under `dir`. Returns the number of files removed.
pub fn remove_class_files(dir: &Path) -> usize {
    let mut removed = 0;
    for path in files_with_extension(dir, CLASS_EXTENSION) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("could not remove {}: {e}", path.display()),
        }
    }
    removed
}

/// Classpath for compiling against the service: every jar directly in
/// `lib_dir`, otherwise jars anywhere below it whose file name matches one of
/// the `fallback` patterns, otherwise ".".
pub fn build_classpath(lib_dir: &Path, fallback: &[String]) -> String {
    let mut parts = top_level_files_with_extension(lib_dir, "jar");

    if parts.is_empty() {
        let nested: Vec<PathBuf> = files_with_extension(lib_dir, "jar").collect();
        for pattern in fallback {
            for path in &nested {
                let matches = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| glob_match(pattern, name));
                if matches && !parts.contains(path) {
                    parts.push(path.clone());
                }
            }
        }
    }

    if parts.is_empty() {
        warn!("no jar files found in {}", lib_dir.display());
        return ".".to_string();
    }

    parts
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(CLASSPATH_SEPARATOR)
}

fn list_dir_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot list {}: {e}", dir.display());
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}

/// Files directly inside `dir` carrying `extension`.
pub fn top_level_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    list_dir_files(dir)
        .into_iter()
        .filter(|path| has_extension(path, extension))
        .collect()
}
