// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! JDK discovery and the compiler/archiver collaborators.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use glob_match::glob_match;
use log::{debug, info, warn};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::errors::DeployError;

const MANIFEST: &str = "Manifest-Version: 1.0\r\nCreated-By: hotdeploy\r\n\r\n";

const WINDOWS_JDK_ROOTS: [&str; 4] = [
    r"C:\Program Files\Eclipse Adoptium",
    r"C:\Program Files\Java",
    r"C:\Program Files\OpenJDK",
    r"C:\Program Files (x86)\Eclipse Adoptium",
];

/// Path of a JDK tool inside `bin_dir`.
pub fn tool_path(bin_dir: &Path, tool: &str) -> PathBuf {
    if cfg!(windows) {
        bin_dir.join(format!("{tool}.exe"))
    } else {
        bin_dir.join(tool)
    }
}

/// Major version reported by `javac -version` output, e.g. `javac 11.0.21`
/// gives "11" and the legacy `javac 1.8.0_392` gives "8".
pub fn parse_javac_major(output: &str) -> Option<String> {
    let version = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("javac "))?
        .split_whitespace()
        .next()?;
    let mut parts = version.split(['.', '_', '-', '+']);
    let first = parts.next()?;
    let major = if first == "1" { parts.next()? } else { first };
    major
        .chars()
        .all(|c| c.is_ascii_digit())
        .then(|| major.to_string())
}

fn javac_reports_major(javac: &Path, major: &str) -> bool {
    let output = match Command::new(javac).arg("-version").output() {
        Ok(output) => output,
        Err(e) => {
            debug!("could not run {}: {e}", javac.display());
            return false;
        }
    };
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    match parse_javac_major(&text) {
        Some(found) if found == major => true,
        Some(found) => {
            debug!("{} is JDK {found}, want {major}", javac.display());
            false
        }
        None => {
            debug!("unrecognised javac version output from {}: {text}", javac.display());
            false
        }
    }
}

/// `jdk-<major>*` installations under the given roots, newest name last.
pub fn jdk_candidates(roots: &[PathBuf], major: &str) -> Vec<PathBuf> {
    let pattern = format!("jdk-{major}*");
    let mut found = Vec::new();
    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| glob_match(&pattern, name))
            })
            .map(|entry| entry.path().join("bin"))
            .collect();
        dirs.sort();
        found.extend(dirs);
    }
    found
}

/// Resolve the JDK `bin` directory.
///
/// An explicit `configured` path is only checked for a `javac` binary.
/// Otherwise `$JAVA_HOME/bin`, `javac` on `PATH`, and on Windows the usual
/// install roots are tried in order; the first whose `javac -version`
/// reports `major` wins.
pub fn discover_java_bin(configured: Option<&Path>, major: &str) -> Result<PathBuf, DeployError> {
    if let Some(bin) = configured {
        let javac = tool_path(bin, "javac");
        if javac.is_file() {
            info!("using configured JDK at {}", bin.display());
            return Ok(bin.to_path_buf());
        }
        return Err(DeployError::ConfigInvalid(format!(
            "java_path {} does not contain javac",
            bin.display()
        )));
    }

    let mut candidates = Vec::new();
    if let Some(home) = std::env::var_os("JAVA_HOME") {
        candidates.push(PathBuf::from(home).join("bin"));
    }
    if let Ok(javac) = which::which("javac")
        && let Some(bin) = javac.parent()
    {
        candidates.push(bin.to_path_buf());
    }
    if cfg!(windows) {
        let roots: Vec<PathBuf> = WINDOWS_JDK_ROOTS.iter().map(PathBuf::from).collect();
        candidates.extend(jdk_candidates(&roots, major));
    }

    for bin in candidates {
        let javac = tool_path(&bin, "javac");
        if javac.is_file() && javac_reports_major(&javac, major) {
            info!("found JDK {major} at {}", bin.display());
            return Ok(bin);
        }
    }
    Err(DeployError::ConfigInvalid(format!(
        "JDK {major} not found; set java_path in the config or JAVA_HOME"
    )))
}

/// Inputs to one compiler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub working_dir: PathBuf,
    pub sources: Vec<PathBuf>,
    pub classpath: String,
    pub output_dir: PathBuf,
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> Result<(), DeployError>;
}

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Package everything under `input_dir` into `output`.
    async fn archive(&self, input_dir: &Path, output: &Path) -> Result<(), DeployError>;
}

async fn run_tool(
    tool: &str,
    program: &Path,
    args: &[&OsStr],
    dir: &Path,
) -> Result<(), DeployError> {
    debug!("running {} in {} ({} args)", program.display(), dir.display(), args.len());
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| DeployError::ToolInvocationFailed {
            tool: tool.to_string(),
            diagnostic: format!("could not start {}: {e}", program.display()),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
    diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
    let diagnostic = diagnostic.trim();
    Err(DeployError::ToolInvocationFailed {
        tool: tool.to_string(),
        diagnostic: if diagnostic.is_empty() {
            format!("exited with {}", output.status)
        } else {
            diagnostic.to_string()
        },
    })
}

pub struct JavacCompiler {
    javac: PathBuf,
}

impl JavacCompiler {
    pub fn new(java_bin: &Path) -> Self {
        Self {
            javac: tool_path(java_bin, "javac"),
        }
    }
}

#[async_trait]
impl Compiler for JavacCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<(), DeployError> {
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-cp"),
            OsStr::new(&request.classpath),
            OsStr::new("-d"),
            request.output_dir.as_os_str(),
        ];
        args.extend(request.sources.iter().map(|p| p.as_os_str()));
        run_tool("javac", &self.javac, &args, &request.working_dir).await
    }
}

pub struct JarArchiver {
    jar: PathBuf,
}

impl JarArchiver {
    pub fn new(java_bin: &Path) -> Self {
        Self {
            jar: tool_path(java_bin, "jar"),
        }
    }
}

#[async_trait]
impl Archiver for JarArchiver {
    async fn archive(&self, input_dir: &Path, output: &Path) -> Result<(), DeployError> {
        let args = [OsStr::new("cf"), output.as_os_str(), OsStr::new(".")];
        run_tool("jar", &self.jar, &args, input_dir).await
    }
}

/// Writes the archive in-process, for hosts without a `jar` binary.
#[derive(Debug, Default)]
pub struct ZipArchiver;

fn write_zip(input_dir: &Path, output: &Path) -> zip::result::ZipResult<usize> {
    let mut writer = zip::ZipWriter::new(File::create(output)?);
    let options: FileOptions<()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.add_directory("META-INF/", options)?;
    writer.start_file("META-INF/MANIFEST.MF", options)?;
    io::Write::write_all(&mut writer, MANIFEST.as_bytes())?;

    let mut entries = 0;
    for entry in WalkDir::new(input_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if path == output {
            continue;
        }
        let Ok(relative) = path.strip_prefix(input_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(path)?, &mut writer)?;
            entries += 1;
        }
    }
    writer.finish()?;
    Ok(entries)
}

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(&self, input_dir: &Path, output: &Path) -> Result<(), DeployError> {
        let input = input_dir.to_path_buf();
        let out = output.to_path_buf();
        let result = tokio::task::spawn_blocking(move || write_zip(&input, &out))
            .await
            .map_err(|e| DeployError::ToolInvocationFailed {
                tool: "zip".to_string(),
                diagnostic: format!("archiver task failed: {e}"),
            })?;
        match result {
            Ok(entries) => {
                debug!("wrote {entries} files into {}", output.display());
                Ok(())
            }
            Err(e) => {
                warn!("removing partial archive {}", output.display());
                let _ = std::fs::remove_file(output);
                Err(DeployError::ToolInvocationFailed {
                    tool: "zip".to_string(),
                    diagnostic: e.to_string(),
                })
            }
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use fake::FakeCompiler;

#[cfg(any(test, feature = "test-helpers"))]
mod fake {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    /// Compiler that "compiles" each source into an empty class file beside
    /// it, or fails with a canned diagnostic.
    #[derive(Debug, Default)]
    pub struct FakeCompiler {
        fail_with: Option<String>,
        requests: Mutex<Vec<CompileRequest>>,
    }

    impl FakeCompiler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(diagnostic: &str) -> Self {
            Self {
                fail_with: Some(diagnostic.to_string()),
                requests: Mutex::default(),
            }
        }

        pub fn requests(&self) -> Vec<CompileRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl Compiler for FakeCompiler {
        async fn compile(&self, request: &CompileRequest) -> Result<(), DeployError> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            if let Some(diagnostic) = &self.fail_with {
                return Err(DeployError::ToolInvocationFailed {
                    tool: "javac".to_string(),
                    diagnostic: diagnostic.clone(),
                });
            }
            for source in &request.sources {
                let class = source.with_extension(crate::sources::CLASS_EXTENSION);
                tokio::fs::write(&class, [0xCA, 0xFE, 0xBA, 0xBE])
                    .await
                    .map_err(|e| DeployError::ToolInvocationFailed {
                        tool: "javac".to_string(),
                        diagnostic: format!("{}: {e}", class.display()),
                    })?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_parse_javac_major() {
        assert_eq!(parse_javac_major("javac 11.0.21\n").as_deref(), Some("11"));
        assert_eq!(parse_javac_major("javac 17\n").as_deref(), Some("17"));
        assert_eq!(parse_javac_major("javac 1.8.0_392").as_deref(), Some("8"));
        assert_eq!(
            parse_javac_major("Picked up JAVA_TOOL_OPTIONS: -Xmx1g\njavac 21.0.1+12\n").as_deref(),
            Some("21")
        );
        assert_eq!(parse_javac_major("java version \"11\""), None);
        assert_eq!(parse_javac_major(""), None);
    }

    #[test]
    fn test_tool_path() {
        let path = tool_path(Path::new("/jdk/bin"), "javac");
        if cfg!(windows) {
            assert!(path.ends_with("javac.exe"));
        } else {
            assert_eq!(path, PathBuf::from("/jdk/bin/javac"));
        }
    }

    #[test]
    fn test_jdk_candidates() {
        let root = tempfile::tempdir().unwrap();
        for name in ["jdk-11.0.2", "jdk-11.0.21+9", "jdk-17.0.1", "jre-11"] {
            std::fs::create_dir(root.path().join(name)).unwrap();
        }
        let found = jdk_candidates(
            &[root.path().to_path_buf(), root.path().join("missing")],
            "11",
        );
        assert_eq!(
            found,
            vec![
                root.path().join("jdk-11.0.2").join("bin"),
                root.path().join("jdk-11.0.21+9").join("bin"),
            ]
        );
    }

    #[test]
    fn test_configured_java_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_java_bin(Some(dir.path()), "11"),
            Err(DeployError::ConfigInvalid(_))
        ));
        std::fs::write(tool_path(dir.path(), "javac"), "").unwrap();
        assert_eq!(discover_java_bin(Some(dir.path()), "11").unwrap(), dir.path());
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_from_java_home() {
        let home = tempfile::tempdir().unwrap();
        fake_tool(&home.path().join("bin"), "javac", "echo 'javac 11.0.21' >&2");

        temp_env::with_var("JAVA_HOME", Some(home.path()), || {
            assert_eq!(discover_java_bin(None, "11").unwrap(), home.path().join("bin"));
            assert!(matches!(
                discover_java_bin(None, "999"),
                Err(DeployError::ConfigInvalid(_))
            ));
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_from_path() {
        let bin = tempfile::tempdir().unwrap();
        fake_tool(bin.path(), "javac", "echo 'javac 17.0.9'");
        // Prepend so the usual tools stay reachable for concurrently running tests.
        let mut dirs = vec![bin.path().to_path_buf()];
        dirs.extend(std::env::split_paths(&std::env::var_os("PATH").unwrap_or_default()));
        let path = std::env::join_paths(dirs).unwrap();

        temp_env::with_vars(
            [("JAVA_HOME", None), ("PATH", Some(path.as_os_str()))],
            || {
                assert_eq!(discover_java_bin(None, "17").unwrap(), bin.path());
            },
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_javac_failure_carries_diagnostic() {
        let bin = tempfile::tempdir().unwrap();
        fake_tool(
            bin.path(),
            "javac",
            "echo 'Main.java:3: error: cannot find symbol' >&2; exit 1",
        );
        let work = tempfile::tempdir().unwrap();
        let request = CompileRequest {
            working_dir: work.path().to_path_buf(),
            sources: vec![work.path().join("Main.java")],
            classpath: ".".to_string(),
            output_dir: work.path().to_path_buf(),
        };
        match JavacCompiler::new(bin.path()).compile(&request).await {
            Err(DeployError::ToolInvocationFailed { tool, diagnostic }) => {
                assert_eq!(tool, "javac");
                assert!(diagnostic.contains("cannot find symbol"), "{diagnostic}");
            }
            other => panic!("expected ToolInvocationFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_javac_receives_arguments() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fake_tool(bin.path(), "javac", "printf '%s\\n' \"$@\" > args.txt");
        let request = CompileRequest {
            working_dir: work.path().to_path_buf(),
            sources: vec![work.path().join("A.java"), work.path().join("B.java")],
            classpath: "lib/a.jar:lib/b.jar".to_string(),
            output_dir: work.path().to_path_buf(),
        };
        JavacCompiler::new(bin.path()).compile(&request).await.unwrap();

        let args = std::fs::read_to_string(work.path().join("args.txt")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[0], "-cp");
        assert_eq!(args[1], "lib/a.jar:lib/b.jar");
        assert_eq!(args[2], "-d");
        assert!(args[4].ends_with("A.java"));
        assert!(args[5].ends_with("B.java"));
    }

    #[tokio::test]
    async fn test_missing_tool_binary() {
        let work = tempfile::tempdir().unwrap();
        let err = JarArchiver::new(Path::new("/nonexistent/jdk/bin"))
            .archive(work.path(), &work.path().join("out.jar"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ToolInvocationFailed { ref tool, .. } if tool == "jar"));
    }

    #[tokio::test]
    async fn test_zip_archiver() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        std::fs::create_dir_all(src.join("com/example")).unwrap();
        std::fs::write(src.join("com/example/Main.class"), b"class").unwrap();
        std::fs::write(src.join("com/example/Main.java"), b"source").unwrap();
        let output = root.path().join("slots.jar");

        ZipArchiver.archive(&src, &output).await.unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert!(names.contains(&"META-INF/MANIFEST.MF".to_string()));
        assert!(names.contains(&"com/example/".to_string()));
        assert!(names.contains(&"com/example/Main.class".to_string()));
        assert!(names.contains(&"com/example/Main.java".to_string()));

        let mut content = String::new();
        archive
            .by_name("com/example/Main.class")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "class");
    }

    #[tokio::test]
    async fn test_zip_archiver_bad_output() {
        let root = tempfile::tempdir().unwrap();
        let err = ZipArchiver
            .archive(root.path(), &root.path().join("missing/out.jar"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ToolInvocationFailed { .. }));
    }

    #[tokio::test]
    async fn test_fake_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("A.java");
        std::fs::write(&source, "class A {}").unwrap();
        let request = CompileRequest {
            working_dir: dir.path().to_path_buf(),
            sources: vec![source],
            classpath: ".".to_string(),
            output_dir: dir.path().to_path_buf(),
        };

        let compiler = FakeCompiler::new();
        compiler.compile(&request).await.unwrap();
        assert!(dir.path().join("A.class").exists());
        assert_eq!(compiler.requests(), vec![request.clone()]);

        assert!(FakeCompiler::failing("boom").compile(&request).await.is_err());
    }
}
