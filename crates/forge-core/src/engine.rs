//! The external build engine.
//!
//! The engine reads a rendered recipe and writes packages under
//! `<output>/<platform>/`. It gets no timeout; it runs until it finishes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use forge_schema::Platform;

use crate::error::{ForgeError, Result};

/// One engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// The rendered `recipe.yaml`.
    pub recipe: PathBuf,
    /// Platform to build for.
    pub target_platform: Platform,
    /// Directory the engine writes packages into.
    pub output_dir: PathBuf,
    /// Whether the engine should run the recipe's tests.
    pub run_tests: bool,
}

impl EngineRequest {
    /// Tests only run when the host can execute what was built.
    pub fn new(recipe: impl Into<PathBuf>, target_platform: Platform, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            recipe: recipe.into(),
            target_platform,
            output_dir: output_dir.into(),
            run_tests: target_platform == Platform::current(),
        }
    }
}

/// Something that turns a rendered recipe into a package file.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Builds and returns the path of the produced package.
    async fn build(&self, request: &EngineRequest) -> Result<PathBuf>;
}

/// `rattler-build` (or a compatible executable) run as a child process.
#[derive(Debug, Clone)]
pub struct RattlerBuild {
    program: OsString,
}

impl RattlerBuild {
    /// Uses `program` as the engine executable.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self { program: program.into() }
    }

    /// Command line for `request`.
    pub fn args(request: &EngineRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "build".into(),
            "-r".into(),
            request.recipe.clone().into(),
            "--target-platform".into(),
            request.target_platform.to_string().into(),
            "--output-dir".into(),
            request.output_dir.clone().into(),
        ];
        if !request.run_tests {
            args.push("--no-test".into());
        }
        args
    }
}

#[async_trait]
impl BuildEngine for RattlerBuild {
    async fn build(&self, request: &EngineRequest) -> Result<PathBuf> {
        let args = Self::args(request);
        info!(
            engine = %self.program.to_string_lossy(),
            target = %request.target_platform,
            tests = request.run_tests,
            "running build engine"
        );
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;
        if !status.success() {
            return Err(ForgeError::ExternalEngine { code: status.code() });
        }
        find_package(&request.output_dir, request.target_platform)
    }
}

/// Finds the package the engine wrote for `platform`.
pub fn find_package(output_dir: &Path, platform: Platform) -> Result<PathBuf> {
    let dir = output_dir.join(platform.to_string());
    for ext in ["tar.bz2", "conda"] {
        let pattern = dir.join(format!("*.{ext}"));
        let pattern = pattern.to_string_lossy();
        if let Some(found) = glob::glob(&pattern)?.filter_map(std::result::Result::ok).find(|p| p.is_file()) {
            debug!(path = %found.display(), "found package");
            return Ok(found);
        }
    }
    Err(ForgeError::ArtifactNotFound(dir.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path, target: Platform) -> EngineRequest {
        EngineRequest::new(dir.join("src/recipe.yaml"), target, dir.join("output"))
    }

    #[test]
    fn test_args_disable_tests_when_cross_building() {
        let dir = Path::new("/stage");
        let foreign = if Platform::current().to_string() == "win-64" {
            "linux-64".parse().unwrap()
        } else {
            "win-64".parse().unwrap()
        };
        let args = RattlerBuild::args(&request(dir, foreign));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..2], ["build", "-r"]);
        assert!(args.contains(&"--target-platform".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--no-test"));

        let native = RattlerBuild::args(&request(dir, Platform::current()));
        assert!(!native.iter().any(|a| a == "--no-test"));
    }

    #[test]
    fn test_find_package() {
        let dir = tempfile::tempdir().unwrap();
        let p: Platform = "linux-64".parse().unwrap();
        assert!(matches!(find_package(dir.path(), p), Err(ForgeError::ArtifactNotFound(_))));

        let pkg = dir.path().join("linux-64/demo-1.2.3-h0_0.conda");
        std::fs::create_dir_all(pkg.parent().unwrap()).unwrap();
        std::fs::write(&pkg, "").unwrap();
        assert_eq!(find_package(dir.path(), p).unwrap(), pkg);
    }

    #[cfg(unix)]
    fn fake_engine(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-engine");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_success_returns_package() {
        let dir = tempfile::tempdir().unwrap();
        // $5 is the platform, $7 the output dir
        let engine = fake_engine(dir.path(), r#"mkdir -p "$7/$5" && touch "$7/$5/demo-1.0-0.tar.bz2""#);
        let p: Platform = "linux-64".parse().unwrap();
        let pkg = RattlerBuild::new(engine).build(&request(dir.path(), p)).await.unwrap();
        assert!(pkg.ends_with("linux-64/demo-1.0-0.tar.bz2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_failure_code() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "exit 3");
        let err = RattlerBuild::new(engine)
            .build(&request(dir.path(), Platform::current()))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ExternalEngine { code: Some(3) }));
    }
}
