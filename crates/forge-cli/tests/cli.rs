//! Integration tests for the forge CLI binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Runs the `forge` binary from an empty directory with a clean recipe env.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn forge_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_forge"));
        cmd.current_dir(self.temp_dir.path());
        cmd.env_remove("FORGE_RECIPE");
        cmd.env_remove("PKG_NAME");
        cmd.env("RUST_LOG", "warn");
        cmd
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.forge_cmd().arg("--help").output().expect("failed to run forge");
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("bake"));
}

#[test]
fn test_list_shows_registered_recipes() {
    let ctx = TestContext::new();
    let output = ctx.forge_cmd().arg("list").output().expect("failed to run forge");
    assert!(output.status.success());
    let stdout = stdout(&output);
    for name in ["go", "nircmd", "oras", "task", "dprint"] {
        assert!(stdout.contains(name), "{name} missing from:\n{stdout}");
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    let ctx = TestContext::new();
    let output = ctx.forge_cmd().arg("frobnicate").output().expect("failed to run forge");
    assert!(!output.status.success());
}

#[test]
fn test_execute_requires_a_step() {
    let ctx = TestContext::new();
    let output = ctx
        .forge_cmd()
        .args(["execute", "--build-platform", "linux-64", "--target-platform", "linux-64"])
        .env("FORGE_RECIPE", "nircmd")
        .output()
        .expect("failed to run forge");
    assert!(!output.status.success());
}

#[test]
fn test_execute_without_test_function_fails() {
    let ctx = TestContext::new();
    let output = ctx
        .forge_cmd()
        .args(["execute", "--test", "--build-platform", "linux-64", "--target-platform", "linux-64"])
        .env("FORGE_RECIPE", "task")
        .output()
        .expect("failed to run forge");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("task"), "stderr:\n{stderr}");
}

#[test]
fn test_execute_runs_test_step_for_named_recipe() {
    let ctx = TestContext::new();
    let prefix = ctx.path().join("prefix");
    let bin = prefix.join("Library").join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("nircmd.exe"), b"MZ").unwrap();

    let output = ctx
        .forge_cmd()
        .args(["execute", "--test", "--build-platform", "win-64", "--target-platform", "win-64"])
        .env("FORGE_RECIPE", "nircmd")
        .env("PREFIX", &prefix)
        .output()
        .expect("failed to run forge");
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_execute_test_step_fails_when_binary_missing() {
    let ctx = TestContext::new();
    let output = ctx
        .forge_cmd()
        .args(["execute", "--test", "--build-platform", "win-64", "--target-platform", "win-64"])
        .env("FORGE_RECIPE", "nircmd")
        .env("PREFIX", ctx.path().join("empty"))
        .output()
        .expect("failed to run forge");
    assert!(!output.status.success());
}
