//! Helpers shared by recipe steps.

use std::path::PathBuf;

use anyhow::{Context, bail};
use reqwest::Client;
use tokio::process::Command;
use tracing::warn;

use forge_core::BuildContext;
use forge_core::checksum::fetch_text;
use forge_core::files::{chmod_exec, move_glob};
use forge_core::recipe::{BuildOptions, Description, DynamicLinking};
use forge_core::versions::coerce_semver;

/// Options for prebuilt binaries, which must not be relocated.
pub(crate) fn prebuilt(number: u32) -> BuildOptions {
    BuildOptions {
        number: Some(number),
        dynamic_linking: Some(DynamicLinking {
            binary_relocation: Some(false),
            ..DynamicLinking::default()
        }),
        ..BuildOptions::default()
    }
}

/// Downloads a README for `about.description`. A failure only costs the description.
pub(crate) async fn readme(http: &Client, url: &str) -> Option<Description> {
    match fetch_text(http.get(url)).await {
        Ok(text) => Some(Description::Text(text)),
        Err(e) => {
            warn!(%url, "could not fetch description: {e}");
            None
        }
    }
}

/// Moves the first file matching `pattern` (relative to the source dir) to
/// `<bin>/<name>` and makes it executable.
pub(crate) async fn install_binary(ctx: &BuildContext, pattern: &str, name: &str) -> anyhow::Result<PathBuf> {
    let src = ctx.src_dir.join(pattern);
    let dst = ctx.bin_dir().join(ctx.exe(name));
    move_glob(&src.to_string_lossy(), &dst.to_string_lossy())
        .await
        .with_context(|| format!("installing {name}"))?;
    if ctx.unix() {
        chmod_exec(&dst).await?;
    }
    Ok(dst)
}

/// Runs `program` and returns stdout followed by stderr.
pub(crate) async fn run(program: &str, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("running {program}"))?;
    if !output.status.success() {
        bail!("{program} exited with {}", output.status);
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Fails unless the version printed in `output` is `expected`.
pub(crate) fn expect_version(output: &str, expected: &str) -> anyhow::Result<()> {
    let actual = coerce_semver(output)?;
    if actual != expected {
        bail!("unexpected version returned from binary: {actual} (wanted {expected})");
    }
    Ok(())
}

/// A build context rooted at `root`, laid out like the engine's work dirs.
#[cfg(test)]
pub(crate) fn test_context(root: &std::path::Path, target: &str) -> BuildContext {
    BuildContext {
        prefix: root.join("prefix"),
        recipe_dir: root.join("recipe"),
        src_dir: root.join("work"),
        pkg_name: "demo".into(),
        pkg_version: "1.2.3".into(),
        pkg_version_raw: "v1.2.3".into(),
        pkg_build_number: "1".into(),
        pkg_hash: "1234567".into(),
        pkg_build_string: "h1234567_1".into(),
        build_platform: forge_schema::Platform::current(),
        target_platform: target.parse().expect("valid platform"),
        cpu_count: 1,
        shlib_ext: ".so".into(),
    }
}
