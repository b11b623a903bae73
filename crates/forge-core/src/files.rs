//! Filesystem helpers for functional build steps.

use std::path::{Component, Path, PathBuf};

use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ForgeError, Result};

/// Returns the first regular file matching `pattern`.
pub fn first_glob_match(pattern: &str) -> Result<PathBuf> {
    glob_files(pattern)?
        .into_iter()
        .next()
        .ok_or_else(|| ForgeError::NoGlobMatch(pattern.to_string()))
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = glob::glob(pattern)?
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_file())
        .collect();
    out.sort();
    Ok(out)
}

/// Directory part of `pattern` before the first wildcard.
fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        if let Component::Normal(part) = component {
            if part.to_string_lossy().contains(['*', '?', '[']) {
                break;
            }
        }
        base.push(component);
    }
    base
}

#[derive(Clone, Copy)]
enum Transfer {
    Copy,
    Move,
}

/// Moves everything `pattern` matches to `dst`.
///
/// A `dst` ending in a path separator is a directory and keeps each match's
/// path relative to the pattern's literal prefix. Otherwise exactly one file
/// must match and `dst` is its new name. Returns the new paths.
pub async fn move_glob(pattern: &str, dst: &str) -> Result<Vec<PathBuf>> {
    transfer_glob(pattern, dst, Transfer::Move).await
}

/// Like [`move_glob`], leaving the matches in place.
pub async fn copy_glob(pattern: &str, dst: &str) -> Result<Vec<PathBuf>> {
    transfer_glob(pattern, dst, Transfer::Copy).await
}

async fn transfer_glob(pattern: &str, dst: &str, mode: Transfer) -> Result<Vec<PathBuf>> {
    let matches = glob_files(pattern)?;
    if matches.is_empty() {
        return Err(ForgeError::NoGlobMatch(pattern.to_string()));
    }

    let dst_is_dir = dst.ends_with('/') || dst.ends_with('\\');
    if !dst_is_dir {
        let [src] = matches.as_slice() else {
            return Err(anyhow::anyhow!("'{pattern}' matched {} files but '{dst}' is not a directory", matches.len()).into());
        };
        let target = PathBuf::from(dst);
        transfer(src, &target, mode).await?;
        return Ok(vec![target]);
    }

    let base = glob_base(pattern);
    let mut out = Vec::with_capacity(matches.len());
    for src in &matches {
        let rel = src.strip_prefix(&base).unwrap_or(src.as_path());
        let target = Path::new(dst).join(rel);
        transfer(src, &target, mode).await?;
        out.push(target);
    }
    Ok(out)
}

async fn transfer(src: &Path, dst: &Path, mode: Transfer) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    debug!(src = %src.display(), dst = %dst.display(), "transferring file");
    match mode {
        Transfer::Copy => {
            tokio::fs::copy(src, dst).await?;
        }
        Transfer::Move => {
            // rename fails across filesystems
            if tokio::fs::rename(src, dst).await.is_err() {
                tokio::fs::copy(src, dst).await?;
                tokio::fs::remove_file(src).await?;
            }
        }
    }
    Ok(())
}

/// Marks `path` executable (0755). No-op on Windows.
#[cfg(unix)]
pub async fn chmod_exec(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Marks `path` executable (0755). No-op on Windows.
#[cfg(not(unix))]
pub async fn chmod_exec(_path: &Path) -> Result<()> {
    Ok(())
}

/// Downloads `url` into `dst`, creating parent directories.
pub async fn download_file(client: &Client, url: &str, dst: &Path) -> Result<u64> {
    info!(%url, "downloading");
    download_to(client.get(url), dst).await
}

/// Streams a prepared request into `dst`. Returns the byte count.
pub async fn download_to(request: RequestBuilder, dst: &Path) -> Result<u64> {
    let resp = request.send().await?.error_for_status()?;
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dst).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
