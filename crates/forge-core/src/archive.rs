//! Archive helpers for functional build steps.
//!
//! Decompression is blocking work and runs on the blocking pool.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use zip::ZipArchive;

use crate::error::{ForgeError, Result};
use crate::files::first_glob_match;

/// Unpacks a zip archive into `dest`. Entries escaping `dest` are skipped.
pub async fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let (archive, dest) = (archive.to_path_buf(), dest.to_path_buf());
    blocking(move || {
        let mut zip = ZipArchive::new(File::open(&archive)?)?;
        fs::create_dir_all(&dest)?;
        zip.extract(&dest)?;
        Ok(())
    })
    .await
}

/// Unpacks a `.tar.gz` into `dest`.
pub async fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let (archive, dest) = (archive.to_path_buf(), dest.to_path_buf());
    blocking(move || {
        let reader = GzDecoder::new(BufReader::new(File::open(&archive)?));
        fs::create_dir_all(&dest)?;
        // unpack refuses entries that would land outside dest
        tar::Archive::new(reader).unpack(&dest)?;
        Ok(())
    })
    .await
}

/// Gzips the first file matching `src` into `dest`.
pub async fn gzip_file(src: &str, dest: &Path) -> Result<PathBuf> {
    let src = first_glob_match(src)?;
    let dest = dest.to_path_buf();
    blocking(move || {
        let mut input = BufReader::new(File::open(&src)?);
        ensure_parent(&dest)?;
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&dest)?), Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;
        Ok(dest)
    })
    .await
}

/// Decompresses the first file matching `src` into `dest`.
pub async fn gunzip_file(src: &str, dest: &Path) -> Result<PathBuf> {
    let src = first_glob_match(src)?;
    let dest = dest.to_path_buf();
    blocking(move || {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(&src)?));
        ensure_parent(&dest)?;
        let mut output = BufWriter::new(File::create(&dest)?);
        io::copy(&mut decoder, &mut output)?;
        Ok(dest)
    })
    .await
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForgeError::Io(io::Error::other(e)))?
}
