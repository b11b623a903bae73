//! Remote checksum retrieval.
//!
//! Checksum files are plain text; once fetched they go through the same
//! suffix-matching extractor as local files. Requests arrive prepared, so
//! any credentials are already attached.

use futures::StreamExt;
use reqwest::RequestBuilder;

use forge_schema::{Digest, DigestAlgorithm, DigestHasher, digest_from_checksum_text};

use crate::error::Result;

/// Sends a prepared GET and returns the body as text.
///
/// Redirects are followed by the client. Non-2xx statuses are errors.
pub async fn fetch_text(request: RequestBuilder) -> Result<String> {
    let resp = request.send().await?.error_for_status()?;
    Ok(resp.text().await?)
}

/// Downloads a `.sha256`-style sidecar and extracts the digest for `file_name`.
///
/// Sidecars come either as a one-line checksum list or as the bare hex
/// digest. The list form is tried first.
pub async fn digest_from_sidecar_url(
    request: RequestBuilder,
    algorithm: DigestAlgorithm,
    file_name: &str,
) -> Result<Digest> {
    let text = fetch_text(request).await?;
    match digest_from_checksum_text(algorithm, file_name, &text) {
        Ok(digest) => Ok(digest),
        Err(_) => Ok(Digest::new(algorithm, text.trim())?),
    }
}

/// Streams a download through the hasher without buffering it in memory.
pub async fn download_and_digest(request: RequestBuilder, algorithm: DigestAlgorithm) -> Result<Digest> {
    let resp = request.send().await?.error_for_status()?;
    let mut stream = resp.bytes_stream();
    let mut hasher = DigestHasher::new(algorithm);
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize())
}
