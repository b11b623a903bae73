//! Extraction of a single digest from checksum-list text.
//!
//! Checksum lists look like `<hex>  <filename>` per line (the GNU coreutils
//! format, optionally with a `*` binary marker). A line matches when it ends
//! with the requested file name. Because this is a suffix match, asking for
//! `oo.tar.gz` matches a line for `foo.tar.gz`.

use std::path::Path;

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{Result, SchemaError};

/// Finds the digest for `file_name` in `text`.
///
/// The first line that ends with `file_name` wins, and its first
/// space-separated token is taken as the hex value.
pub fn digest_from_checksum_text(
    algorithm: DigestAlgorithm,
    file_name: &str,
    text: &str,
) -> Result<Digest> {
    let not_found = || SchemaError::ChecksumNotFound {
        file_name: file_name.to_string(),
    };
    if file_name.is_empty() {
        return Err(not_found());
    }

    let line = text
        .lines()
        .map(str::trim_end)
        .find(|line| line.ends_with(file_name))
        .ok_or_else(not_found)?;

    let hex = line.split(' ').next().unwrap_or_default().trim();
    Digest::new(algorithm, hex)
}

/// Same as [`digest_from_checksum_text`] but reads the list from disk.
pub fn digest_from_checksum_file(
    algorithm: DigestAlgorithm,
    file_name: &str,
    path: &Path,
) -> Result<Digest> {
    let text = std::fs::read_to_string(path)?;
    digest_from_checksum_text(algorithm, file_name, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "deadbeef  foo.tar.gz\ncafebabe  bar.zip";

    #[test]
    fn test_extracts_matching_line() {
        let d = digest_from_checksum_text(DigestAlgorithm::Sha256, "foo.tar.gz", LIST).unwrap();
        assert_eq!(d.algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(d.hex(), "deadbeef");

        let d = digest_from_checksum_text(DigestAlgorithm::Sha256, "bar.zip", LIST).unwrap();
        assert_eq!(d.hex(), "cafebabe");
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let err = digest_from_checksum_text(DigestAlgorithm::Sha256, "baz.zip", LIST).unwrap_err();
        assert!(matches!(err, SchemaError::ChecksumNotFound { file_name } if file_name == "baz.zip"));
    }

    #[test]
    fn test_suffix_of_another_entry_matches() {
        // Suffix matching: "oo.tar.gz" resolves to the "foo.tar.gz" line.
        let d = digest_from_checksum_text(DigestAlgorithm::Sha256, "oo.tar.gz", LIST).unwrap();
        assert_eq!(d.hex(), "deadbeef");
    }

    #[test]
    fn test_binary_marker_and_crlf() {
        let text = "ABCDEF *tool-linux-amd64.tar.gz\r\n0123 *tool-windows-amd64.zip\r\n";
        let d = digest_from_checksum_text(DigestAlgorithm::Sha256, "tool-linux-amd64.tar.gz", text)
            .unwrap();
        assert_eq!(d.hex(), "abcdef");
    }

    #[test]
    fn test_reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SHASUMS256.txt");
        std::fs::write(&path, LIST).unwrap();
        let d = digest_from_checksum_file(DigestAlgorithm::Md5, "bar.zip", &path).unwrap();
        assert_eq!(d.to_string(), "md5:cafebabe");
    }
}
