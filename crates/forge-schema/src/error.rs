//! Error types for the schema crate.

use thiserror::Error;

/// Failures raised while parsing or computing schema values.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A platform string did not decompose into one known OS and one known arch token.
    #[error("invalid platform '{0}': expected '<os>-<arch>' using known tokens")]
    InvalidPlatform(String),

    /// A digest string was not of the form `<algorithm>:<hex>`.
    #[error("invalid digest format '{0}': expected '<algorithm>:<hex>'")]
    InvalidDigestFormat(String),

    /// The algorithm token is neither a canonical name nor a known alias.
    #[error("unknown digest algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// No line of a checksum list ends with the requested file name.
    #[error("failed to locate a checksum for '{file_name}'")]
    ChecksumNotFound {
        /// The file name that was searched for.
        file_name: String,
    },

    /// Filesystem failure while hashing.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure while walking a directory tree.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Failure while encoding the per-file digest map of a directory.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
