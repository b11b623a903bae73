//! Shared value types for forge recipes.
//!
//! Everything in this crate is pure: the platform taxonomy, digest
//! computation and parsing, checksum-list extraction and the key-case
//! transform applied when a recipe crosses into the build engine's
//! wire format. Network access lives in `forge-core`.

pub mod case;
pub mod checksum;
pub mod digest;
pub mod error;
pub mod platform;

// Re-exports
pub use checksum::{digest_from_checksum_file, digest_from_checksum_text};
pub use digest::{Digest, DigestAlgorithm, DigestHasher};
pub use error::{Result, SchemaError};
pub use platform::*;
