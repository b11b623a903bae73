//! Cryptographic digests with a canonical `algorithm:hex` form.
//!
//! Algorithms accept both their canonical names (`SHA-256`) and OCI-style
//! aliases (`sha256`). The string form is always lower case without the
//! dash, so `Digest::parse("SHA256:ABCD")` prints as `sha256:abcd`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;
use walkdir::WalkDir;

use crate::error::{Result, SchemaError};

/// Supported hash functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    /// MD5, still published by some conda sources.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256, the default everywhere.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [Self; 6] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    /// Canonical (WebCrypto style) name, e.g. `SHA-256`.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// OCI alias, e.g. `sha256`. This is the prefix of a digest's string form.
    pub fn alias(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        let alias = s.to_ascii_lowercase().replace('-', "");
        Self::ALL
            .into_iter()
            .find(|alg| alg.canonical_name() == upper || alg.alias() == alias)
            .ok_or_else(|| SchemaError::UnknownAlgorithm(s.to_string()))
    }
}

enum HasherState {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

/// Incremental hasher for streamed content.
pub struct DigestHasher {
    algorithm: DigestAlgorithm,
    state: HasherState,
}

impl fmt::Debug for DigestHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestHasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl DigestHasher {
    /// Starts an empty hash.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let state = match algorithm {
            DigestAlgorithm::Md5 => HasherState::Md5(md5::Md5::new()),
            DigestAlgorithm::Sha1 => HasherState::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha224 => HasherState::Sha224(sha2::Sha224::new()),
            DigestAlgorithm::Sha256 => HasherState::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha384 => HasherState::Sha384(sha2::Sha384::new()),
            DigestAlgorithm::Sha512 => HasherState::Sha512(sha2::Sha512::new()),
        };
        Self { algorithm, state }
    }

    /// Feeds more bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Md5(h) => h.update(data),
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha224(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
            HasherState::Sha384(h) => h.update(data),
            HasherState::Sha512(h) => h.update(data),
        }
    }

    /// Consumes the hasher and returns the digest.
    pub fn finalize(self) -> Digest {
        let hex = match self.state {
            HasherState::Md5(h) => hex::encode(h.finalize()),
            HasherState::Sha1(h) => hex::encode(h.finalize()),
            HasherState::Sha224(h) => hex::encode(h.finalize()),
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Sha384(h) => hex::encode(h.finalize()),
            HasherState::Sha512(h) => hex::encode(h.finalize()),
        };
        Digest {
            algorithm: self.algorithm,
            hex,
        }
    }
}

/// An algorithm plus a lower-case hex value.
///
/// Equality follows the canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    /// Wraps an already computed hex value, lower-casing it.
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SchemaError::InvalidDigestFormat(format!("{}:{hex}", algorithm.alias())));
        }
        Ok(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// Parses `algorithm:hex`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [alg, hex] = parts.as_slice() else {
            return Err(SchemaError::InvalidDigestFormat(s.to_string()));
        };
        let algorithm = alg.parse::<DigestAlgorithm>()?;
        Self::new(algorithm, hex).map_err(|_| SchemaError::InvalidDigestFormat(s.to_string()))
    }

    /// The hash function.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The lower-case hex value.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Hashes an in-memory buffer.
    pub fn from_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let mut hasher = DigestHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Hashes the UTF-8 bytes of a string.
    pub fn from_string(algorithm: DigestAlgorithm, s: &str) -> Self {
        Self::from_bytes(algorithm, s.as_bytes())
    }

    /// Hashes everything a reader yields, in 64 KiB chunks.
    pub fn from_reader(algorithm: DigestAlgorithm, mut reader: impl Read) -> Result<Self> {
        let mut hasher = DigestHasher::new(algorithm);
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }

    /// Hashes a file.
    ///
    /// A missing file hashes like empty content. Callers that care about
    /// existence must check it themselves.
    pub fn from_file(algorithm: DigestAlgorithm, path: &Path) -> Result<Self> {
        match File::open(path) {
            Ok(file) => Self::from_reader(algorithm, file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::from_bytes(algorithm, b"")),
            Err(e) => Err(e.into()),
        }
    }

    /// Hashes a directory tree by content only.
    ///
    /// Every regular file is hashed, the results are keyed by their
    /// `/`-separated relative path in sorted order, and the JSON encoding of
    /// that map is hashed again. Creation order, mtimes and permissions do
    /// not affect the result.
    pub fn from_dir(algorithm: DigestAlgorithm, dir: &Path) -> Result<Self> {
        let mut files = BTreeMap::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let digest = Self::from_file(algorithm, entry.path())?;
            files.insert(key, digest.to_string());
        }
        let manifest = serde_json::to_string(&files)?;
        Ok(Self::from_string(algorithm, &manifest))
    }

    /// True when `data` hashes to this digest.
    pub fn verify_bytes(&self, data: &[u8]) -> bool {
        Self::from_bytes(self.algorithm, data) == *self
    }

    /// True when `s` hashes to this digest.
    pub fn verify_string(&self, s: &str) -> bool {
        self.verify_bytes(s.as_bytes())
    }

    /// True when the file at `path` hashes to this digest.
    pub fn verify_file(&self, path: &Path) -> Result<bool> {
        Ok(Self::from_file(self.algorithm, path)? == *self)
    }

    /// True when the directory at `path` hashes to this digest.
    pub fn verify_dir(&self, path: &Path) -> Result<bool> {
        Ok(Self::from_dir(self.algorithm, path)? == *self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.alias(), self.hex)
    }
}

impl FromStr for Digest {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
