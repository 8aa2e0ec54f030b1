//! Digest algorithms and whole-file hashes.
//!
//! Digests travel as base64 in the JSON sidecars, and algorithms are named
//! the way the repository publishes them (`SHA-256`, `SHA-512`, `BLAKE3`).

use crate::error::{BlockMapError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash algorithm used for chunk checksums and whole-file hashes.
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::HashAlgorithm;
///
/// let algorithm: HashAlgorithm = "sha-256".parse().unwrap();
/// assert_eq!(algorithm, HashAlgorithm::Sha256);
/// assert_eq!(algorithm.digest(b"abc").len(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256
    #[default]
    #[serde(rename = "SHA-256", alias = "SHA256", alias = "sha-256", alias = "sha256")]
    Sha256,
    /// SHA-512
    #[serde(rename = "SHA-512", alias = "SHA512", alias = "sha-512", alias = "sha512")]
    Sha512,
    /// BLAKE3
    #[serde(rename = "BLAKE3", alias = "blake3")]
    Blake3,
}

impl HashAlgorithm {
    /// Returns the canonical name of the algorithm.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
            Self::Blake3 => "BLAKE3",
        }
    }

    /// Returns the digest length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 | Self::Blake3 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Computes the digest of an in-memory buffer.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = Hasher::new(self);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = BlockMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "SHA-256" | "SHA256" => Ok(Self::Sha256),
            "SHA-512" | "SHA512" => Ok(Self::Sha512),
            "BLAKE3" => Ok(Self::Blake3),
            _ => Err(BlockMapError::UnknownAlgorithm {
                name: s.to_string(),
            }),
        }
    }
}

/// Incremental hasher over any supported algorithm.
#[derive(Debug, Clone)]
pub(crate) enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    pub(crate) fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub(crate) fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

/// Whole-file content hash, as published in the `.hash.json` sidecar.
///
/// Two hashes are equal iff both algorithm and digest match.
///
/// # Examples
///
/// ```
/// use marketplace_blockmap::{FileHash, HashAlgorithm};
///
/// let hash = FileHash::from_reader(HashAlgorithm::Sha256, &b"plugin bytes"[..]).unwrap();
/// let json = serde_json::to_string(&hash).unwrap();
/// assert!(json.contains("\"algorithm\":\"SHA-256\""));
///
/// let parsed: FileHash = serde_json::from_str(&json).unwrap();
/// assert_eq!(parsed, hash);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHash {
    /// Algorithm the digest was computed with
    pub algorithm: HashAlgorithm,
    /// Raw digest bytes
    #[serde(rename = "hash", alias = "digest", with = "crate::base64_serde")]
    pub digest: Vec<u8>,
}

impl FileHash {
    /// Creates a hash from its parts.
    #[must_use]
    pub const fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Self {
        Self { algorithm, digest }
    }

    /// Hashes everything readable from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Io`] if reading fails.
    pub fn from_reader<R: Read>(algorithm: HashAlgorithm, mut reader: R) -> Result<Self> {
        let mut hasher = Hasher::new(algorithm);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::new(algorithm, hasher.finalize()))
    }

    /// Hashes everything readable from an async `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Io`] if reading fails.
    pub async fn from_async_reader<R>(algorithm: HashAlgorithm, mut reader: R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut hasher = Hasher::new(algorithm);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::new(algorithm, hasher.finalize()))
    }

    /// Parses a hash from the `.hash.json` sidecar body.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Json`] if the body is not a valid hash document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the hash into the `.hash.json` sidecar body.
    ///
    /// # Errors
    ///
    /// Returns [`BlockMapError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, crate::base64_serde::encode(&self.digest))
    }
}
