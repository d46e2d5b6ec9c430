use std::str::FromStr;

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, ValidationError};

const MIME_SUFFIX: &str = ".mime";

/// Name of a cached MIME blob
///
/// Names are the hex SHA-256 of the current time and a random seed, so they
/// cannot be guessed from the record they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MimeFileName(String);

impl MimeFileName {
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);

        let mut hasher = Sha256::new();
        hasher.update(
            chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_le_bytes(),
        );
        hasher.update(seed);

        Self(format!("{}{MIME_SUFFIX}", hex::encode(hasher.finalize())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MimeFileName {
    type Err = ValidationError;

    /// Only `<64 lowercase hex>.mime` is accepted, which also keeps names free
    /// of path separators.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let valid = s.strip_suffix(MIME_SUFFIX).is_some_and(|stem| {
            stem.len() == 64
                && stem
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        });

        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidMimeFileName(s.to_string()))
        }
    }
}

impl TryFrom<String> for MimeFileName {
    type Error = ValidationError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MimeFileName> for String {
    fn from(value: MimeFileName) -> Self {
        value.0
    }
}

impl std::fmt::Display for MimeFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for original MIME messages of failed sends.
///
/// Blobs are immutable once written.
#[async_trait]
pub trait MimeCache: Send + Sync + std::fmt::Debug {
    /// Store `content` under a freshly generated name
    async fn write(&self, content: &[u8]) -> Result<MimeFileName>;

    /// `Ok(None)` when no blob exists under `name`
    async fn read(&self, name: &MimeFileName) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, name: &MimeFileName) -> Result<bool>;

    async fn remove(&self, name: &MimeFileName) -> Result<()>;
}
