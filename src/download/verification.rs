use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::UpdateError;

/// How an advertised checksum string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumKind {
    /// A SHA-256 digest (`sha256:<hex>` or bare 64 hex characters), lowercased.
    Sha256(String),
    /// A 32-hex digest (MD5, what update servers commonly advertise). Not verified.
    Md5,
    /// Anything else. Not verified.
    Unrecognized,
}

impl ChecksumKind {
    pub fn parse(checksum: &str) -> Self {
        let trimmed = checksum.trim();
        let hex_part = trimmed
            .strip_prefix("sha256:")
            .or_else(|| trimmed.strip_prefix("SHA256:"))
            .unwrap_or(trimmed);
        let is_hex = !hex_part.is_empty() && hex_part.chars().all(|c| c.is_ascii_hexdigit());

        match (is_hex, hex_part.len()) {
            (true, 64) => Self::Sha256(hex_part.to_ascii_lowercase()),
            (true, 32) if hex_part.len() == trimmed.len() => Self::Md5,
            _ => Self::Unrecognized,
        }
    }
}

/// Verifies downloaded packages against the checksum the server advertised.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// SHA-256 of a file, formatted as `sha256:<hex>`.
    pub async fn compute_sha256(file_path: &Path) -> Result<String, UpdateError> {
        debug!("Computing SHA256 checksum for: {}", file_path.display());

        let contents = fs::read(file_path).await.map_err(|e| {
            warn!("Failed to read {}: {e}", file_path.display());
            UpdateError::PackageFileMissing {
                path: file_path.to_path_buf(),
            }
        })?;

        let digest = Sha256::digest(&contents);
        Ok(format!("sha256:{}", hex::encode(digest)))
    }

    /// Verify `file_path` against `expected`.
    ///
    /// Returns `Ok(true)` when the checksum was verified and `Ok(false)` when the
    /// advertised format cannot be checked (verification skipped).
    ///
    /// # Errors
    ///
    /// [`UpdateError::ChecksumMismatch`] when the digests differ.
    pub async fn verify(file_path: &Path, expected: &str) -> Result<bool, UpdateError> {
        let expected_hex = match ChecksumKind::parse(expected) {
            ChecksumKind::Sha256(hex) => hex,
            ChecksumKind::Md5 => {
                warn!("Server advertised an MD5 checksum; skipping verification");
                return Ok(false);
            }
            ChecksumKind::Unrecognized => {
                warn!("Unrecognized checksum format '{expected}'; skipping verification");
                return Ok(false);
            }
        };

        info!("Verifying checksum for: {}", file_path.display());
        let actual = Self::compute_sha256(file_path).await?;
        let expected = format!("sha256:{expected_hex}");

        if actual != expected {
            return Err(UpdateError::ChecksumMismatch {
                expected,
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(true)
    }
}
