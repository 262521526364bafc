/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::verify
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Check staged artifacts against the manifest-declared byte
    size and SHA-256 digest.

  Security / Safety Notes:
    Read-only access to the staging directory.

  Dependencies:
    sha2 for hashing, tokio for streamed reads.

  Operational Scope:
    Called by the installer before any archive is trusted.

  Revision History:
    2025-11-12 COD  Added artifact verifier.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Cheap size check before digest computation
    - Verdicts carry expected and actual values
============================================================*/

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{Result, SyntoolsError};

const READ_BUFFER: usize = 64 * 1024;

/// Outcome of a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    HashMismatch { expected: String, actual: String },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("ok"),
            Verdict::Missing => f.write_str("artifact missing"),
            Verdict::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected} bytes, found {actual}")
            }
            Verdict::HashMismatch { expected, actual } => {
                write!(f, "sha256 mismatch: expected {expected}, found {actual}")
            }
        }
    }
}

/// Size + digest verifier. Counts digest computations.
#[derive(Debug, Default)]
pub struct Verifier {
    hash_invocations: AtomicUsize,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_invocations(&self) -> usize {
        self.hash_invocations.load(Ordering::SeqCst)
    }

    pub async fn verify(
        &self,
        path: &Path,
        expected_size: u64,
        expected_hash: &str,
    ) -> Result<Verdict> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Verdict::Missing),
            Err(err) => {
                return Err(SyntoolsError::Filesystem(format!(
                    "Failed to stat {}: {err}",
                    path.display()
                )))
            }
        };
        if metadata.len() != expected_size {
            return Ok(Verdict::SizeMismatch {
                expected: expected_size,
                actual: metadata.len(),
            });
        }

        let actual = self.sha256_file(path).await?;
        if actual.eq_ignore_ascii_case(expected_hash) {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::HashMismatch {
                expected: expected_hash.to_string(),
                actual,
            })
        }
    }

    async fn sha256_file(&self, path: &Path) -> Result<String> {
        self.hash_invocations.fetch_add(1, Ordering::SeqCst);
        let mut file = tokio::fs::File::open(path).await.map_err(|err| {
            SyntoolsError::Filesystem(format!("Failed to open {}: {err}", path.display()))
        })?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[tokio::test]
    async fn matching_artifact_passes_with_uppercase_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        std::fs::write(&path, b"toolchain").unwrap();
        let verifier = Verifier::new();

        let verdict = verifier
            .verify(&path, 9, &digest(b"toolchain").to_ascii_uppercase())
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(verifier.hash_invocations(), 1);
    }

    #[tokio::test]
    async fn size_mismatch_skips_hashing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        std::fs::write(&path, b"half").unwrap();
        let verifier = Verifier::new();

        let verdict = verifier
            .verify(&path, 9, &digest(b"toolchain"))
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::SizeMismatch {
                expected: 9,
                actual: 4
            }
        );
        assert_eq!(verifier.hash_invocations(), 0);
    }

    #[tokio::test]
    async fn same_size_different_content_is_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        std::fs::write(&path, b"toolcha1n").unwrap();
        let verifier = Verifier::new();

        let verdict = verifier
            .verify(&path, 9, &digest(b"toolchain"))
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::HashMismatch { .. }));
        assert!(verdict.to_string().contains(&digest(b"toolcha1n")));
    }

    #[tokio::test]
    async fn missing_file_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = Verifier::new()
            .verify(&dir.path().join("nope"), 1, &digest(b""))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Missing);
    }
}
