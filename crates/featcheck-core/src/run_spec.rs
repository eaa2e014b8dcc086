//! Run identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::DiscoveryError;
use crate::registry::Exemplar;

/// Identity of one harness run.
///
/// Two runs over an unchanged corpus with the same toolchain share a
/// `corpus_digest` and `toolchain`, which is what makes their reports
/// comparable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSpec {
    /// Unique id of this run.
    pub run_id: Uuid,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Corpus root.
    pub root: PathBuf,

    /// Category filter in effect (empty = all).
    pub categories: Vec<String>,

    /// SHA-256 over exemplar ids, sources and fixtures (deterministic).
    pub corpus_digest: String,

    /// First line of the toolchain's `--version` output.
    pub toolchain: String,

    /// Number of exemplars scheduled.
    pub exemplar_count: usize,
}

impl RunSpec {
    /// Stamp a new run over `exemplars`.
    pub fn new(
        root: PathBuf,
        categories: Vec<String>,
        exemplars: &[Exemplar],
        toolchain: String,
    ) -> Result<Self, DiscoveryError> {
        let corpus_digest = compute_corpus_digest(exemplars)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            root,
            categories,
            corpus_digest,
            toolchain,
            exemplar_count: exemplars.len(),
        })
    }

    /// Short form of the corpus digest for display.
    pub fn short_digest(&self) -> &str {
        let end = self.corpus_digest.len().min(12);
        &self.corpus_digest[..end]
    }
}

/// Compute a deterministic digest of the ordered exemplar set.
///
/// Sensitive to order, source contents and declared fixtures.
pub fn compute_corpus_digest(exemplars: &[Exemplar]) -> Result<String, DiscoveryError> {
    let mut hasher = Sha256::new();
    for exemplar in exemplars {
        let source = std::fs::read(&exemplar.source).map_err(|e| DiscoveryError::Io {
            path: exemplar.source.clone(),
            source: e,
        })?;

        hasher.update(exemplar.id.as_bytes());
        hasher.update(b"\0");
        hasher.update(&source);
        hasher.update(b"\0");
        match &exemplar.expected_stdout {
            Some(stdout) => {
                hasher.update(b"stdout:");
                hasher.update(stdout);
            }
            None => hasher.update(b"stdout:-"),
        }
        hasher.update(b"\0");
        hasher.update(exemplar.expected_exit.to_le_bytes());
        hasher.update(b"\0");
    }
    Ok(hex::encode(hasher.finalize()))
}
