//! Versioned, content-addressed store for fitted models.
//!
//! Layout of the artifact directory:
//!
//! ```text
//! artifacts/
//!   manifest.json                      # schema_version + one entry per write
//!   feature_pipeline-v1-3fa2c1d0.json
//!   anomaly_model-v1-9b0e44aa.json
//!   clustering-v1-51c2be07.json
//! ```
//!
//! Files are immutable once written. Every write is staged in a temp file
//! and renamed into place, and loads re-hash the file against the manifest.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    FeaturePipeline,
    AnomalyModel,
    Clustering,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::FeaturePipeline => "feature_pipeline",
            ArtifactKind::AnomalyModel => "anomaly_model",
            ArtifactKind::Clustering => "clustering",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("no {0} artifact found; run training first")]
    Missing(ArtifactKind),

    #[error("digest mismatch for {file}: manifest says {expected}, file hashes to {actual}")]
    DigestMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("anomaly model was trained on pipeline {expected} but the current pipeline is {actual}")]
    PipelineMismatch { expected: String, actual: String },

    #[error("unsupported manifest schema version {0}")]
    SchemaVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    pub version: u32,
    pub file: String,
    /// Hex SHA-256 of the file contents.
    pub sha256: String,
    pub bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactEntry {
    pub fn short_digest(&self) -> &str {
        &self.sha256[..self.sha256.len().min(8)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub artifacts: Vec<ArtifactEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            artifacts: Vec::new(),
        }
    }
}

impl Manifest {
    pub fn latest(&self, kind: ArtifactKind) -> Option<&ArtifactEntry> {
        self.artifacts
            .iter()
            .filter(|e| e.kind == kind)
            .max_by_key(|e| e.version)
    }
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `bytes` to `path` through a sibling temp file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Current manifest; an absent manifest is an empty store.
    pub fn manifest(&self) -> Result<Manifest, ArtifactError> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let manifest: Manifest = serde_json::from_slice(&fs::read(&path)?)?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(ArtifactError::SchemaVersion(manifest.schema_version));
        }
        Ok(manifest)
    }

    pub fn latest(&self, kind: ArtifactKind) -> Result<Option<ArtifactEntry>, ArtifactError> {
        Ok(self.manifest()?.latest(kind).cloned())
    }

    /// Persist a new version of `kind`. Earlier versions stay on disk.
    pub fn save<T: Serialize>(
        &self,
        kind: ArtifactKind,
        value: &T,
    ) -> Result<ArtifactEntry, ArtifactError> {
        fs::create_dir_all(&self.dir)?;
        let mut manifest = self.manifest()?;

        let bytes = serde_json::to_vec_pretty(value)?;
        let sha256 = sha256_hex(&bytes);
        let version = manifest.latest(kind).map_or(1, |e| e.version + 1);
        let file = format!("{}-v{}-{}.json", kind, version, &sha256[..8]);

        write_atomic(&self.dir.join(&file), &bytes)?;

        let entry = ArtifactEntry {
            kind,
            version,
            file,
            sha256,
            bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };
        manifest.artifacts.push(entry.clone());
        write_atomic(
            &self.dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;

        info!(
            kind = %kind,
            version = entry.version,
            digest = entry.short_digest(),
            "artifact saved: {}",
            entry.file
        );
        Ok(entry)
    }

    /// Load the newest version of `kind`, verifying its digest.
    pub fn load<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
    ) -> Result<(T, ArtifactEntry), ArtifactError> {
        let entry = self.latest(kind)?.ok_or(ArtifactError::Missing(kind))?;
        let path = self.dir.join(&entry.file);
        if !path.exists() {
            return Err(ArtifactError::Missing(kind));
        }

        let bytes = fs::read(&path)?;
        let actual = sha256_hex(&bytes);
        if actual != entry.sha256 {
            return Err(ArtifactError::DigestMismatch {
                file: entry.file.clone(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok((serde_json::from_slice(&bytes)?, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        weights: Vec<f64>,
    }

    #[test]
    fn save_then_load_latest_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let v1 = store.save(ArtifactKind::Clustering, &Payload { weights: vec![1.0] }).unwrap();
        let v2 = store.save(ArtifactKind::Clustering, &Payload { weights: vec![2.0] }).unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert!(v2.file.starts_with("clustering-v2-"));
        assert!(v2.file.ends_with(&format!("{}.json", v2.short_digest())));

        let (loaded, entry): (Payload, _) = store.load(ArtifactKind::Clustering).unwrap();
        assert_eq!(loaded, Payload { weights: vec![2.0] });
        assert_eq!(entry, v2);

        // First version still on disk.
        assert!(dir.path().join(&v1.file).exists());
        assert_eq!(store.manifest().unwrap().artifacts.len(), 2);
    }

    #[test]
    fn missing_kind_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store.load::<Payload>(ArtifactKind::AnomalyModel).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(ArtifactKind::AnomalyModel)));
    }

    #[test]
    fn tampered_file_fails_digest_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let entry = store.save(ArtifactKind::FeaturePipeline, &Payload { weights: vec![0.5] }).unwrap();

        fs::write(dir.path().join(&entry.file), br#"{"weights":[9.0]}"#).unwrap();
        let err = store.load::<Payload>(ArtifactKind::FeaturePipeline).unwrap_err();
        assert!(matches!(err, ArtifactError::DigestMismatch { .. }));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(ArtifactKind::AnomalyModel, &Payload { weights: vec![] }).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unknown_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"schema_version": 2, "artifacts": []}"#,
        )
        .unwrap();
        let err = ArtifactStore::new(dir.path()).manifest().unwrap_err();
        assert!(matches!(err, ArtifactError::SchemaVersion(2)));
    }
}
