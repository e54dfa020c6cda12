//! Result images and their metadata sidecars.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use swapbench_core::TestRecord;
use thiserror::Error;

const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of `*_metadata.json`.
#[derive(Debug, Serialize)]
pub struct ArtifactMetadata<'a> {
    pub timestamp: String,
    pub run_id: &'a str,
    pub source_id: &'a str,
    pub target_id: &'a str,
    pub template_id: Option<&'a str>,
    pub provider: &'a str,
    pub attempt: u32,
    pub source_face_index: u32,
    pub target_face_index: u32,
    pub inference_seconds: Option<f64>,
    pub wall_clock_ms: u64,
    pub cost_units: Option<f64>,
    pub remaining_credits: Option<f64>,
    pub request_id: Option<&'a str>,
    pub sha256: String,
    pub bytes: usize,
}

/// Where a result landed on disk.
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
    pub sha256: String,
}

impl SavedArtifact {
    /// Image file name, as recorded in the test log.
    pub fn file_name(&self) -> String {
        self.image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Writes result images into one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `image` for `record` along with a metadata sidecar.
    pub fn save(&self, record: &TestRecord, run_id: &str, image: &[u8]) -> Result<SavedArtifact, ArtifactError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let stem = artifact_stem(record);
        let image_path = self.dir.join(format!("{stem}_result.{}", extension_for(image)));
        let metadata_path = self.dir.join(format!("{stem}_metadata.json"));
        let sha256 = sha256_hex(image);

        write(&image_path, image)?;

        let result = &record.result;
        let metadata = ArtifactMetadata {
            timestamp: record.timestamp.to_rfc3339(),
            run_id,
            source_id: &record.source_id,
            target_id: &record.target_id,
            template_id: record.options.template_id.as_deref(),
            provider: record.provider.as_str(),
            attempt: record.attempt,
            source_face_index: record.options.source_face_index,
            target_face_index: record.options.target_face_index,
            inference_seconds: result.inference_seconds,
            wall_clock_ms: result.wall_clock_millis,
            cost_units: result.cost_units,
            remaining_credits: result.remaining_credits,
            request_id: result.request_id.as_deref(),
            sha256: sha256.clone(),
            bytes: image.len(),
        };
        write(&metadata_path, &serde_json::to_vec_pretty(&metadata)?)?;

        tracing::debug!(path = %image_path.display(), bytes = image.len(), "saved result image");
        Ok(SavedArtifact {
            image_path,
            metadata_path,
            sha256,
        })
    }
}

/// `{source}_to_{target}_{provider}`, with `_a{n}` for retry attempts.
fn artifact_stem(record: &TestRecord) -> String {
    let mut stem = format!(
        "{}_to_{}_{}",
        record.source_id,
        record.target_id,
        record.provider.slug()
    );
    if record.attempt > 1 {
        stem.push_str(&format!("_a{}", record.attempt));
    }
    stem
}

fn extension_for(image: &[u8]) -> &'static str {
    image::guess_format(image)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or(DEFAULT_EXTENSION)
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn write(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    std::fs::write(path, contents).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use swapbench_core::{ImageRef, Provider, SwapOptions, SwapResult};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn record(provider: Provider, attempt: u32) -> TestRecord {
        TestRecord {
            timestamp: Utc::now(),
            source_id: "face_a".into(),
            target_id: "card_01".into(),
            provider,
            attempt,
            options: SwapOptions::default(),
            result: SwapResult {
                success: true,
                image: Some(ImageRef::Bytes(PNG.to_vec())),
                cost_units: None,
                inference_seconds: Some(12.5),
                wall_clock_millis: 13_000,
                error_message: None,
                error_kind: None,
                http_status: Some(200),
                remaining_credits: Some(99.0),
                request_id: Some("req-9".into()),
            },
        }
    }

    #[test]
    fn test_save_names_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("results"));

        let saved = store.save(&record(Provider::V43, 1), "run-1", PNG).unwrap();
        assert_eq!(saved.file_name(), "face_a_to_card_01_v43_result.png");
        assert_eq!(std::fs::read(&saved.image_path).unwrap(), PNG);

        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&saved.metadata_path).unwrap()).unwrap();
        assert_eq!(meta["provider"], "v4.3");
        assert_eq!(meta["run_id"], "run-1");
        assert_eq!(meta["bytes"], PNG.len());
        assert_eq!(meta["sha256"], saved.sha256);
        assert_eq!(meta["request_id"], "req-9");
        assert_eq!(saved.sha256.len(), 64);
    }

    #[test]
    fn test_retry_attempts_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let first = store.save(&record(Provider::V2, 1), "r", PNG).unwrap();
        let second = store.save(&record(Provider::V2, 2), "r", PNG).unwrap();
        assert_ne!(first.image_path, second.image_path);
        assert_eq!(second.file_name(), "face_a_to_card_01_v2_a2_result.png");
    }

    #[test]
    fn test_unknown_format_defaults_to_jpg() {
        assert_eq!(extension_for(b"opaque"), "jpg");
        assert_eq!(extension_for(&[0xFF, 0xD8, 0xFF, 0xE0]), "jpg");
    }
}
