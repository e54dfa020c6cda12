//! Source and target image inputs.

use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a recognizable image")]
    NotAnImage(String),
}

/// An image file loaded once and shared by every request that uses it.
#[derive(Debug, Clone)]
pub struct ImageInput {
    id: String,
    bytes: Arc<[u8]>,
    format: ImageFormat,
}

impl ImageInput {
    /// Read an image file. The file stem becomes the id used in logs
    /// and result file names.
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let bytes = std::fs::read(path).map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(id, bytes)
    }

    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> Result<Self, InputError> {
        let id = id.into();
        let format = image::guess_format(&bytes).map_err(|_| InputError::NotAnImage(id.clone()))?;
        Ok(Self {
            id,
            bytes: Arc::from(bytes),
            format,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

/// List image files directly inside `dir`, sorted by file name.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>, InputError> {
    let entries = std::fs::read_dir(dir).map_err(|source| InputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every image in `dir`, skipping (with a warning) files that fail.
pub fn load_dir(dir: &Path) -> Result<Vec<ImageInput>, InputError> {
    let mut inputs = Vec::new();
    for path in discover_images(dir)? {
        match ImageInput::load(&path) {
            Ok(input) => inputs.push(input),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping input"),
        }
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_from_bytes_detects_format() {
        let input = ImageInput::from_bytes("face_a", JPEG.to_vec()).unwrap();
        assert_eq!(input.id(), "face_a");
        assert_eq!(input.format(), ImageFormat::Jpeg);
        assert_eq!(input.len(), JPEG.len());
    }

    #[test]
    fn test_rejects_non_image() {
        assert!(matches!(
            ImageInput::from_bytes("notes", b"hello".to_vec()),
            Err(InputError::NotAnImage(ref id)) if id == "notes"
        ));
    }

    #[test]
    fn test_discover_and_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("source_b.png"), PNG).unwrap();
        std::fs::write(dir.path().join("source_a.JPG"), JPEG).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "x").unwrap();
        std::fs::write(dir.path().join("broken.jpg"), "not an image").unwrap();

        let found = discover_images(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["broken.jpg", "source_a.JPG", "source_b.png"]);

        let loaded = load_dir(dir.path()).unwrap();
        let ids: Vec<_> = loaded.iter().map(|i| i.id()).collect();
        assert_eq!(ids, ["source_a", "source_b"]);
    }

    #[test]
    fn test_missing_dir() {
        assert!(matches!(
            discover_images(Path::new("/nonexistent/swapbench")),
            Err(InputError::Io { .. })
        ));
    }
}
