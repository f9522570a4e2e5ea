//! Face image storage — one JPEG per face id.

use image::{GrayImage, ImageFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot create face directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write face image {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Writes cropped faces as `<dir>/<face_id>.jpg`.
#[derive(Debug, Clone)]
pub struct FaceStore {
    dir: PathBuf,
}

impl FaceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, face_id: &str) -> PathBuf {
        self.dir.join(format!("{face_id}.jpg"))
    }

    /// Save a face crop. An existing file with the same id is overwritten.
    pub fn save(&self, face: &GrayImage, face_id: &str) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(face_id);
        face.save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(face_id, path = %path.display(), "stored face image");
        Ok(path)
    }
}
