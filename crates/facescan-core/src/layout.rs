//! On-disk layout of a data directory.
//!
//! ```text
//! <data_dir>/
//!   scanned_faces/<face_id>.jpg
//!   logs/scan_log.json
//! ```

use std::path::{Path, PathBuf};

const FACES_DIR: &str = "scanned_faces";
const LOGS_DIR: &str = "logs";
const LOG_FILE: &str = "scan_log.json";

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.root.join(FACES_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE)
    }

    /// Create the data, faces and logs directories if absent.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.faces_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        tracing::debug!(root = %self.root.display(), "data directories ready");
        Ok(())
    }
}
