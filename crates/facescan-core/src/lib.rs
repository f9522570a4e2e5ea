//! facescan-core — Face scanning engine.
//!
//! Turns detected faces into scan records: a content-derived face id, a
//! cropped JPEG on disk and an entry in the JSON scan log. Detection runs
//! behind the [`FaceDetector`] trait; frames come from an [`ImageSource`].

pub mod crop;
pub mod detector;
pub mod face_store;
pub mod identity;
pub mod layout;
pub mod scan_log;
pub mod session;
pub mod types;

use std::path::PathBuf;

pub use crop::{crop_face, FACE_SIZE};
pub use detector::{DetectorError, FaceDetector, ScrfdDetector};
pub use face_store::{FaceStore, StorageError};
pub use identity::{Clock, FaceIdentity, FixedClock, IdentityError, SystemClock};
pub use layout::DataLayout;
pub use scan_log::{LoadError, LogError, MissingFilePolicy, ScanEvent, ScanLog, ScanStats};
pub use session::{
    Control, HeadlessPreview, ImageSource, Preview, ScanOptions, ScanSession, SessionError,
    SessionState, SessionSummary, StopReason,
};
pub use types::BoundingBox;

/// Default directory for detector model files.
///
/// `$XDG_DATA_HOME/facescan/models`, falling back to `~/.local/share/facescan/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facescan")
        .join("models")
}
