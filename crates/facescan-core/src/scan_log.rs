//! Scan log — every saved face as one entry of a JSON document.
//!
//! The log is an in-memory sequence persisted as a full snapshot
//! (`{"scans": [...]}`) after every mutation. Snapshots are written to a
//! sibling `.tmp` file and renamed over the log, so a reader sees either the
//! previous or the new document. There is no locking: one writer per file.

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const EXPORT_HEADER: [&str; 4] = ["face_id", "timestamp", "filepath", "confidence"];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read scan log {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("scan log {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("scan log I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize scan log: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write CSV export: {0}")]
    Csv(#[from] csv::Error),
}

/// One detected-and-saved face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub face_id: String,
    /// ISO-8601 local time at which the event was logged.
    pub timestamp: String,
    pub filepath: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub scan_number: u64,
}

impl ScanEvent {
    /// Build an event stamped with the current local time.
    pub fn new(
        face_id: impl Into<String>,
        filepath: &Path,
        confidence: Option<f32>,
        scan_number: u64,
    ) -> Self {
        Self {
            face_id: face_id.into(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            filepath: filepath.to_string_lossy().into_owned(),
            confidence,
            scan_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub total_scans: usize,
    /// Distinct face ids, not distinct people.
    pub unique_faces: usize,
}

/// What cleanup does with entries whose image file no longer exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingFilePolicy {
    /// Leave the entry in the log.
    #[default]
    Keep,
    /// Drop the entry and count it as removed.
    Prune,
}

#[derive(Deserialize)]
struct ScanLogDocument {
    scans: Vec<ScanEvent>,
}

#[derive(Serialize)]
struct ScanLogSnapshot<'a> {
    scans: &'a [ScanEvent],
}

enum FileAge {
    Expired,
    Fresh,
    Missing,
}

#[derive(Debug)]
pub struct ScanLog {
    path: PathBuf,
    scans: Vec<ScanEvent>,
}

impl ScanLog {
    /// An empty log that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scans: Vec::new(),
        }
    }

    /// Load the log at `path`. A missing file is an empty log.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(source) => return Err(LoadError::Io { path, source }),
        };

        match serde_json::from_slice::<ScanLogDocument>(&bytes) {
            Ok(doc) => {
                tracing::debug!(path = %path.display(), scans = doc.scans.len(), "loaded scan log");
                Ok(Self {
                    path,
                    scans: doc.scans,
                })
            }
            Err(source) => Err(LoadError::Corrupt { path, source }),
        }
    }

    /// Load the log, replacing an unreadable or corrupt one with an empty log.
    ///
    /// The discarded file is not repaired or backed up; the next write
    /// overwrites it.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(error = %e, "starting with an empty scan log");
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> &[ScanEvent] {
        &self.scans
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// Append an event and persist the whole log.
    ///
    /// On a write failure the event stays in memory and is flushed with the
    /// next successful write.
    pub fn append(&mut self, event: ScanEvent) -> Result<(), LogError> {
        tracing::debug!(face_id = %event.face_id, scan_number = event.scan_number, "logging scan");
        self.scans.push(event);
        self.persist()
    }

    pub fn stats(&self) -> ScanStats {
        let unique: HashSet<&str> = self.scans.iter().map(|s| s.face_id.as_str()).collect();
        ScanStats {
            total_scans: self.scans.len(),
            unique_faces: unique.len(),
        }
    }

    /// Delete images (and their entries) last modified more than
    /// `older_than_days` days ago. Returns the number of entries removed.
    pub fn cleanup(
        &mut self,
        older_than_days: u64,
        policy: MissingFilePolicy,
    ) -> Result<usize, LogError> {
        let age = Duration::from_secs(older_than_days.saturating_mul(SECONDS_PER_DAY));
        let cutoff = SystemTime::now().checked_sub(age).unwrap_or(UNIX_EPOCH);
        self.cleanup_before(cutoff, policy)
    }

    /// Delete images whose mtime is strictly before `cutoff`, with their entries.
    ///
    /// Stops at the first I/O error; whatever was removed up to that point is
    /// still persisted before the error is returned.
    pub fn cleanup_before(
        &mut self,
        cutoff: SystemTime,
        policy: MissingFilePolicy,
    ) -> Result<usize, LogError> {
        let mut removed = 0usize;
        let mut failure: Option<io::Error> = None;

        self.scans.retain(|scan| {
            if failure.is_some() {
                return true;
            }
            let path = Path::new(&scan.filepath);
            let outcome = file_age(path, cutoff).and_then(|age| match age {
                FileAge::Expired => fs::remove_file(path).map(|()| false),
                FileAge::Fresh => Ok(true),
                FileAge::Missing => Ok(policy == MissingFilePolicy::Keep),
            });
            match outcome {
                Ok(true) => true,
                Ok(false) => {
                    tracing::debug!(face_id = %scan.face_id, "removed expired scan");
                    removed += 1;
                    false
                }
                Err(e) => {
                    failure = Some(e);
                    true
                }
            }
        });

        if removed > 0 {
            self.persist()?;
            tracing::info!(removed, "cleaned up old face images");
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }

    /// Write every event as CSV: `face_id,timestamp,filepath,confidence`.
    pub fn export(&self, path: &Path) -> Result<(), LogError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(EXPORT_HEADER)?;
        for scan in &self.scans {
            let confidence = scan.confidence.map(|c| c.to_string()).unwrap_or_default();
            writer.write_record([
                scan.face_id.as_str(),
                scan.timestamp.as_str(),
                scan.filepath.as_str(),
                confidence.as_str(),
            ])?;
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), rows = self.scans.len(), "exported scan log");
        Ok(())
    }

    fn persist(&self) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&ScanLogSnapshot { scans: &self.scans })?;
        write_atomic(&self.path, &data)?;
        Ok(())
    }
}

/// Default export file name, e.g. `scan_log_20240131_235959.csv`.
pub fn default_export_name(now: DateTime<Local>) -> String {
    format!("scan_log_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn file_age(path: &Path, cutoff: SystemTime) -> io::Result<FileAge> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileAge::Missing),
        Err(e) => return Err(e),
    };
    if meta.modified()? < cutoff {
        Ok(FileAge::Expired)
    } else {
        Ok(FileAge::Fresh)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    let result = File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
