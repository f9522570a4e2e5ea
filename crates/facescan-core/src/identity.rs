//! Face identity — `face_<digest8>_<epoch_seconds>`.
//!
//! The digest is the first 8 hex characters of SHA-256 over the JPEG-encoded
//! crop. Identical pixels within the same second yield the same id; the same
//! face one second later does not. This is a dedup key, not a biometric id.

use image::{GrayImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const DIGEST_PREFIX_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("failed to encode face image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Source of the wall-clock seconds embedded in face ids.
pub trait Clock {
    fn unix_seconds(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock frozen at one instant, for reproducible ids.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn unix_seconds(&self) -> u64 {
        self.0
    }
}

/// Derives face ids from crop content and capture time.
pub struct FaceIdentity {
    clock: Box<dyn Clock>,
}

impl Default for FaceIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceIdentity {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
        }
    }

    /// Compute the id for a cropped face.
    pub fn generate(&self, face: &GrayImage) -> Result<String, IdentityError> {
        let encoded = encode_jpeg(face)?;
        Ok(format!(
            "face_{}_{}",
            content_digest(&encoded),
            self.clock.unix_seconds()
        ))
    }
}

/// JPEG-encode a grayscale image in memory.
pub fn encode_jpeg(face: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    face.write_to(&mut buf, ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}

/// First 8 lowercase hex characters of SHA-256 over `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hex = format!("{:x}", Sha256::digest(bytes));
    hex.truncate(DIGEST_PREFIX_LEN);
    hex
}
