//! Scan session — the capture loop.
//!
//! `Idle → Scanning → Stopped`. One frame read, one detection pass and the
//! saves for that frame per iteration, all on the caller's thread. The only
//! cross-thread state is the shutdown flag, checked once per iteration.

use crate::crop::crop_face;
use crate::detector::FaceDetector;
use crate::face_store::FaceStore;
use crate::identity::FaceIdentity;
use crate::scan_log::{ScanEvent, ScanLog};
use crate::types::BoundingBox;
use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Supplies frames to the session. Owned by the session for its lifetime.
pub trait ImageSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Acquire the underlying device.
    fn open(&mut self) -> Result<(), Self::Error>;
    /// Block until the next grayscale frame is available.
    fn read_frame(&mut self) -> Result<GrayImage, Self::Error>;
    /// Release the device. Must be safe to call when not open.
    fn release(&mut self);
    fn is_open(&self) -> bool;
}

/// A user request read from the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
    /// Save the first detected face of the current frame.
    SaveOne,
}

/// Debug preview and interactive controls, used only when display is on.
pub trait Preview {
    /// Called once per frame with its detections and the ids saved from it.
    fn show(&mut self, frame: &GrayImage, faces: &[BoundingBox], saved: &[String]);
    /// Poll for a pending control without waiting for one.
    fn poll(&mut self) -> Control;
    /// Called after a manual single-face save.
    fn manual_saved(&mut self, _face_id: &str) {}
}

/// Preview that shows nothing and never requests anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessPreview;

impl Preview for HeadlessPreview {
    fn show(&mut self, _frame: &GrayImage, _faces: &[BoundingBox], _saved: &[String]) {}

    fn poll(&mut self) -> Control {
        Control::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Save and log every detected face.
    pub save_images: bool,
    /// Drive the preview and its controls.
    pub display: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            save_images: true,
            display: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user asked to quit through the preview.
    Quit,
    /// The shutdown flag was raised.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub faces_detected: u64,
    pub saved: u64,
    pub stop_reason: StopReason,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("image source unavailable: {0}")]
    Acquisition(#[source] BoxError),
    #[error("frame read failed: {0}")]
    FrameRead(#[source] BoxError),
    #[error("session is {0:?}, expected Idle")]
    NotIdle(SessionState),
}

/// Owns the source, detector, identity, store and log for one scanning run.
pub struct ScanSession<S: ImageSource, D: FaceDetector> {
    source: S,
    detector: D,
    identity: FaceIdentity,
    store: FaceStore,
    log: ScanLog,
    state: SessionState,
    scan_count: u64,
    shutdown: Arc<AtomicBool>,
}

impl<S: ImageSource, D: FaceDetector> ScanSession<S, D> {
    pub fn new(
        source: S,
        detector: D,
        identity: FaceIdentity,
        store: FaceStore,
        log: ScanLog,
    ) -> Self {
        Self {
            source,
            detector,
            identity,
            store,
            log,
            state: SessionState::Idle,
            scan_count: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of scans attempted by this session.
    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    pub fn log(&self) -> &ScanLog {
        &self.log
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Flag that ends the loop at the next iteration once set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Open the source and scan until quit, shutdown or a frame read failure.
    ///
    /// The session is stopped and the source released on every return path.
    /// If the source cannot be opened the session stays `Idle`.
    pub fn start(
        &mut self,
        options: ScanOptions,
        preview: &mut dyn Preview,
    ) -> Result<SessionSummary, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::NotIdle(self.state));
        }

        if let Err(e) = self.source.open() {
            self.source.release();
            tracing::error!(error = %e, "could not open image source");
            return Err(SessionError::Acquisition(Box::new(e)));
        }

        self.state = SessionState::Scanning;
        tracing::info!(
            save_images = options.save_images,
            display = options.display,
            "scanning started"
        );

        let result = self.run(options, preview);
        self.stop();
        result
    }

    /// Stop scanning and release the source. Safe to call repeatedly and from `Idle`.
    pub fn stop(&mut self) {
        if self.state == SessionState::Scanning {
            self.state = SessionState::Stopped;
            tracing::info!(scans = self.scan_count, "face scanner stopped");
        }
        self.source.release();
    }

    fn run(
        &mut self,
        options: ScanOptions,
        preview: &mut dyn Preview,
    ) -> Result<SessionSummary, SessionError> {
        let mut summary = SessionSummary {
            frames: 0,
            faces_detected: 0,
            saved: 0,
            stop_reason: StopReason::Interrupted,
        };

        while self.state == SessionState::Scanning {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("scanning interrupted");
                summary.stop_reason = StopReason::Interrupted;
                return Ok(summary);
            }

            let frame = self.source.read_frame().map_err(|e| {
                tracing::error!(error = %e, "could not read frame");
                SessionError::FrameRead(Box::new(e))
            })?;
            summary.frames += 1;

            let faces = self.detector.detect(&frame).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "face detection failed; skipping frame");
                Vec::new()
            });
            summary.faces_detected += faces.len() as u64;

            let mut saved = Vec::new();
            for face in &faces {
                let Some(crop) = crop_face(&frame, face) else {
                    continue;
                };
                let face_id = match self.identity.generate(&crop) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not derive face id");
                        continue;
                    }
                };
                if options.save_images {
                    if let Some(id) = self.record(&crop, face_id, face.confidence) {
                        saved.push(id);
                    }
                }
            }
            summary.saved += saved.len() as u64;

            if !options.display {
                continue;
            }
            preview.show(&frame, &faces, &saved);
            match preview.poll() {
                Control::Continue => {}
                Control::Quit => {
                    summary.stop_reason = StopReason::Quit;
                    return Ok(summary);
                }
                Control::SaveOne => {
                    if let Some(id) = self.save_first(&frame, &faces) {
                        summary.saved += 1;
                        preview.manual_saved(&id);
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Manual capture: save the first box regardless of `save_images`.
    fn save_first(&mut self, frame: &GrayImage, faces: &[BoundingBox]) -> Option<String> {
        let face = faces.first()?;
        let crop = crop_face(frame, face)?;
        let face_id = self
            .identity
            .generate(&crop)
            .map_err(|e| tracing::warn!(error = %e, "could not derive face id"))
            .ok()?;
        let id = self.record(&crop, face_id, face.confidence)?;
        tracing::info!(face_id = %id, "manually saved face");
        Some(id)
    }

    /// Store a crop and log it. Returns the id only when both succeed;
    /// failures are logged and end this save only.
    fn record(
        &mut self,
        crop: &GrayImage,
        face_id: String,
        confidence: Option<f32>,
    ) -> Option<String> {
        self.scan_count += 1;

        let path = match self.store.save(crop, &face_id) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, face_id = %face_id, "failed to store face image");
                return None;
            }
        };

        let event = ScanEvent::new(face_id.clone(), &path, confidence, self.scan_count);
        if let Err(e) = self.log.append(event) {
            tracing::warn!(error = %e, face_id = %face_id, "failed to persist scan log");
            return None;
        }
        Some(face_id)
    }
}

impl<S: ImageSource, D: FaceDetector> Drop for ScanSession<S, D> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::identity::FixedClock;
    use image::Luma;
    use std::collections::VecDeque;
    use std::io;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedSource {
        frames: VecDeque<GrayImage>,
        fail_open: bool,
        open: bool,
        releases: usize,
    }

    impl ScriptedSource {
        fn with_frames(count: usize) -> Self {
            Self {
                frames: (0..count).map(|i| frame(i as u8)).collect(),
                ..Default::default()
            }
        }
    }

    impl ImageSource for ScriptedSource {
        type Error = io::Error;

        fn open(&mut self) -> Result<(), io::Error> {
            if self.fail_open {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no camera"));
            }
            self.open = true;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<GrayImage, io::Error> {
            self.frames
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended"))
        }

        fn release(&mut self) {
            self.open = false;
            self.releases += 1;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    /// Reports the same boxes for every frame.
    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Err(DetectorError::InferenceFailed("boom".into()))
        }
    }

    #[derive(Default)]
    struct ScriptedPreview {
        controls: VecDeque<Control>,
        shown: usize,
        manual: Vec<String>,
    }

    impl ScriptedPreview {
        fn new(controls: &[Control]) -> Self {
            Self {
                controls: controls.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Preview for ScriptedPreview {
        fn show(&mut self, _frame: &GrayImage, _faces: &[BoundingBox], _saved: &[String]) {
            self.shown += 1;
        }

        fn poll(&mut self) -> Control {
            self.controls.pop_front().unwrap_or(Control::Continue)
        }

        fn manual_saved(&mut self, face_id: &str) {
            self.manual.push(face_id.to_string());
        }
    }

    fn frame(seed: u8) -> GrayImage {
        GrayImage::from_fn(320, 240, |x, y| {
            Luma([((x + 2 * y) as u8).wrapping_mul(3).wrapping_add(seed)])
        })
    }

    fn one_face() -> Vec<BoundingBox> {
        vec![BoundingBox::new(40.0, 30.0, 100.0, 120.0).with_confidence(0.9)]
    }

    fn session<D: FaceDetector>(
        tmp: &TempDir,
        source: ScriptedSource,
        detector: D,
    ) -> ScanSession<ScriptedSource, D> {
        ScanSession::new(
            source,
            detector,
            FaceIdentity::with_clock(FixedClock(1_700_000_000)),
            FaceStore::new(tmp.path().join("scanned_faces")),
            ScanLog::empty(tmp.path().join("logs/scan_log.json")),
        )
    }

    const HEADLESS_SAVE: ScanOptions = ScanOptions {
        save_images: true,
        display: false,
    };

    #[test]
    fn test_open_failure_stays_idle() {
        let tmp = tempfile::tempdir().unwrap();
        let source = ScriptedSource {
            fail_open: true,
            ..Default::default()
        };
        let mut s = session(&tmp, source, FixedDetector(one_face()));

        let err = s.start(HEADLESS_SAVE, &mut HeadlessPreview).unwrap_err();
        assert!(matches!(err, SessionError::Acquisition(_)));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.source().is_open());
        assert!(s.log().is_empty());
    }

    #[test]
    fn test_frame_read_failure_stops_session() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(&tmp, ScriptedSource::with_frames(2), FixedDetector(one_face()));

        let err = s.start(HEADLESS_SAVE, &mut HeadlessPreview).unwrap_err();
        assert!(matches!(err, SessionError::FrameRead(_)));
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(!s.source().is_open());

        // One face per frame, each saved and logged with an increasing number.
        assert_eq!(s.scan_count(), 2);
        let scans = s.log().all();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].scan_number, 1);
        assert_eq!(scans[1].scan_number, 2);
        assert_eq!(scans[0].confidence, Some(0.9));
        for scan in scans {
            assert!(std::path::Path::new(&scan.filepath).exists());
            assert!(scan.face_id.ends_with("_1700000000"));
        }
        assert!(s.log().path().exists());
    }

    #[test]
    fn test_unwritable_log_keeps_scanning() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the logs directory should be.
        std::fs::write(tmp.path().join("logs"), b"not a directory").unwrap();
        let mut preview =
            ScriptedPreview::new(&[Control::Continue, Control::Continue, Control::Quit]);
        let options = ScanOptions {
            save_images: true,
            display: true,
        };
        let mut s = session(&tmp, ScriptedSource::with_frames(5), FixedDetector(one_face()));

        let summary = s.start(options, &mut preview).unwrap();
        assert_eq!(summary.stop_reason, StopReason::Quit);
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.faces_detected, 3);
        assert_eq!(summary.saved, 0);
        assert_eq!(preview.shown, 3);
        assert_eq!(s.scan_count(), 3);
        assert!(!s.log().path().exists());
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[test]
    fn test_no_save_logs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let options = ScanOptions {
            save_images: false,
            display: false,
        };
        let mut s = session(&tmp, ScriptedSource::with_frames(3), FixedDetector(one_face()));

        assert!(s.start(options, &mut HeadlessPreview).is_err());
        assert!(s.log().is_empty());
        assert_eq!(s.scan_count(), 0);
    }

    #[test]
    fn test_quit_control_stops_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let mut preview = ScriptedPreview::new(&[Control::Continue, Control::Quit]);
        let options = ScanOptions {
            save_images: true,
            display: true,
        };
        let mut s = session(&tmp, ScriptedSource::with_frames(10), FixedDetector(one_face()));

        let summary = s.start(options, &mut preview).unwrap();
        assert_eq!(summary.stop_reason, StopReason::Quit);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.saved, 2);
        assert_eq!(preview.shown, 2);
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(!s.source().is_open());
    }

    #[test]
    fn test_save_one_ignores_save_images_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let mut preview = ScriptedPreview::new(&[Control::SaveOne, Control::Quit]);
        let options = ScanOptions {
            save_images: false,
            display: true,
        };
        let two_faces = vec![
            BoundingBox::new(10.0, 10.0, 80.0, 80.0),
            BoundingBox::new(200.0, 100.0, 80.0, 80.0),
        ];
        let mut s = session(&tmp, ScriptedSource::with_frames(5), FixedDetector(two_faces));

        let summary = s.start(options, &mut preview).unwrap();
        assert_eq!(summary.saved, 1);
        assert_eq!(s.log().len(), 1);
        assert_eq!(s.log().all()[0].scan_number, 1);
        assert_eq!(s.log().all()[0].confidence, None);
        assert_eq!(preview.manual, vec![s.log().all()[0].face_id.clone()]);
    }

    #[test]
    fn test_save_one_without_faces_does_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut preview = ScriptedPreview::new(&[Control::SaveOne, Control::Quit]);
        let options = ScanOptions {
            save_images: false,
            display: true,
        };
        let mut s = session(&tmp, ScriptedSource::with_frames(5), FixedDetector(Vec::new()));

        s.start(options, &mut preview).unwrap();
        assert!(s.log().is_empty());
        assert!(preview.manual.is_empty());
    }

    #[test]
    fn test_controls_ignored_without_display() {
        let tmp = tempfile::tempdir().unwrap();
        let mut preview = ScriptedPreview::new(&[Control::Quit]);
        let mut s = session(&tmp, ScriptedSource::with_frames(3), FixedDetector(one_face()));

        let result = s.start(HEADLESS_SAVE, &mut preview);
        assert!(matches!(result, Err(SessionError::FrameRead(_))));
        assert_eq!(preview.shown, 0);
        assert_eq!(s.log().len(), 3);
    }

    #[test]
    fn test_shutdown_flag_interrupts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(&tmp, ScriptedSource::with_frames(5), FixedDetector(one_face()));
        s.shutdown_handle().store(true, Ordering::SeqCst);

        let summary = s.start(HEADLESS_SAVE, &mut HeadlessPreview).unwrap();
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(summary.frames, 0);
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(!s.source().is_open());
    }

    #[test]
    fn test_detector_failure_skips_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(&tmp, ScriptedSource::with_frames(2), FailingDetector);

        assert!(matches!(
            s.start(HEADLESS_SAVE, &mut HeadlessPreview),
            Err(SessionError::FrameRead(_))
        ));
        assert!(s.log().is_empty());
    }

    #[test]
    fn test_storage_failure_continues_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocked");
        std::fs::write(&blocker, b"file").unwrap();
        let mut s = ScanSession::new(
            ScriptedSource::with_frames(3),
            FixedDetector(one_face()),
            FaceIdentity::with_clock(FixedClock(1)),
            FaceStore::new(&blocker),
            ScanLog::empty(tmp.path().join("scan_log.json")),
        );

        assert!(matches!(
            s.start(HEADLESS_SAVE, &mut HeadlessPreview),
            Err(SessionError::FrameRead(_))
        ));
        // Every frame was processed; counters advanced, nothing logged.
        assert_eq!(s.scan_count(), 3);
        assert!(s.log().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(&tmp, ScriptedSource::with_frames(1), FixedDetector(one_face()));

        s.stop();
        s.stop();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.source().is_open());
        assert_eq!(s.source().releases, 2);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(&tmp, ScriptedSource::with_frames(1), FixedDetector(one_face()));

        let _ = s.start(HEADLESS_SAVE, &mut HeadlessPreview);
        assert!(matches!(
            s.start(HEADLESS_SAVE, &mut HeadlessPreview),
            Err(SessionError::NotIdle(SessionState::Stopped))
        ));
    }
}
