use facescan_core::ImageSource;
use facescan_hw::{Camera, CameraError};
use image::GrayImage;

/// [`ImageSource`] over a V4L2 camera, opened on demand and closed on release.
pub struct CameraSource {
    device_path: String,
    width: u32,
    height: u32,
    camera: Option<Camera>,
}

impl CameraSource {
    pub fn new(device_path: &str, width: u32, height: u32) -> Self {
        Self {
            device_path: device_path.to_string(),
            width,
            height,
            camera: None,
        }
    }
}

impl ImageSource for CameraSource {
    type Error = CameraError;

    fn open(&mut self) -> Result<(), CameraError> {
        if self.camera.is_none() {
            let camera = Camera::open(&self.device_path, self.width, self.height)?;
            tracing::info!(
                device = %self.device_path,
                width = camera.width,
                height = camera.height,
                format = ?camera.pixel_format(),
                "camera opened"
            );
            self.camera = Some(camera);
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<GrayImage, CameraError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| CameraError::CaptureFailed("camera is not open".into()))?;
        let frame = camera.capture_frame()?;
        tracing::trace!(sequence = frame.sequence, "frame captured");
        let (width, height) = (frame.width, frame.height);
        GrayImage::from_raw(width, height, frame.data).ok_or_else(|| {
            CameraError::CaptureFailed(format!("frame buffer does not match {width}x{height}"))
        })
    }

    fn release(&mut self) {
        if self.camera.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }

    fn is_open(&self) -> bool {
        self.camera.is_some()
    }
}
