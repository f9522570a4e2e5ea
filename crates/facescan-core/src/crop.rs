//! Face cropping — cut a detected box out of a frame and normalize its size.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::GrayImage;

/// Edge length of every stored face crop.
pub const FACE_SIZE: u32 = 200;

/// Crop `face` out of `frame` and resize it to [`FACE_SIZE`]×[`FACE_SIZE`].
///
/// The box is clamped to the frame. Returns `None` when nothing of the box
/// lies inside the frame.
pub fn crop_face(frame: &GrayImage, face: &BoundingBox) -> Option<GrayImage> {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);

    let x0 = face.x.clamp(0.0, fw) as u32;
    let y0 = face.y.clamp(0.0, fh) as u32;
    let x1 = (face.x + face.width).clamp(0.0, fw) as u32;
    let y1 = (face.y + face.height).clamp(0.0, fh) as u32;

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let region = imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(imageops::resize(&region, FACE_SIZE, FACE_SIZE, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([(x % 256) as u8]))
    }

    #[test]
    fn test_crop_resizes_to_face_size() {
        let frame = gradient(320, 240);
        let face = crop_face(&frame, &BoundingBox::new(10.0, 20.0, 50.0, 80.0)).unwrap();
        assert_eq!(face.dimensions(), (FACE_SIZE, FACE_SIZE));
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = GrayImage::from_pixel(100, 100, Luma([77]));
        let face = crop_face(&frame, &BoundingBox::new(-20.0, 80.0, 60.0, 60.0)).unwrap();
        assert_eq!(face.dimensions(), (FACE_SIZE, FACE_SIZE));
        assert!(face.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = gradient(100, 100);
        assert!(crop_face(&frame, &BoundingBox::new(150.0, 10.0, 20.0, 20.0)).is_none());
        assert!(crop_face(&frame, &BoundingBox::new(10.0, 10.0, 0.0, 20.0)).is_none());
    }
}
