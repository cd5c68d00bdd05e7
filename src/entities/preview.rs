//! Decoded preview image (RGBA8) with its presentation timestamp.

use image::RgbaImage;

use super::error::MediaError;

/// One decoded still frame, stored as tightly packed RGBA8.
#[derive(Clone, PartialEq)]
pub struct PreviewImage {
    image: RgbaImage,
    /// Timestamp of the frame actually decoded (seconds). May differ from the
    /// requested time by up to the extraction tolerance.
    pts: f64,
}

impl PreviewImage {
    pub fn new(image: RgbaImage, pts: f64) -> Self {
        Self { image, pts }
    }

    /// Build from raw RGBA bytes. Fails if the buffer length doesn't match.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, pts: f64) -> Result<Self, MediaError> {
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            MediaError::Decode(format!("RGBA buffer does not match {}x{}", width, height))
        })?;
        Ok(Self { image, pts })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pts(&self) -> f64 {
        self.pts
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Memory footprint of the pixel data in bytes
    pub fn mem(&self) -> usize {
        self.image.as_raw().len()
    }
}

impl std::fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("pts", &self.pts)
            .finish()
    }
}
