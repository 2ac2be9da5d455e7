use image::buffer::ConvertBuffer;
use image::{RgbImage, RgbaImage};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("pixel buffer holds {actual} bytes but {width}x{height} RGBA needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A decoded video frame: RGBA8, row-major, unpremultiplied alpha.
///
/// Frames are immutable once built. Sources hand them out behind an `Arc`
/// so the scheduler, the adapters and the compositor can share one decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    image: RgbaImage,
    timestamp: Duration,
}

impl Frame {
    /// Build a frame from a raw RGBA buffer.
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        timestamp: Duration,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        let actual = pixels.len();
        let image = RgbaImage::from_raw(width, height, pixels).filter(|_| actual == expected);
        match image {
            Some(image) => Ok(Self { image, timestamp }),
            None => Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual,
            }),
        }
    }

    /// Build a frame from packed RGB triplets, alpha set to opaque.
    pub fn from_rgb_bytes(
        width: u32,
        height: u32,
        rgb: &[u8],
        timestamp: Duration,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual: rgb.len(),
            });
        }
        let pixels = rgb
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect();
        Self::new(width, height, pixels, timestamp)
    }

    pub fn from_rgba(image: RgbaImage, timestamp: Duration) -> Self {
        Self { image, timestamp }
    }

    pub fn from_rgb(image: &RgbImage, timestamp: Duration) -> Self {
        Self {
            image: image.convert(),
            timestamp,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of pixels, i.e. the length a segmentation mask must have.
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// True for zero-width or zero-height frames, which carry nothing to infer on.
    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn to_rgb(&self) -> RgbImage {
        self.image.convert()
    }
}
