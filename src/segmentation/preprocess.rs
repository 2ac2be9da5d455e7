use crate::frame::Frame;
use anyhow::{ensure, Result};
use image::{imageops, RgbaImage};
use ndarray::Array4;
use std::borrow::Cow;

/// Preprocessor for converting frames to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Preprocess a frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Drop alpha, convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, frame: &Frame) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        ensure!(!frame.is_empty(), "cannot preprocess an empty frame");

        let resized: Cow<'_, RgbaImage> =
            if frame.dimensions() != (self.target_width, self.target_height) {
                Cow::Owned(imageops::resize(
                    frame.image(),
                    self.target_width,
                    self.target_height,
                    imageops::FilterType::Lanczos3,
                ))
            } else {
                Cow::Borrowed(frame.image())
            };

        let shape = (
            1,
            3,
            self.target_height as usize,
            self.target_width as usize,
        );
        let tensor = Array4::from_shape_fn(shape, |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        Ok(tensor)
    }

    /// Postprocess model output matte back to original frame dimensions
    ///
    /// # Arguments
    /// * `matte` - Flattened matte at model resolution
    /// * `matte_width` - Width of the matte
    /// * `matte_height` - Height of the matte
    /// * `target_width` - Desired output width
    /// * `target_height` - Desired output height
    ///
    /// Returns: Resized matte flattened in row-major order
    pub fn postprocess_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("postprocess").entered();

        ensure!(
            matte.len() == matte_width as usize * matte_height as usize,
            "matte has {} values, expected {}x{}",
            matte.len(),
            matte_width,
            matte_height
        );

        // If dimensions match, no resize needed
        if matte_width == target_width && matte_height == target_height {
            return Ok(matte.to_vec());
        }

        // Convert to grayscale image for resizing
        let gray_image = image::GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let idx = (y * matte_width + x) as usize;
            let value = (matte[idx] * 255.0).clamp(0.0, 255.0) as u8;
            image::Luma([value])
        });

        // Resize
        let resized = imageops::resize(
            &gray_image,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        );

        // Convert back to f32 values
        let output: Vec<f32> = resized
            .pixels()
            .map(|p| p[0] as f32 / 255.0)
            .collect();

        Ok(output)
    }

    /// Threshold an alpha matte into category labels: `person` where alpha
    /// reaches `threshold`, `backdrop` elsewhere.
    pub fn matte_to_labels(matte: &[f32], threshold: f32, person: u8, backdrop: u8) -> Vec<u8> {
        matte
            .iter()
            .map(|&alpha| if alpha >= threshold { person } else { backdrop })
            .collect()
    }
}
