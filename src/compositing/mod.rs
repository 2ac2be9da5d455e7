//! Background replacement.
//!
//! [`composite`] is a pure function of a frame, a segmentation mask and a
//! [`BackgroundDirective`]. [`BackgroundCompositor`] wraps it as the sink of
//! the virtual background effect.

mod compositor;

pub use compositor::BackgroundCompositor;

use crate::frame::{Frame, FrameError};
use crate::segmentation::SegmentationMask;
use image::{imageops, Rgb};
use std::sync::Arc;
use thiserror::Error;

/// Blur radius used when none is given, in pixels.
pub const DEFAULT_BLUR_RADIUS: f32 = 8.0;

#[derive(Debug, Error, PartialEq)]
pub enum CompositeError {
    #[error("mask has {actual} labels but the frame has {expected} pixels")]
    MaskSize { expected: usize, actual: usize },

    #[error("background image is {actual:?} but the frame is {expected:?}")]
    BackgroundSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("blur radius must be finite and non-negative, got {0}")]
    BlurRadius(f32),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// What to paint where the mask carries the foreground label.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundDirective {
    SolidColor(Rgb<u8>),
    /// Gaussian blur of the whole composited output, `radius` is the sigma in pixels.
    Blur { radius: f32 },
    /// Replacement image. [`composite`] requires it at frame size.
    Image(Arc<Frame>),
}

impl Default for BackgroundDirective {
    fn default() -> Self {
        Self::SolidColor(Rgb([200, 200, 200]))
    }
}

impl BackgroundDirective {
    pub fn color(r: u8, g: u8, b: u8) -> Self {
        Self::SolidColor(Rgb([r, g, b]))
    }

    pub fn blur(radius: f32) -> Self {
        Self::Blur { radius }
    }

    pub fn image(frame: Frame) -> Self {
        Self::Image(Arc::new(frame))
    }
}

/// Composite `frame` against `directive`, guided by `mask`.
///
/// Pixels whose label is not the mask's foreground label are copied from the
/// frame. Pixels carrying it are filled from the directive. Every output
/// pixel is opaque. Identical inputs always produce identical bytes.
pub fn composite(
    frame: &Frame,
    mask: &SegmentationMask,
    directive: &BackgroundDirective,
) -> Result<Frame, CompositeError> {
    let _span = tracing::debug_span!("composite").entered();

    let (width, height) = frame.dimensions();
    if mask.len() != frame.pixel_count() {
        return Err(CompositeError::MaskSize {
            expected: frame.pixel_count(),
            actual: mask.len(),
        });
    }
    match directive {
        BackgroundDirective::Image(image) if image.dimensions() != (width, height) => {
            return Err(CompositeError::BackgroundSize {
                expected: (width, height),
                actual: image.dimensions(),
            });
        }
        BackgroundDirective::Blur { radius } if !radius.is_finite() || *radius < 0.0 => {
            return Err(CompositeError::BlurRadius(*radius));
        }
        _ => {}
    }

    let foreground = mask.foreground_label();
    let src = frame.as_raw();
    let mut out = vec![0u8; src.len()];

    for (i, (dst, &label)) in out.chunks_exact_mut(4).zip(mask.labels()).enumerate() {
        let p = i * 4;
        let rgb = if label != foreground {
            [src[p], src[p + 1], src[p + 2]]
        } else {
            match directive {
                BackgroundDirective::SolidColor(color) => color.0,
                // Same dimensions, so (x, y) lands on the same offset.
                BackgroundDirective::Image(image) => {
                    let bg = image.as_raw();
                    [bg[p], bg[p + 1], bg[p + 2]]
                }
                BackgroundDirective::Blur { .. } => [src[p], src[p + 1], src[p + 2]],
            }
        };
        dst[..3].copy_from_slice(&rgb);
        dst[3] = 255;
    }

    let composited = Frame::new(width, height, out, frame.timestamp())?;
    match directive {
        BackgroundDirective::Blur { radius } if *radius > 0.0 && !composited.is_empty() => {
            let _span = tracing::debug_span!("blur", radius).entered();
            let mut blurred = imageops::blur(composited.image(), *radius);
            for pixel in blurred.pixels_mut() {
                pixel[3] = 255;
            }
            Ok(Frame::from_rgba(blurred, frame.timestamp()))
        }
        _ => Ok(composited),
    }
}

/// Resize a replacement image to the frame size so it can be used with [`composite`].
pub fn scale_background(image: &Frame, width: u32, height: u32) -> Frame {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    let _span = tracing::debug_span!("scale_background", width, height).entered();
    let resized = imageops::resize(
        image.image(),
        width,
        height,
        imageops::FilterType::Lanczos3,
    );
    Frame::from_rgba(resized, image.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quad() -> Frame {
        Frame::from_rgb_bytes(
            2,
            2,
            &[255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 0],
            Duration::from_millis(40),
        )
        .unwrap()
    }

    #[test]
    fn solid_color_fills_foreground_labels() {
        let mask = SegmentationMask::new(vec![1, 0, 1, 0], 1);
        let out = composite(&quad(), &mask, &BackgroundDirective::color(0, 0, 0)).unwrap();
        assert_eq!(
            out.as_raw(),
            &[0, 0, 0, 255, 0, 255, 0, 255, 0, 0, 0, 255, 255, 255, 0, 255]
        );
        assert_eq!(out.timestamp(), Duration::from_millis(40));
    }

    #[test]
    fn label_zero_convention_selects_the_other_pixels() {
        let mask = SegmentationMask::new(vec![1, 0, 1, 0], 0);
        let out = composite(&quad(), &mask, &BackgroundDirective::color(9, 9, 9)).unwrap();
        assert_eq!(
            out.as_raw(),
            &[255, 0, 0, 255, 9, 9, 9, 255, 0, 0, 255, 255, 9, 9, 9, 255]
        );
    }

    #[test]
    fn passthrough_forces_alpha_opaque() {
        let frame = Frame::new(1, 1, vec![10, 20, 30, 0], Duration::ZERO).unwrap();
        let mask = SegmentationMask::new(vec![0], 1);
        let out = composite(&frame, &mask, &BackgroundDirective::default()).unwrap();
        assert_eq!(out.as_raw(), &[10, 20, 30, 255]);
    }

    #[test]
    fn rejects_mask_of_wrong_length() {
        let short = SegmentationMask::new(vec![1, 0, 1], 1);
        let long = SegmentationMask::new(vec![1; 5], 1);
        let directive = BackgroundDirective::default();
        assert_eq!(
            composite(&quad(), &short, &directive),
            Err(CompositeError::MaskSize {
                expected: 4,
                actual: 3
            })
        );
        assert!(matches!(
            composite(&quad(), &long, &directive),
            Err(CompositeError::MaskSize { actual: 5, .. })
        ));
    }

    #[test]
    fn image_directive_samples_same_coordinate() {
        let bg = Frame::from_rgb_bytes(
            2,
            2,
            &[1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4],
            Duration::ZERO,
        )
        .unwrap();
        let mask = SegmentationMask::new(vec![0, 0, 1, 1], 0);
        let out = composite(&quad(), &mask, &BackgroundDirective::image(bg)).unwrap();
        assert_eq!(
            out.as_raw(),
            &[1, 1, 1, 255, 2, 2, 2, 255, 0, 0, 255, 255, 255, 255, 0, 255]
        );
    }

    #[test]
    fn image_directive_must_be_prescaled() {
        let bg = Frame::from_rgb_bytes(1, 1, &[1, 2, 3], Duration::ZERO).unwrap();
        let mask = SegmentationMask::new(vec![0; 4], 0);
        assert_eq!(
            composite(&quad(), &mask, &BackgroundDirective::image(bg.clone())),
            Err(CompositeError::BackgroundSize {
                expected: (2, 2),
                actual: (1, 1)
            })
        );

        let scaled = scale_background(&bg, 2, 2);
        assert_eq!(scaled.dimensions(), (2, 2));
        assert!(composite(&quad(), &mask, &BackgroundDirective::image(scaled)).is_ok());
    }

    #[test]
    fn blur_keeps_pixels_instead_of_flat_fill() {
        let frame = Frame::from_rgb_bytes(2, 1, &[100, 100, 100, 100, 100, 100], Duration::ZERO)
            .unwrap();
        let mask = SegmentationMask::new(vec![1, 1], 1);
        let out = composite(&frame, &mask, &BackgroundDirective::blur(3.0)).unwrap();
        for px in out.as_raw().chunks_exact(4) {
            assert!(px[..3].iter().all(|&c| c.abs_diff(100) <= 1));
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn blur_spreads_an_edge_across_the_frame() {
        let mut rgb = vec![0u8; 8 * 3];
        rgb[..12].fill(255);
        let frame = Frame::from_rgb_bytes(8, 1, &rgb, Duration::ZERO).unwrap();
        let mask = SegmentationMask::new(vec![0; 8], 1);

        let sharp = composite(&frame, &mask, &BackgroundDirective::blur(0.0)).unwrap();
        assert_eq!(sharp.as_raw()[4 * 4], 0);

        let soft = composite(&frame, &mask, &BackgroundDirective::blur(2.0)).unwrap();
        assert!(soft.as_raw()[4 * 4] > 0);
        assert!(soft.as_raw()[3 * 4] < 255);
        assert!(soft.as_raw().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn rejects_negative_blur_radius() {
        let mask = SegmentationMask::new(vec![0; 4], 1);
        assert_eq!(
            composite(&quad(), &mask, &BackgroundDirective::blur(-1.0)),
            Err(CompositeError::BlurRadius(-1.0))
        );
    }

    #[test]
    fn composite_is_deterministic_and_leaves_inputs_alone() {
        let frame = quad();
        let before = frame.clone();
        let mask = SegmentationMask::new(vec![1, 0, 0, 1], 1);
        for directive in [
            BackgroundDirective::color(1, 2, 3),
            BackgroundDirective::blur(1.5),
        ] {
            let a = composite(&frame, &mask, &directive).unwrap();
            let b = composite(&frame, &mask, &directive).unwrap();
            assert_eq!(a, b);
        }
        assert_eq!(frame, before);
    }
}
