use super::preprocess::Preprocessor;
use super::types::SegmentationMask;
use crate::effects::{AdapterOptions, FrameModel};
use crate::frame::Frame;
use anyhow::{ensure, Context, Result};
use ndarray::{Array1, Array4, Ix4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::time::Duration;

/// Recurrent hidden states carried between frames.
struct HiddenState {
    r1: Array4<f32>,
    r2: Array4<f32>,
    r3: Array4<f32>,
    r4: Array4<f32>,
}

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
///
/// The alpha matte is thresholded into a two-category mask laid out like the
/// selfie-multiclass models: [`Self::BACKDROP_LABEL`] for the scene and
/// [`Self::PERSON_LABEL`] for the subject.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Updated after each inference and fed back in the next frame
    hidden: Option<HiddenState>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,

    threshold: f32,
}

impl RobustVideoMatting {
    pub const BACKDROP_LABEL: u8 = 0;
    pub const PERSON_LABEL: u8 = 1;

    /// Label this adapter declares as the mask foreground, i.e. the region
    /// the compositor paints over.
    pub const FOREGROUND_LABEL: u8 = Self::BACKDROP_LABEL;

    /// Create a new RVM model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `options` - Adapter setup options (delegate selection)
    ///
    /// # Default Configuration
    /// - Input size: 512x512 (can be adjusted for performance/quality tradeoff)
    /// - Downsample ratio: 0.25 (hidden states are 1/4 of input resolution)
    /// - Matte threshold: 0.5
    pub fn new<P: AsRef<Path>>(model_path: P, options: &AdapterOptions) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = super::open_session(path, options)?;

        tracing::info!("RVM model loaded successfully");

        // Default to 512x512 input (good balance of quality and performance)
        let width = 512;
        let height = 512;

        let preprocessor = Preprocessor::new(width, height);

        Ok(Self {
            session,
            preprocessor,
            width,
            height,
            hidden: None,
            downsample_ratio: 0.25,
            threshold: 0.5,
        })
    }

    /// Alpha at or above which a pixel counts as the person.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Hidden states for the first frame of a sequence, all zeros
    fn initial_state(&self) -> HiddenState {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        HiddenState {
            r1: Array4::zeros((1, 16, h, w)),
            r2: Array4::zeros((1, 20, h / 2, w / 2)),
            r3: Array4::zeros((1, 24, h / 4, w / 4)),
            r4: Array4::zeros((1, 28, h / 8, w / 8)),
        }
    }

    /// Run the network and return the alpha matte at model resolution.
    fn infer_matte(&mut self, frame: &Frame) -> Result<(Vec<f32>, u32, u32)> {
        let state = match self.hidden.take() {
            Some(state) => state,
            None => self.initial_state(),
        };

        // Preprocess frame to NCHW tensor
        let input_tensor = self.preprocessor.preprocess(frame)?;
        let ratio = Array1::from_elem(1, self.downsample_ratio);

        // RVM expects: src (frame), r1, r2, r3, r4, downsample_ratio
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(input_tensor.view())?,
                TensorRef::from_array_view(state.r1.view())?,
                TensorRef::from_array_view(state.r2.view())?,
                TensorRef::from_array_view(state.r3.view())?,
                TensorRef::from_array_view(state.r4.view())?,
                TensorRef::from_array_view(ratio.view())?
            ])
            .context("Failed to run inference")?;

        // Outputs: fgr (foreground), pha (alpha), r1, r2, r3, r4
        // We only need pha (the matte) and the updated hidden states
        let pha = outputs[1].try_extract_array::<f32>()?;
        let shape = pha.shape().to_vec();
        ensure!(shape.len() == 4, "unexpected matte shape {:?}", shape);
        let matte: Vec<f32> = pha.iter().copied().collect();

        let next = HiddenState {
            r1: outputs[2].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?,
            r2: outputs[3].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?,
            r3: outputs[4].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?,
            r4: outputs[5].try_extract_array::<f32>()?.to_owned().into_dimensionality::<Ix4>()?,
        };
        drop(outputs);
        self.hidden = Some(next);

        // Matte shape: [1, 1, H, W]
        Ok((matte, shape[3] as u32, shape[2] as u32))
    }

    pub fn segment(&mut self, frame: &Frame) -> Result<SegmentationMask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let (matte, matte_width, matte_height) = self.infer_matte(frame)?;

        // Postprocess: resize back to original frame dimensions
        let (frame_width, frame_height) = frame.dimensions();
        let final_matte = Preprocessor::postprocess_matte(
            &matte,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )?;

        let labels = Preprocessor::matte_to_labels(
            &final_matte,
            self.threshold,
            Self::PERSON_LABEL,
            Self::BACKDROP_LABEL,
        );

        Ok(SegmentationMask::new(labels, Self::FOREGROUND_LABEL))
    }
}

impl FrameModel for RobustVideoMatting {
    type Output = SegmentationMask;

    fn process(&mut self, frame: &Frame, _timestamp: Duration) -> Result<SegmentationMask> {
        self.segment(frame)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.hidden = None;
    }
}
