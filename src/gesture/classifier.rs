use super::{GestureResult, HandGesture};
use crate::effects::{AdapterOptions, FrameModel};
use crate::frame::Frame;
use crate::segmentation::Preprocessor;
use anyhow::{ensure, Context, Result};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::time::Duration;

/// Label reported when no category clears the score floor.
pub const NO_GESTURE: &str = "None";

/// ONNX hand-gesture classifier.
///
/// Expects a `[1, 3, 224, 224]` input and a `[1, N]` logits output, one logit
/// per entry of `labels`. The whole frame is treated as one hand crop, so at
/// most one [`HandGesture`] is reported per frame.
pub struct GestureClassifier {
    session: Session,
    preprocessor: Preprocessor,
    labels: Vec<String>,
    min_score: f32,
    max_hands: usize,
}

impl GestureClassifier {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        labels: Vec<String>,
        options: &AdapterOptions,
    ) -> Result<Self> {
        let path = model_path.as_ref();
        ensure!(!labels.is_empty(), "gesture classifier needs at least one label");

        tracing::info!(
            "Loading gesture classifier from {} ({} labels)",
            path.display(),
            labels.len()
        );
        let session = crate::segmentation::open_session(path, options)?;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(224, 224),
            labels,
            min_score: 0.5,
            max_hands: options.max_results,
        })
    }

    /// Scores below this are reported as no hand.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn logits(&mut self, frame: &Frame) -> Result<Vec<f32>> {
        let input = self.preprocessor.preprocess(frame)?;
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])
            .context("Failed to run gesture inference")?;
        let logits = outputs[0].try_extract_array::<f32>()?;
        Ok(logits.iter().copied().collect())
    }
}

/// Top-1 category of `logits` after softmax.
fn top_category(logits: &[f32]) -> Option<(usize, f32)> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(index, &e)| (index, e / sum))
}

impl FrameModel for GestureClassifier {
    type Output = GestureResult;

    fn process(&mut self, frame: &Frame, timestamp: Duration) -> Result<GestureResult> {
        let _span = tracing::debug_span!("gesture_classify").entered();

        let logits = self.logits(frame)?;
        ensure!(
            logits.len() == self.labels.len(),
            "model produced {} logits for {} labels",
            logits.len(),
            self.labels.len()
        );

        let mut hands = Vec::new();
        if let Some((index, score)) = top_category(&logits) {
            let category = &self.labels[index];
            if score >= self.min_score && category != NO_GESTURE {
                hands.push(HandGesture {
                    category: category.clone(),
                    score,
                });
            }
        }
        hands.truncate(self.max_hands);

        Ok(GestureResult::new(timestamp, hands))
    }
}
