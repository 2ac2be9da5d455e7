mod classifier;

pub use classifier::{GestureClassifier, NO_GESTURE};

use crate::effects::{AdapterOptions, ModelAdapter, ResultSink};
use crate::frame::Frame;
use std::path::PathBuf;
use std::time::Duration;

/// Labels of the canned MediaPipe gesture set, in logit order.
pub const DEFAULT_LABELS: [&str; 8] = [
    NO_GESTURE,
    "Closed_Fist",
    "Open_Palm",
    "Pointing_Up",
    "Thumb_Down",
    "Thumb_Up",
    "Victory",
    "ILoveYou",
];

/// Create a gesture adapter backed by an ONNX classifier, loaded when the
/// gesture effect is first enabled.
pub fn create_classifier_adapter(
    model_path: impl Into<PathBuf>,
    labels: Vec<String>,
) -> ModelAdapter<GestureClassifier> {
    let model_path = model_path.into();
    ModelAdapter::new("gestures", move |options: &AdapterOptions| {
        GestureClassifier::new(&model_path, labels.clone(), options)
    })
}

/// Top-1 category recognized for one hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandGesture {
    pub category: String,
    pub score: f32,
}

/// Gestures recognized in one video frame, one entry per detected hand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GestureResult {
    pub timestamp: Duration,
    pub hands: Vec<HandGesture>,
}

impl GestureResult {
    pub fn new(timestamp: Duration, hands: Vec<HandGesture>) -> Self {
        Self { timestamp, hands }
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    /// Most confident hand.
    pub fn top(&self) -> Option<&HandGesture> {
        self.hands
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

/// Latest gesture result, never moving backwards in time.
#[derive(Debug, Default)]
pub struct GestureBoard {
    latest: Option<GestureResult>,
    discarded: u64,
}

impl GestureBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&GestureResult> {
        self.latest.as_ref()
    }

    /// Results dropped for being older than the one on display.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Store `result` unless it is older than the current one.
    pub fn accept(&mut self, result: GestureResult) -> bool {
        if let Some(current) = &self.latest {
            if result.timestamp < current.timestamp {
                tracing::debug!(
                    stale = ?result.timestamp,
                    current = ?current.timestamp,
                    "discarding stale gesture result"
                );
                self.discarded += 1;
                return false;
            }
        }
        self.latest = Some(result);
        true
    }
}

impl ResultSink<GestureResult> for GestureBoard {
    fn publish(&mut self, _frame: &Frame, result: GestureResult) {
        self.accept(result);
    }

    fn reset(&mut self) {
        self.latest = None;
    }
}
