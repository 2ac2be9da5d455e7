//! Per-frame effects driven by the host's display refresh.
//!
//! The host calls [`EffectsScheduler::tick`] once per refresh. Each effect
//! samples the frame source on its own, issues at most one inference call per
//! distinct frame timestamp, and never has more than one call in flight.

mod adapter;
mod effect;

pub use adapter::{
    resolved, AdapterOptions, Delegate, FrameModel, InferenceAdapter, InferenceError,
    ModelAdapter, Pending,
};
pub use effect::{Effect, EffectState, ResultSink};

use crate::capture::FrameSource;
use crate::compositing::{BackgroundCompositor, BackgroundDirective};
use crate::frame::Frame;
use crate::gesture::{GestureBoard, GestureResult};
use crate::segmentation::SegmentationMask;
use std::sync::Arc;

/// The virtual background and gesture recognition loops over one frame source.
pub struct EffectsScheduler<B, G>
where
    B: InferenceAdapter<Output = SegmentationMask>,
    G: InferenceAdapter<Output = GestureResult>,
{
    background: Effect<B, BackgroundCompositor>,
    gestures: Effect<G, GestureBoard>,
    ticks: u64,
}

impl<B, G> EffectsScheduler<B, G>
where
    B: InferenceAdapter<Output = SegmentationMask>,
    G: InferenceAdapter<Output = GestureResult>,
{
    pub fn new(segmenter: B, directive: BackgroundDirective, recognizer: G) -> Self {
        Self::with_options(
            segmenter,
            directive,
            AdapterOptions::default(),
            recognizer,
            AdapterOptions::default(),
        )
    }

    pub fn with_options(
        segmenter: B,
        directive: BackgroundDirective,
        background_options: AdapterOptions,
        recognizer: G,
        gesture_options: AdapterOptions,
    ) -> Self {
        Self {
            background: Effect::new(
                "virtual-background",
                segmenter,
                BackgroundCompositor::new(directive),
                background_options,
            ),
            gestures: Effect::new(
                "gestures",
                recognizer,
                GestureBoard::new(),
                gesture_options,
            ),
            ticks: 0,
        }
    }

    /// Run one display refresh for every effect.
    pub fn tick<S: FrameSource + ?Sized>(&mut self, source: &S) {
        self.ticks += 1;
        self.background.tick(source);
        self.gestures.tick(source);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_background_enabled(&mut self, enabled: bool) {
        self.background.set_enabled(enabled);
    }

    pub fn set_gestures_enabled(&mut self, enabled: bool) {
        self.gestures.set_enabled(enabled);
    }

    pub fn set_background(&mut self, directive: BackgroundDirective) {
        self.background.sink_mut().set_directive(directive);
    }

    pub fn background(&self) -> &Effect<B, BackgroundCompositor> {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut Effect<B, BackgroundCompositor> {
        &mut self.background
    }

    pub fn gestures(&self) -> &Effect<G, GestureBoard> {
        &self.gestures
    }

    pub fn gestures_mut(&mut self) -> &mut Effect<G, GestureBoard> {
        &mut self.gestures
    }

    /// Frame to display in place of the raw video, while the virtual
    /// background effect is active and has produced one.
    pub fn composited_frame(&self) -> Option<Arc<Frame>> {
        if !self.background.is_active() {
            return None;
        }
        self.background.sink().output()
    }

    /// Latest recognized gestures, while the gesture effect is active.
    pub fn latest_gestures(&self) -> Option<&GestureResult> {
        if !self.gestures.is_active() {
            return None;
        }
        self.gestures.sink().latest()
    }

    /// Stop every loop and drop in-flight calls.
    pub fn shutdown(&mut self) {
        self.background.set_enabled(false);
        self.gestures.set_enabled(false);
    }
}
