use super::{composite, scale_background, BackgroundDirective};
use crate::effects::ResultSink;
use crate::frame::Frame;
use crate::segmentation::SegmentationMask;
use std::sync::Arc;
use std::time::Duration;

/// Sink of the virtual background effect: owns the directive and the latest
/// composited frame.
///
/// Image backgrounds are rescaled once per distinct frame size, outside of
/// the per-pixel loop.
#[derive(Debug, Default)]
pub struct BackgroundCompositor {
    directive: BackgroundDirective,
    scaled: Option<Arc<Frame>>,
    output: Option<Arc<Frame>>,
    last_applied: Option<Duration>,
}

impl BackgroundCompositor {
    pub fn new(directive: BackgroundDirective) -> Self {
        Self {
            directive,
            ..Self::default()
        }
    }

    pub fn directive(&self) -> &BackgroundDirective {
        &self.directive
    }

    /// Swap the directive. Takes effect with the next published mask.
    pub fn set_directive(&mut self, directive: BackgroundDirective) {
        self.directive = directive;
        self.scaled = None;
    }

    /// Latest composited frame.
    pub fn output(&self) -> Option<Arc<Frame>> {
        self.output.clone()
    }

    /// Directive ready for a frame of the given size.
    fn directive_for(&mut self, width: u32, height: u32) -> BackgroundDirective {
        let BackgroundDirective::Image(image) = &self.directive else {
            return self.directive.clone();
        };
        if image.dimensions() == (width, height) {
            return self.directive.clone();
        }
        match &self.scaled {
            Some(scaled) if scaled.dimensions() == (width, height) => {
                BackgroundDirective::Image(Arc::clone(scaled))
            }
            _ => {
                tracing::debug!(width, height, "rescaling background image");
                let scaled = Arc::new(scale_background(image, width, height));
                self.scaled = Some(Arc::clone(&scaled));
                BackgroundDirective::Image(scaled)
            }
        }
    }
}

impl ResultSink<SegmentationMask> for BackgroundCompositor {
    fn publish(&mut self, frame: &Frame, mask: SegmentationMask) {
        let timestamp = frame.timestamp();
        if self.last_applied.is_some_and(|last| timestamp < last) {
            tracing::debug!(?timestamp, "ignoring stale segmentation result");
            return;
        }

        let (width, height) = frame.dimensions();
        let directive = self.directive_for(width, height);
        match composite(frame, &mask, &directive) {
            Ok(output) => {
                self.output = Some(Arc::new(output));
                self.last_applied = Some(timestamp);
            }
            Err(err) => {
                tracing::error!(error = %err, ?timestamp, "compositing rejected segmentation result");
            }
        }
    }

    fn reset(&mut self) {
        self.output = None;
        self.last_applied = None;
    }
}
