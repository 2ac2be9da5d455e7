mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use crate::frame::Frame;
use anyhow::Result;
use std::sync::Arc;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

/// Read side of a live video stream, sampled once per display refresh.
///
/// The frame timestamp doubles as the "new frame available" signal: it only
/// advances when the underlying stream decodes a new frame.
pub trait FrameSource {
    /// Latest decoded frame, if the stream has produced one yet.
    fn current_frame(&self) -> Option<Arc<Frame>>;

    /// Paused streams keep their last frame but must not be sampled.
    fn is_paused(&self) -> bool {
        false
    }
}

/// Holds the most recent frame pushed by a capture loop.
#[derive(Debug, Default)]
pub struct LatestFrame {
    frame: Option<Arc<Frame>>,
    paused: bool,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and return a shared handle to it.
    pub fn push(&mut self, frame: Frame) -> Arc<Frame> {
        let frame = Arc::new(frame);
        self.frame = Some(Arc::clone(&frame));
        frame
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn clear(&mut self) {
        self.frame = None;
    }
}

impl FrameSource for LatestFrame {
    fn current_frame(&self) -> Option<Arc<Frame>> {
        self.frame.clone()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}
