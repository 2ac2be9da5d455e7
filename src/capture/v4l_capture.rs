use super::CaptureSource;
use crate::frame::Frame;
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::time::Instant;

pub struct WebcamCapture {
    camera: Camera,
    started: Instant,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam streaming at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            started: Instant::now(),
        })
    }

    /// Release the camera so the hardware indicator turns off.
    pub fn stop(&mut self) -> Result<()> {
        self.camera
            .stop_stream()
            .context("Failed to stop camera stream")
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        let buffer = self
            .camera
            .frame()
            .context("Failed to capture frame")?;
        let timestamp = self.started.elapsed();

        let decoded = buffer.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let frame = Frame::from_rgb_bytes(
            decoded.width(),
            decoded.height(),
            decoded.as_raw(),
            timestamp,
        )?;
        Ok(frame)
    }

    fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }
}
