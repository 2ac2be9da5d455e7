use anyhow::{bail, Context, Result};
use clap::Parser;
use meetfx::capture::{CaptureSource, LatestFrame, WebcamCapture};
use meetfx::compositing::{BackgroundDirective, DEFAULT_BLUR_RADIUS};
use meetfx::effects::{AdapterOptions, Delegate, EffectsScheduler, InferenceAdapter};
use meetfx::frame::Frame;
use meetfx::gesture::{self, GestureResult};
use meetfx::output::{OutputSink, V4L2Output};
use meetfx::segmentation::{self, SegmentationMask};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without a virtual background
    #[arg(long)]
    model: Option<PathBuf>,

    /// Path to gesture classifier model (ONNX file)
    #[arg(long)]
    gesture_model: Option<PathBuf>,

    /// Gesture labels in logit order
    #[arg(long, value_delimiter = ',')]
    gesture_labels: Vec<String>,

    /// Virtual background: color:R,G,B | blur:RADIUS | image:PATH
    #[arg(long, default_value = "blur:8")]
    background: BackgroundArg,

    /// Run models on the GPU
    #[arg(long)]
    gpu: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum BackgroundArg {
    Color(u8, u8, u8),
    Blur(f32),
    Image(PathBuf),
}

impl FromStr for BackgroundArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s.split_once(':').unwrap_or((s, ""));
        match kind {
            "color" => {
                let channels = value
                    .split(',')
                    .map(|c| c.trim().parse::<u8>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("invalid color channel: {e}"))?;
                match channels[..] {
                    [r, g, b] => Ok(Self::Color(r, g, b)),
                    _ => Err(format!("expected color:R,G,B, got {s:?}")),
                }
            }
            "blur" if value.is_empty() => Ok(Self::Blur(DEFAULT_BLUR_RADIUS)),
            "blur" => value
                .parse::<f32>()
                .map(Self::Blur)
                .map_err(|e| format!("invalid blur radius: {e}")),
            "image" if !value.is_empty() => Ok(Self::Image(PathBuf::from(value))),
            _ => Err(format!("unknown background {s:?}")),
        }
    }
}

impl BackgroundArg {
    fn into_directive(self) -> Result<BackgroundDirective> {
        Ok(match self {
            BackgroundArg::Color(r, g, b) => BackgroundDirective::color(r, g, b),
            BackgroundArg::Blur(radius) => {
                if !radius.is_finite() || radius < 0.0 {
                    bail!("blur radius must be a non-negative number, got {radius}");
                }
                BackgroundDirective::blur(radius)
            }
            BackgroundArg::Image(path) => {
                let image = image::open(&path)
                    .with_context(|| format!("Failed to load background {}", path.display()))?
                    .to_rgba8();
                BackgroundDirective::image(Frame::from_rgba(image, Duration::ZERO))
            }
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("meetfx starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let mut capture = WebcamCapture::new(
        args.input_device,
        args.capture_width,
        args.capture_height,
    )
    .context("Failed to initialize webcam capture")?;

    let mut output = V4L2Output::new(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let directive = args.background.clone().into_directive()?;
    let options = AdapterOptions {
        delegate: if args.gpu { Delegate::Gpu } else { Delegate::Cpu },
        ..AdapterOptions::default()
    };

    let labels = if args.gesture_labels.is_empty() {
        gesture::DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()
    } else {
        args.gesture_labels.clone()
    };

    // Adapters load lazily, so a missing model path only matters once its effect is enabled.
    let segmenter = segmentation::create_default_adapter(args.model.clone().unwrap_or_default());
    let recognizer =
        gesture::create_classifier_adapter(args.gesture_model.clone().unwrap_or_default(), labels);
    let mut scheduler =
        EffectsScheduler::with_options(segmenter, directive, options.clone(), recognizer, options);

    match &args.model {
        Some(path) => {
            tracing::info!("Virtual background enabled, model {}", path.display());
            scheduler.set_background_enabled(true);
        }
        None => tracing::info!("Running in passthrough mode (no segmentation)"),
    }
    if let Some(path) = &args.gesture_model {
        tracing::info!("Gesture recognition enabled, model {}", path.display());
        scheduler.set_gestures_enabled(true);
    }

    let result = run_pipeline(&mut capture, &mut output, &mut scheduler, args.fps);
    scheduler.shutdown();
    if let Err(err) = capture.stop() {
        tracing::warn!("{:#}", err);
    }
    result
}

fn run_pipeline<C, O, B, G>(
    capture: &mut C,
    output: &mut O,
    scheduler: &mut EffectsScheduler<B, G>,
    target_fps: u32,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
    B: InferenceAdapter<Output = SegmentationMask>,
    G: InferenceAdapter<Output = GestureResult>,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut source = LatestFrame::new();
    let mut frame_count = 0u64;
    let mut composited_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_effects_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;
    let mut last_gesture: Option<String> = None;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        let raw = source.push(frame);
        total_capture_time += capture_start.elapsed();

        let effects_start = Instant::now();
        scheduler.tick(&source);
        total_effects_time += effects_start.elapsed();

        let output_frame: Arc<Frame> = match scheduler.composited_frame() {
            Some(composited) => {
                composited_count += 1;
                composited
            }
            None => raw,
        };

        let output_start = Instant::now();
        output
            .write_frame(&output_frame)
            .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        let gesture = scheduler
            .latest_gestures()
            .and_then(GestureResult::top)
            .map(|hand| hand.category.clone());
        if gesture != last_gesture {
            if let Some(category) = &gesture {
                tracing::info!("Gesture: {}", category);
            }
            last_gesture = gesture;
        }

        frame_count += 1;

        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_effects_ms = total_effects_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_effects_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, effects={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, composited={}",
                frame_count,
                avg_capture_ms,
                avg_effects_ms,
                avg_output_ms,
                total_ms,
                actual_fps,
                composited_count
            );
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_background_arguments() {
        assert_eq!("color:0,177,64".parse(), Ok(BackgroundArg::Color(0, 177, 64)));
        assert_eq!("blur:3.5".parse(), Ok(BackgroundArg::Blur(3.5)));
        assert_eq!("blur".parse(), Ok(BackgroundArg::Blur(DEFAULT_BLUR_RADIUS)));
        assert_eq!(
            "image:/tmp/beach.png".parse(),
            Ok(BackgroundArg::Image(PathBuf::from("/tmp/beach.png")))
        );
    }

    #[test]
    fn rejects_malformed_background_arguments() {
        assert!("color:1,2".parse::<BackgroundArg>().is_err());
        assert!("color:1,2,300".parse::<BackgroundArg>().is_err());
        assert!("image:".parse::<BackgroundArg>().is_err());
        assert!("sepia".parse::<BackgroundArg>().is_err());
    }

    #[test]
    fn negative_blur_is_rejected_before_running() {
        assert!(BackgroundArg::Blur(-1.0).into_directive().is_err());
        assert_eq!(
            BackgroundArg::Blur(2.0).into_directive().unwrap(),
            BackgroundDirective::blur(2.0)
        );
    }
}
