use meetfx::capture::LatestFrame;
use meetfx::compositing::BackgroundDirective;
use meetfx::effects::{
    resolved, AdapterOptions, EffectState, EffectsScheduler, InferenceAdapter, InferenceError,
    Pending,
};
use meetfx::frame::Frame;
use meetfx::gesture::{GestureResult, HandGesture};
use meetfx::segmentation::SegmentationMask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Resolves setup and every call before returning.
struct Immediate<T> {
    ready: bool,
    respond: Box<dyn FnMut(&Frame) -> T>,
}

impl<T> Immediate<T> {
    fn new(respond: impl FnMut(&Frame) -> T + 'static) -> Self {
        Self {
            ready: true,
            respond: Box::new(respond),
        }
    }

    fn broken() -> Self
    where
        T: Default,
    {
        Self {
            ready: false,
            respond: Box::new(|_| T::default()),
        }
    }
}

impl<T> InferenceAdapter for Immediate<T> {
    type Output = T;

    fn initialize(&mut self, _options: &AdapterOptions) -> Pending<()> {
        if self.ready {
            resolved(Ok(()))
        } else {
            resolved(Err(InferenceError::Backend(anyhow::anyhow!("model file missing"))))
        }
    }

    fn infer(&mut self, frame: Arc<Frame>, _timestamp: Duration) -> Pending<T> {
        resolved(Ok((self.respond)(&frame)))
    }
}

/// Leaves setup and every call pending until the test resolves them.
struct Deferred<T> {
    setups: Vec<oneshot::Sender<Result<(), InferenceError>>>,
    calls: Vec<(Duration, oneshot::Sender<Result<T, InferenceError>>)>,
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self {
            setups: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl<T> InferenceAdapter for Deferred<T> {
    type Output = T;

    fn initialize(&mut self, _options: &AdapterOptions) -> Pending<()> {
        let (tx, rx) = oneshot::channel();
        self.setups.push(tx);
        rx
    }

    fn infer(&mut self, _frame: Arc<Frame>, timestamp: Duration) -> Pending<T> {
        let (tx, rx) = oneshot::channel();
        self.calls.push((timestamp, tx));
        rx
    }
}

fn quad(ms: u64) -> Frame {
    Frame::from_rgb_bytes(
        2,
        2,
        &[10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120],
        Duration::from_millis(ms),
    )
    .unwrap()
}

fn backdrop_mask() -> SegmentationMask {
    // Person in the middle two pixels, label 0 marks what gets replaced.
    SegmentationMask::new(vec![0, 1, 1, 0], 0)
}

fn thumbs_up(frame: &Frame) -> GestureResult {
    GestureResult::new(
        frame.timestamp(),
        vec![HandGesture {
            category: "Thumb_Up".to_string(),
            score: 0.9,
        }],
    )
}

#[test]
fn replaces_background_through_the_scheduler() {
    let mut scheduler = EffectsScheduler::new(
        Immediate::new(|_| backdrop_mask()),
        BackgroundDirective::color(0, 255, 0),
        Immediate::new(thumbs_up),
    );
    let mut source = LatestFrame::new();
    source.push(quad(40));

    assert!(scheduler.composited_frame().is_none());
    scheduler.set_background_enabled(true);
    scheduler.tick(&source);

    let out = scheduler.composited_frame().expect("composited frame");
    assert_eq!(
        out.as_raw(),
        &[0, 255, 0, 255, 40, 50, 60, 255, 70, 80, 90, 255, 0, 255, 0, 255]
    );
    assert_eq!(out.timestamp(), Duration::from_millis(40));
    assert!(scheduler.latest_gestures().is_none());
}

#[test]
fn new_directive_applies_to_next_result() {
    let mut scheduler = EffectsScheduler::new(
        Immediate::new(|_| backdrop_mask()),
        BackgroundDirective::color(0, 0, 0),
        Immediate::new(thumbs_up),
    );
    let mut source = LatestFrame::new();
    scheduler.set_background_enabled(true);
    source.push(quad(1));
    scheduler.tick(&source);

    scheduler.set_background(BackgroundDirective::color(9, 9, 9));
    source.push(quad(2));
    scheduler.tick(&source);

    let out = scheduler.composited_frame().unwrap();
    assert_eq!(&out.as_raw()[..4], &[9, 9, 9, 255]);
}

#[test]
fn at_most_one_call_per_new_timestamp() {
    let mut scheduler = EffectsScheduler::new(
        Immediate::new(|_| backdrop_mask()),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    scheduler.set_background_enabled(true);
    scheduler.set_gestures_enabled(true);

    let mut source = LatestFrame::new();
    for ms in [10, 20, 30] {
        source.push(quad(ms));
        for _ in 0..5 {
            scheduler.tick(&source);
        }
    }

    assert_eq!(scheduler.ticks(), 15);
    assert_eq!(scheduler.background().calls_issued(), 3);
    assert_eq!(scheduler.gestures().calls_issued(), 3);
}

#[test]
fn slow_adapter_skips_frames_instead_of_queueing() {
    let mut scheduler = EffectsScheduler::new(
        Deferred::<SegmentationMask>::default(),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    scheduler.set_background_enabled(true);
    scheduler
        .background_mut()
        .adapter_mut()
        .setups
        .pop()
        .unwrap()
        .send(Ok(()))
        .unwrap();

    let mut source = LatestFrame::new();
    for ms in [10, 20, 30] {
        source.push(quad(ms));
        scheduler.tick(&source);
    }
    assert_eq!(scheduler.background().calls_issued(), 1);
    assert!(scheduler.background().is_busy());

    let (issued_at, reply) = scheduler.background_mut().adapter_mut().calls.remove(0);
    assert_eq!(issued_at, Duration::from_millis(10));
    reply.send(Ok(backdrop_mask())).unwrap();
    scheduler.tick(&source);

    // The result lands on the frame it was issued for, then the newest frame is sampled.
    let out = scheduler.composited_frame().unwrap();
    assert_eq!(out.timestamp(), Duration::from_millis(10));
    let calls = &scheduler.background().adapter().calls;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, Duration::from_millis(30));
}

#[test]
fn disabling_discards_in_flight_result() {
    let mut scheduler = EffectsScheduler::new(
        Deferred::<SegmentationMask>::default(),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    let mut source = LatestFrame::new();
    source.push(quad(5));

    scheduler.set_background_enabled(true);
    let setup = scheduler.background_mut().adapter_mut().setups.pop().unwrap();
    setup.send(Ok(())).unwrap();
    scheduler.tick(&source);
    assert!(scheduler.background().is_busy());

    scheduler.set_background_enabled(false);
    let (_, reply) = scheduler.background_mut().adapter_mut().calls.pop().unwrap();
    assert!(reply.send(Ok(backdrop_mask())).is_err());

    scheduler.tick(&source);
    assert!(scheduler.composited_frame().is_none());
    assert!(scheduler.background().sink().output().is_none());
    assert_eq!(scheduler.background().state(), EffectState::Disabled);

    // Re-enabling samples the same frame again.
    scheduler.set_background_enabled(true);
    let setup = scheduler.background_mut().adapter_mut().setups.pop().unwrap();
    setup.send(Ok(())).unwrap();
    scheduler.tick(&source);
    assert_eq!(scheduler.background().calls_issued(), 2);
}

#[test]
fn reenabled_background_starts_from_a_clean_slate() {
    let mut scheduler = EffectsScheduler::new(
        Deferred::<SegmentationMask>::default(),
        BackgroundDirective::color(0, 255, 0),
        Immediate::new(thumbs_up),
    );
    let mut source = LatestFrame::new();

    scheduler.set_background_enabled(true);
    let setup = scheduler.background_mut().adapter_mut().setups.pop().unwrap();
    setup.send(Ok(())).unwrap();
    source.push(quad(100));
    scheduler.tick(&source);
    let (_, reply) = scheduler.background_mut().adapter_mut().calls.pop().unwrap();
    reply.send(Ok(backdrop_mask())).unwrap();
    scheduler.tick(&source);
    assert_eq!(
        scheduler.composited_frame().map(|f| f.timestamp()),
        Some(Duration::from_millis(100))
    );

    // A restarted capture clock hands out earlier timestamps.
    scheduler.set_background_enabled(false);
    source.push(quad(5));
    scheduler.set_background_enabled(true);
    let setup = scheduler.background_mut().adapter_mut().setups.pop().unwrap();
    setup.send(Ok(())).unwrap();
    scheduler.tick(&source);
    assert!(scheduler.background().is_busy());
    assert!(scheduler.composited_frame().is_none());

    let (issued_at, reply) = scheduler.background_mut().adapter_mut().calls.pop().unwrap();
    assert_eq!(issued_at, Duration::from_millis(5));
    reply.send(Ok(backdrop_mask())).unwrap();
    scheduler.tick(&source);
    assert_eq!(
        scheduler.composited_frame().map(|f| f.timestamp()),
        Some(Duration::from_millis(5))
    );
}

#[test]
fn disabled_gestures_report_nothing() {
    let mut scheduler = EffectsScheduler::new(
        Deferred::<SegmentationMask>::default(),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    let mut source = LatestFrame::new();
    source.push(quad(5));

    scheduler.set_gestures_enabled(true);
    scheduler.tick(&source);
    assert!(scheduler.latest_gestures().is_some());

    scheduler.set_gestures_enabled(false);
    assert!(scheduler.latest_gestures().is_none());
    assert!(scheduler.gestures().sink().latest().is_none());

    scheduler.set_gestures_enabled(true);
    scheduler.tick(&source);
    assert_eq!(
        scheduler.latest_gestures().unwrap().timestamp,
        Duration::from_millis(5)
    );
}

#[test]
fn effects_run_independently() {
    let mut scheduler = EffectsScheduler::new(
        Immediate::new(|_| backdrop_mask()),
        BackgroundDirective::color(1, 1, 1),
        Immediate::<GestureResult>::broken(),
    );
    scheduler.set_background_enabled(true);
    scheduler.set_gestures_enabled(true);

    let mut source = LatestFrame::new();
    source.push(quad(1));
    scheduler.tick(&source);

    assert_eq!(scheduler.gestures().state(), EffectState::Error);
    assert!(scheduler.gestures().is_enabled());
    assert_eq!(scheduler.gestures().calls_issued(), 0);
    assert!(scheduler.background().is_active());
    assert!(scheduler.composited_frame().is_some());
}

#[test]
fn gestures_without_background() {
    let mut scheduler = EffectsScheduler::new(
        Deferred::<SegmentationMask>::default(),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    scheduler.set_gestures_enabled(true);

    let mut source = LatestFrame::new();
    source.push(quad(7));
    scheduler.tick(&source);

    let latest = scheduler.latest_gestures().unwrap();
    assert_eq!(latest.timestamp, Duration::from_millis(7));
    assert_eq!(latest.top().unwrap().category, "Thumb_Up");
    assert!(scheduler.composited_frame().is_none());
    assert_eq!(scheduler.background().calls_issued(), 0);
}

#[test]
fn paused_source_is_not_sampled() {
    let mut scheduler = EffectsScheduler::new(
        Immediate::new(|_| backdrop_mask()),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    scheduler.set_background_enabled(true);

    let mut source = LatestFrame::new();
    scheduler.tick(&source);
    source.push(quad(3));
    source.set_paused(true);
    scheduler.tick(&source);
    assert_eq!(scheduler.background().calls_issued(), 0);

    source.set_paused(false);
    scheduler.tick(&source);
    assert_eq!(scheduler.background().calls_issued(), 1);
}

#[test]
fn shutdown_stops_both_effects() {
    let mut scheduler = EffectsScheduler::new(
        Immediate::new(|_| backdrop_mask()),
        BackgroundDirective::default(),
        Immediate::new(thumbs_up),
    );
    scheduler.set_background_enabled(true);
    scheduler.set_gestures_enabled(true);
    scheduler.shutdown();

    let mut source = LatestFrame::new();
    source.push(quad(1));
    scheduler.tick(&source);
    assert!(!scheduler.background().is_enabled());
    assert!(!scheduler.gestures().is_enabled());
    assert_eq!(scheduler.background().calls_issued(), 0);
}
