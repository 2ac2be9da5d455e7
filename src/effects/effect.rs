use super::adapter::{AdapterOptions, InferenceAdapter, InferenceError, Pending};
use crate::capture::FrameSource;
use crate::frame::Frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;

/// Lifecycle of one effect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    Disabled,
    /// Adapter setup is pending; no inference is issued.
    Initializing,
    Active,
    /// Setup failed. The effect stays enabled but inert until toggled.
    Error,
}

/// Receives the output of each applied inference call.
pub trait ResultSink<T> {
    /// `frame` is the frame the call was issued for.
    fn publish(&mut self, frame: &Frame, result: T);

    /// Forget everything published so far. Called when the effect is disabled.
    fn reset(&mut self) {}
}

struct InFlight<T> {
    frame: Arc<Frame>,
    pending: Pending<T>,
}

/// One independently enableable per-frame effect.
///
/// Each effect owns its adapter, its sink, its enabled flag and its
/// last-sampled timestamp, so effects never block or throttle each other.
pub struct Effect<A: InferenceAdapter, K> {
    name: &'static str,
    adapter: A,
    sink: K,
    options: AdapterOptions,
    enabled: bool,
    state: EffectState,
    setup: Option<Pending<()>>,
    in_flight: Option<InFlight<A::Output>>,
    last_timestamp: Option<Duration>,
    calls: u64,
}

impl<A, K> Effect<A, K>
where
    A: InferenceAdapter,
    K: ResultSink<A::Output>,
{
    pub fn new(name: &'static str, adapter: A, sink: K, options: AdapterOptions) -> Self {
        Self {
            name,
            adapter,
            sink,
            options,
            enabled: false,
            state: EffectState::Disabled,
            setup: None,
            in_flight: None,
            last_timestamp: None,
            calls: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.state == EffectState::Active
    }

    /// Whether an inference call is awaiting its result.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Total inference calls issued since creation.
    pub fn calls_issued(&self) -> u64 {
        self.calls
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Enable or disable the effect.
    ///
    /// Enabling starts adapter setup. Disabling drops pending setup and any
    /// in-flight call, so a result resolving afterwards is never applied.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;

        if enabled {
            tracing::info!(effect = self.name, "enabling effect");
            self.state = EffectState::Initializing;
            self.setup = Some(self.adapter.initialize(&self.options));
        } else {
            tracing::info!(effect = self.name, "disabling effect");
            if self.in_flight.is_some() {
                tracing::debug!(effect = self.name, "dropping in-flight inference");
            }
            self.state = EffectState::Disabled;
            self.setup = None;
            self.in_flight = None;
            self.last_timestamp = None;
            self.sink.reset();
        }
    }

    /// Advance the loop by one display refresh.
    pub fn tick<S: FrameSource + ?Sized>(&mut self, source: &S) {
        match self.state {
            EffectState::Disabled | EffectState::Error => return,
            EffectState::Initializing => {
                if !self.poll_setup() {
                    return;
                }
            }
            EffectState::Active => {}
        }

        if self.poll_in_flight() {
            return;
        }
        if self.sample(source) {
            self.poll_in_flight();
        }
    }

    /// Returns true once the effect has become active.
    fn poll_setup(&mut self) -> bool {
        let Some(setup) = self.setup.as_mut() else {
            return false;
        };
        let outcome = match setup.try_recv() {
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => Err(InferenceError::Abandoned),
            Ok(outcome) => outcome,
        };
        self.setup = None;

        match outcome {
            Ok(()) => {
                tracing::info!(effect = self.name, "adapter ready");
                self.state = EffectState::Active;
                true
            }
            Err(err) => {
                tracing::error!(effect = self.name, error = %err, "adapter setup failed");
                self.state = EffectState::Error;
                false
            }
        }
    }

    /// Consume a resolved call. Returns true while a call is still pending.
    fn poll_in_flight(&mut self) -> bool {
        let Some(call) = self.in_flight.as_mut() else {
            return false;
        };
        let outcome = match call.pending.try_recv() {
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => Err(InferenceError::Abandoned),
            Ok(outcome) => outcome,
        };
        let Some(InFlight { frame, .. }) = self.in_flight.take() else {
            return false;
        };

        match outcome {
            Ok(result) => {
                let _span = tracing::debug_span!("publish", effect = self.name).entered();
                self.sink.publish(&frame, result);
            }
            Err(err) => {
                tracing::warn!(
                    effect = self.name,
                    timestamp = ?frame.timestamp(),
                    error = %err,
                    "inference failed, dropping frame"
                );
            }
        }
        false
    }

    /// Issue a call if the source has a new frame. Returns true if one was issued.
    fn sample<S: FrameSource + ?Sized>(&mut self, source: &S) -> bool {
        if source.is_paused() {
            return false;
        }
        let Some(frame) = source.current_frame() else {
            return false;
        };
        if frame.is_empty() {
            return false;
        }

        let timestamp = frame.timestamp();
        if self.last_timestamp == Some(timestamp) {
            return false;
        }
        self.last_timestamp = Some(timestamp);
        self.calls += 1;

        let pending = self.adapter.infer(Arc::clone(&frame), timestamp);
        self.in_flight = Some(InFlight { frame, pending });
        true
    }
}
