//! The inference boundary.
//!
//! Models are external collaborators: the scheduler only sees an
//! [`InferenceAdapter`] whose setup and per-frame calls resolve through
//! [`Pending`] one-shot channels. The scheduler polls them once per tick and
//! never blocks, so an adapter may resolve immediately, on a worker thread,
//! or from a host callback.

use crate::frame::Frame;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("adapter is not initialized")]
    NotInitialized,

    #[error("adapter dropped the pending call without resolving it")]
    Abandoned,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A result the adapter will deliver later.
pub type Pending<T> = oneshot::Receiver<Result<T, InferenceError>>;

/// Wrap an already-known outcome as a pending result.
pub fn resolved<T>(result: Result<T, InferenceError>) -> Pending<T> {
    let (tx, rx) = oneshot::channel();
    // The receiver is still alive here, so the send cannot fail.
    let _ = tx.send(result);
    rx
}

/// Where the model should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delegate {
    #[default]
    Cpu,
    Gpu,
}

/// Setup options handed to an adapter when its effect is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    pub delegate: Delegate,
    /// Upper bound on reported results per frame (hands for gestures).
    pub max_results: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            delegate: Delegate::Cpu,
            max_results: 2,
        }
    }
}

pub trait InferenceAdapter {
    type Output;

    /// Start model warm-up. No `infer` call is issued until this resolves `Ok`.
    fn initialize(&mut self, options: &AdapterOptions) -> Pending<()>;

    /// Run the model on one frame.
    fn infer(&mut self, frame: Arc<Frame>, timestamp: Duration) -> Pending<Self::Output>;
}

/// A synchronous model that processes one frame per call.
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait FrameModel: Send + 'static {
    type Output;

    fn process(&mut self, frame: &Frame, timestamp: Duration) -> anyhow::Result<Self::Output>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Called whenever the owning effect is re-enabled, since the frames it
    /// sees next are not a continuation of the ones it saw before.
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }
}

type Loader<M> = Arc<dyn Fn(&AdapterOptions) -> anyhow::Result<M> + Send + Sync>;

type Waiter = oneshot::Sender<Result<(), InferenceError>>;

/// Model storage shared with the loader thread.
struct Slot<M> {
    model: Option<M>,
    /// Set while a loader thread is running.
    loading: bool,
    /// Setup calls to resolve when the running load finishes.
    waiters: Vec<Waiter>,
}

impl<M> Slot<M> {
    fn new(model: Option<M>) -> Self {
        Self {
            model,
            loading: false,
            waiters: Vec::new(),
        }
    }
}

/// Bridges a [`FrameModel`] onto the adapter boundary.
///
/// Loading runs on a worker thread; per-frame calls run inline and resolve
/// before `infer` returns. A loaded model is kept across disable/enable, and
/// setup requested while a load is running waits on that load.
pub struct ModelAdapter<M> {
    name: &'static str,
    loader: Loader<M>,
    slot: Arc<Mutex<Slot<M>>>,
}

impl<M: FrameModel> ModelAdapter<M> {
    pub fn new<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn(&AdapterOptions) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        Self {
            name,
            loader: Arc::new(loader),
            slot: Arc::new(Mutex::new(Slot::new(None))),
        }
    }

    /// Wrap a model that is already loaded.
    pub fn preloaded(name: &'static str, model: M) -> Self {
        Self {
            name,
            loader: Arc::new(|_: &AdapterOptions| -> anyhow::Result<M> {
                Err(anyhow::anyhow!("preloaded model cannot be reloaded"))
            }),
            slot: Arc::new(Mutex::new(Slot::new(Some(model)))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.model.is_some())
            .unwrap_or(false)
    }

    fn run(&self, frame: &Frame, timestamp: Duration) -> Result<M::Output, InferenceError> {
        let mut slot = self.slot.lock().map_err(poisoned)?;
        let model = slot.model.as_mut().ok_or(InferenceError::NotInitialized)?;
        Ok(model.process(frame, timestamp)?)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> InferenceError {
    InferenceError::Backend(anyhow::anyhow!("model lock poisoned"))
}

/// Finish a load: store the model and resolve everyone waiting on it.
fn complete<M>(shared: &Mutex<Slot<M>>, outcome: anyhow::Result<M>) {
    let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
    slot.loading = false;
    let waiters = std::mem::take(&mut slot.waiters);

    match outcome {
        Ok(model) => {
            slot.model = Some(model);
            drop(slot);
            for waiter in waiters {
                // Nobody is waiting any more if the effect was disabled meanwhile.
                let _ = waiter.send(Ok(()));
            }
        }
        Err(err) => {
            drop(slot);
            let message = format!("{err:#}");
            for waiter in waiters {
                let _ = waiter.send(Err(InferenceError::Backend(anyhow::anyhow!(
                    "{message}"
                ))));
            }
        }
    }
}

impl<M: FrameModel> InferenceAdapter for ModelAdapter<M> {
    type Output = M::Output;

    fn initialize(&mut self, options: &AdapterOptions) -> Pending<()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(err) => return resolved(Err(poisoned(err))),
            };
            if let Some(model) = slot.model.as_mut() {
                tracing::debug!(adapter = self.name, "model already loaded, resetting state");
                model.reset_state();
                return resolved(Ok(()));
            }
            slot.waiters.push(tx);
            if slot.loading {
                tracing::debug!(adapter = self.name, "model load in progress, waiting on it");
                return rx;
            }
            slot.loading = true;
        }

        let loader = Arc::clone(&self.loader);
        let shared = Arc::clone(&self.slot);
        let options = options.clone();
        let name = self.name;

        let spawned = std::thread::Builder::new()
            .name(format!("{name}-load"))
            .spawn(move || {
                let _span = tracing::debug_span!("model_load", adapter = name).entered();
                complete(&shared, (*loader)(&options));
            });

        if let Err(err) = spawned {
            complete(
                &self.slot,
                Err(anyhow::Error::new(err).context("failed to spawn model loader")),
            );
        }
        rx
    }

    fn infer(&mut self, frame: Arc<Frame>, timestamp: Duration) -> Pending<Self::Output> {
        resolved(self.run(&frame, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot::error::TryRecvError;

    struct Counter {
        calls: u32,
        resets: u32,
    }

    impl FrameModel for Counter {
        type Output = u32;

        fn process(&mut self, _frame: &Frame, _timestamp: Duration) -> anyhow::Result<u32> {
            self.calls += 1;
            Ok(self.calls)
        }

        fn reset_state(&mut self) {
            self.resets += 1;
        }
    }

    fn frame() -> Arc<Frame> {
        Arc::new(Frame::new(1, 1, vec![0, 0, 0, 255], Duration::ZERO).unwrap())
    }

    fn wait<T>(mut pending: Pending<T>) -> Result<T, InferenceError> {
        loop {
            match pending.try_recv() {
                Ok(result) => return result,
                Err(TryRecvError::Empty) => std::thread::yield_now(),
                Err(TryRecvError::Closed) => return Err(InferenceError::Abandoned),
            }
        }
    }

    #[test]
    fn resolved_is_ready_immediately() {
        let mut pending = resolved::<u8>(Ok(7));
        assert_eq!(pending.try_recv().unwrap().unwrap(), 7);
    }

    #[test]
    fn infer_before_load_reports_not_initialized() {
        let mut adapter = ModelAdapter::new("counter", |_: &AdapterOptions| {
            Ok(Counter { calls: 0, resets: 0 })
        });
        let err = wait(adapter.infer(frame(), Duration::ZERO)).unwrap_err();
        assert!(matches!(err, InferenceError::NotInitialized));
    }

    #[test]
    fn loads_on_worker_then_infers() {
        let mut adapter = ModelAdapter::new("counter", |_: &AdapterOptions| {
            Ok(Counter { calls: 0, resets: 0 })
        });
        wait(adapter.initialize(&AdapterOptions::default())).unwrap();
        assert!(adapter.is_loaded());
        assert_eq!(wait(adapter.infer(frame(), Duration::ZERO)).unwrap(), 1);
        assert_eq!(wait(adapter.infer(frame(), Duration::ZERO)).unwrap(), 2);
    }

    #[test]
    fn loader_failure_surfaces_as_backend_error() {
        let mut adapter = ModelAdapter::<Counter>::new("broken", |_: &AdapterOptions| {
            Err(anyhow::anyhow!("model file missing"))
        });
        let err = wait(adapter.initialize(&AdapterOptions::default())).unwrap_err();
        assert!(err.to_string().contains("model file missing"));
        assert!(!adapter.is_loaded());
    }

    #[test]
    fn reinitialize_resets_instead_of_reloading() {
        let mut adapter = ModelAdapter::preloaded("counter", Counter { calls: 0, resets: 0 });
        wait(adapter.initialize(&AdapterOptions::default())).unwrap();
        wait(adapter.initialize(&AdapterOptions::default())).unwrap();
        let resets = adapter.slot.lock().unwrap().model.as_ref().unwrap().resets;
        assert_eq!(resets, 2);
    }

    #[test]
    fn reenabling_during_load_joins_the_running_load() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let loads = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&loads);
        let mut adapter = ModelAdapter::new("counter", move |_: &AdapterOptions| {
            counted.fetch_add(1, Ordering::SeqCst);
            let _ = gate.lock().map(|rx| rx.recv());
            Ok(Counter { calls: 0, resets: 0 })
        });

        // The first effect is disabled before its load finishes.
        drop(adapter.initialize(&AdapterOptions::default()));
        let second = adapter.initialize(&AdapterOptions::default());
        release.send(()).unwrap();

        wait(second).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(adapter.is_loaded());
        let resets = adapter.slot.lock().unwrap().model.as_ref().unwrap().resets;
        assert_eq!(resets, 0);
    }
}
