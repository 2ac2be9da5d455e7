use super::event::RoomEvent;
use super::store::{RoomSnapshot, RoomStateStore};
use super::types::{Participant, TrackKind};
use crate::capture::FrameSource;
use crate::config::SessionConfig;
use crate::effects::{EffectsScheduler, InferenceAdapter};
use crate::gesture::GestureResult;
use crate::segmentation::SegmentationMask;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to a room")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission to use the {kind} device was denied")]
    PermissionDenied { kind: TrackKind },

    #[error("no {kind} device available")]
    Unavailable { kind: TrackKind },

    #[error("{kind} device failed: {reason}")]
    Failed { kind: TrackKind, reason: String },
}

impl DeviceError {
    pub fn kind(&self) -> TrackKind {
        match self {
            DeviceError::PermissionDenied { kind }
            | DeviceError::Unavailable { kind }
            | DeviceError::Failed { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a join token is required")]
    MissingToken,

    #[error("failed to connect to {url}")]
    Connect {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("no local {0} track")]
    NoTrack(TrackKind),

    #[error("session has been closed")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client side of the real-time media server connection.
pub trait RoomTransport {
    fn connect(&mut self, url: &str, token: &str) -> Result<(), TransportError>;

    fn local_participant(&self) -> Participant;

    /// Current remote participants, as known by the transport.
    fn remote_participants(&self) -> Vec<Participant>;

    /// Attach a listener for room events. Dropping the receiver detaches it.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RoomEvent>;

    fn set_camera_enabled(&mut self, enabled: bool) -> Result<(), TransportError>;

    fn set_microphone_enabled(&mut self, enabled: bool) -> Result<(), TransportError>;

    fn disconnect(&mut self);
}

/// A captured hardware track.
pub trait LocalTrack {
    fn kind(&self) -> TrackKind;

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Release the hardware. The track is unusable afterwards.
    fn stop(&mut self);
}

pub trait MediaDevices {
    fn acquire(&mut self, kind: TrackKind) -> Result<Box<dyn LocalTrack>, DeviceError>;
}

/// Problems that did not prevent joining.
#[derive(Debug, Default)]
pub struct JoinReport {
    pub device_errors: Vec<DeviceError>,
    pub publish_errors: Vec<TransportError>,
}

impl JoinReport {
    pub fn is_clean(&self) -> bool {
        self.device_errors.is_empty() && self.publish_errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaState {
    pub camera: bool,
    pub microphone: bool,
}

/// One joined room: the transport, the local media, the room state and the
/// local effects, with one owner and one teardown path.
pub struct ConferenceSession<T, B, G>
where
    T: RoomTransport,
    B: InferenceAdapter<Output = SegmentationMask>,
    G: InferenceAdapter<Output = GestureResult>,
{
    transport: T,
    events: Option<mpsc::UnboundedReceiver<RoomEvent>>,
    store: RoomStateStore,
    effects: EffectsScheduler<B, G>,
    camera: Option<Box<dyn LocalTrack>>,
    microphone: Option<Box<dyn LocalTrack>>,
    closed: bool,
}

impl<T, B, G> ConferenceSession<T, B, G>
where
    T: RoomTransport,
    B: InferenceAdapter<Output = SegmentationMask>,
    G: InferenceAdapter<Output = GestureResult>,
{
    /// Connect, acquire local media, publish it and seed the room state.
    ///
    /// A camera or microphone that cannot be acquired is reported and left
    /// out; the session still joins with whatever is available.
    pub fn join<D>(
        config: &SessionConfig,
        mut transport: T,
        devices: &mut D,
        effects: EffectsScheduler<B, G>,
    ) -> Result<(Self, JoinReport), SessionError>
    where
        D: MediaDevices + ?Sized,
    {
        if config.token.is_empty() {
            return Err(SessionError::MissingToken);
        }
        let _span = tracing::info_span!("join", url = %config.url).entered();

        transport
            .connect(&config.url, &config.token)
            .map_err(|source| SessionError::Connect {
                url: config.url.clone(),
                source,
            })?;
        let events = transport.subscribe();

        let mut report = JoinReport::default();
        let camera = acquire(devices, TrackKind::Video, &mut report);
        let microphone = acquire(devices, TrackKind::Audio, &mut report);

        let mut session = Self {
            transport,
            events: Some(events),
            store: RoomStateStore::new(),
            effects,
            camera,
            microphone,
            closed: false,
        };

        session.apply_initial(TrackKind::Video, config.camera_enabled, &mut report);
        session.apply_initial(TrackKind::Audio, config.microphone_enabled, &mut report);

        let local = session.transport.local_participant();
        let remotes = session.transport.remote_participants();
        session.store.reset(local, remotes);

        tracing::info!(
            participants = session.store.snapshot().len(),
            media = ?session.media_state(),
            "joined room"
        );
        Ok((session, report))
    }

    fn apply_initial(&mut self, kind: TrackKind, enabled: bool, report: &mut JoinReport) {
        let Some(track) = self.local_track_mut(kind) else {
            return;
        };
        track.set_enabled(enabled);
        if let Err(err) = self.publish(kind, enabled) {
            tracing::warn!(%kind, enabled, error = %err, "failed to apply initial publish state");
            report.publish_errors.push(err);
        }
    }

    fn local_track(&self, kind: TrackKind) -> Option<&dyn LocalTrack> {
        match kind {
            TrackKind::Video => self.camera.as_deref(),
            TrackKind::Audio => self.microphone.as_deref(),
        }
    }

    fn local_track_mut(&mut self, kind: TrackKind) -> Option<&mut Box<dyn LocalTrack>> {
        match kind {
            TrackKind::Video => self.camera.as_mut(),
            TrackKind::Audio => self.microphone.as_mut(),
        }
    }

    fn publish(&mut self, kind: TrackKind, enabled: bool) -> Result<(), TransportError> {
        match kind {
            TrackKind::Video => self.transport.set_camera_enabled(enabled),
            TrackKind::Audio => self.transport.set_microphone_enabled(enabled),
        }
    }

    fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.local_track(kind).is_none() {
            return Err(SessionError::NoTrack(kind));
        }

        // The transport goes first so a rejected change leaves local state as it was.
        self.publish(kind, enabled)?;
        if let Some(track) = self.local_track_mut(kind) {
            track.set_enabled(enabled);
        }
        tracing::info!(%kind, enabled, "local track toggled");
        Ok(())
    }

    pub fn set_camera_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.set_enabled(TrackKind::Video, enabled)
    }

    pub fn set_microphone_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.set_enabled(TrackKind::Audio, enabled)
    }

    /// Flip the camera. Returns the new state.
    pub fn toggle_camera(&mut self) -> Result<bool, SessionError> {
        let enabled = !self.media_state().camera;
        self.set_camera_enabled(enabled)?;
        Ok(enabled)
    }

    /// Flip the microphone. Returns the new state.
    pub fn toggle_microphone(&mut self) -> Result<bool, SessionError> {
        let enabled = !self.media_state().microphone;
        self.set_microphone_enabled(enabled)?;
        Ok(enabled)
    }

    pub fn media_state(&self) -> MediaState {
        let enabled = |track: Option<&dyn LocalTrack>| track.is_some_and(|t| t.is_enabled());
        MediaState {
            camera: enabled(self.local_track(TrackKind::Video)),
            microphone: enabled(self.local_track(TrackKind::Audio)),
        }
    }

    /// Apply every room event received so far, in arrival order.
    pub fn pump_events(&mut self) -> usize {
        let Some(events) = self.events.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        let mut stream_closed = false;
        loop {
            match events.try_recv() {
                Ok(event) => {
                    self.store.apply(event);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    stream_closed = true;
                    break;
                }
            }
        }

        if stream_closed {
            tracing::warn!("room event stream closed by transport");
            self.events = None;
        }
        applied
    }

    /// Drive the local effects for one display refresh.
    pub fn tick<S: FrameSource + ?Sized>(&mut self, source: &S) {
        if self.closed {
            return;
        }
        self.effects.tick(source);
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.store.snapshot()
    }

    pub fn effects(&self) -> &EffectsScheduler<B, G> {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectsScheduler<B, G> {
        &mut self.effects
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the effects, release the hardware, detach from room events and
    /// disconnect. Safe to call more than once.
    pub fn leave(&mut self) {
        if self.closed {
            return;
        }
        tracing::info!("leaving room");

        self.effects.shutdown();
        for mut track in [self.camera.take(), self.microphone.take()]
            .into_iter()
            .flatten()
        {
            tracing::debug!(kind = %track.kind(), "stopping local track");
            track.stop();
        }
        self.events = None;
        self.transport.disconnect();
        self.closed = true;
    }
}

impl<T, B, G> Drop for ConferenceSession<T, B, G>
where
    T: RoomTransport,
    B: InferenceAdapter<Output = SegmentationMask>,
    G: InferenceAdapter<Output = GestureResult>,
{
    fn drop(&mut self) {
        self.leave();
    }
}

fn acquire<D>(devices: &mut D, kind: TrackKind, report: &mut JoinReport) -> Option<Box<dyn LocalTrack>>
where
    D: MediaDevices + ?Sized,
{
    match devices.acquire(kind) {
        Ok(track) => Some(track),
        Err(err) => {
            tracing::warn!(%kind, error = %err, "joining without local track");
            report.device_errors.push(err);
            None
        }
    }
}
