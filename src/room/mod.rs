//! Room membership and the joined-session lifecycle.

mod event;
mod session;
mod store;
mod types;

pub use event::RoomEvent;
pub use session::{
    ConferenceSession, DeviceError, JoinReport, LocalTrack, MediaDevices, MediaState,
    RoomTransport, SessionError, TransportError,
};
pub use store::{RoomSnapshot, RoomStateStore};
pub use types::{Participant, ParticipantKind, Subject, TrackKind, TrackRef};
