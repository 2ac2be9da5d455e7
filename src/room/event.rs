use super::types::{Participant, Subject, TrackRef};

/// Lifecycle events emitted by the room transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ParticipantConnected(Participant),
    ParticipantDisconnected(Subject),
    TrackSubscribed { subject: Subject, track: TrackRef },
    TrackUnsubscribed { subject: Subject, track: TrackRef },
    TrackMuted { subject: Subject, track: TrackRef },
    TrackUnmuted { subject: Subject, track: TrackRef },
    SpeakingChanged { subject: Subject, speaking: bool },
}

impl RoomEvent {
    /// Identity of the participant the event is about.
    pub fn identity(&self) -> &str {
        match self {
            RoomEvent::ParticipantConnected(participant) => participant.identity(),
            RoomEvent::ParticipantDisconnected(subject)
            | RoomEvent::TrackSubscribed { subject, .. }
            | RoomEvent::TrackUnsubscribed { subject, .. }
            | RoomEvent::TrackMuted { subject, .. }
            | RoomEvent::TrackUnmuted { subject, .. }
            | RoomEvent::SpeakingChanged { subject, .. } => &subject.identity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::ParticipantConnected(_) => "participantConnected",
            RoomEvent::ParticipantDisconnected(_) => "participantDisconnected",
            RoomEvent::TrackSubscribed { .. } => "trackSubscribed",
            RoomEvent::TrackUnsubscribed { .. } => "trackUnsubscribed",
            RoomEvent::TrackMuted { .. } => "trackMuted",
            RoomEvent::TrackUnmuted { .. } => "trackUnmuted",
            RoomEvent::SpeakingChanged { .. } => "isSpeakingChanged",
        }
    }
}
