use super::event::RoomEvent;
use super::types::{Participant, Subject, TrackRef};
use std::collections::BTreeMap;
use std::sync::Arc;

type ParticipantMap = BTreeMap<String, Participant>;

/// Canonical `identity -> Participant` view of the room.
///
/// The store is the only writer of the map. Events are applied strictly in
/// arrival order and the latest event for an identity always wins. Readers
/// get [`RoomSnapshot`]s: writes copy the map if a snapshot still shares it,
/// so a snapshot never changes under its holder.
#[derive(Debug, Default)]
pub struct RoomStateStore {
    participants: Arc<ParticipantMap>,
    applied: u64,
}

impl RoomStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events applied since creation.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            participants: Arc::clone(&self.participants),
        }
    }

    fn map_mut(&mut self) -> &mut ParticipantMap {
        Arc::make_mut(&mut self.participants)
    }

    /// Replace the whole mapping from a full snapshot of the transport.
    pub fn reset(&mut self, local: Participant, remotes: impl IntoIterator<Item = Participant>) {
        let mut map: ParticipantMap = remotes
            .into_iter()
            .map(|participant| (participant.identity().to_string(), participant))
            .collect();
        map.insert(local.identity().to_string(), local);
        tracing::debug!(participants = map.len(), "room state reset from snapshot");
        self.participants = Arc::new(map);
    }

    pub fn apply(&mut self, event: RoomEvent) {
        tracing::trace!(event = event.name(), identity = event.identity(), "applying room event");
        self.applied += 1;
        match event {
            RoomEvent::ParticipantConnected(participant) => self.apply_connected(participant),
            RoomEvent::ParticipantDisconnected(subject) => {
                self.apply_disconnected(&subject.identity)
            }
            RoomEvent::TrackSubscribed { subject, track } => {
                self.apply_track_subscribed(subject, track)
            }
            RoomEvent::TrackUnsubscribed { subject, track } => {
                self.apply_track_unsubscribed(subject, &track.sid)
            }
            RoomEvent::TrackMuted { subject, track } => {
                self.apply_mute_changed(&subject, &track, true)
            }
            RoomEvent::TrackUnmuted { subject, track } => {
                self.apply_mute_changed(&subject, &track, false)
            }
            RoomEvent::SpeakingChanged { subject, speaking } => {
                self.apply_speaking_changed(&subject, speaking)
            }
        }
    }

    /// Insert or overwrite the entry for the participant's identity.
    pub fn apply_connected(&mut self, participant: Participant) {
        self.map_mut()
            .insert(participant.identity().to_string(), participant);
    }

    /// Remove the entry. Unknown identities are a no-op.
    pub fn apply_disconnected(&mut self, identity: &str) {
        if !self.participants.contains_key(identity) {
            tracing::debug!(identity, "disconnect for unknown participant");
            return;
        }
        self.map_mut().remove(identity);
    }

    /// Record a track, creating the participant on first sight.
    pub fn apply_track_subscribed(&mut self, subject: Subject, track: TrackRef) {
        let identity = subject.identity.clone();
        self.map_mut()
            .entry(identity)
            .or_insert_with(|| Participant::new(subject))
            .insert_track(track);
    }

    /// Drop a track. A remote participant left with no tracks is removed;
    /// the local participant never is.
    pub fn apply_track_unsubscribed(&mut self, subject: Subject, sid: &str) {
        let identity = subject.identity.clone();
        let map = self.map_mut();
        let participant = map
            .entry(identity.clone())
            .or_insert_with(|| Participant::new(subject));
        participant.remove_track(sid);

        if !participant.is_local() && !participant.has_tracks() {
            tracing::debug!(identity = %identity, "pruning participant without tracks");
            map.remove(&identity);
        }
    }

    /// Update the mute flag of a known track on an existing entry. Never
    /// creates a participant or a track, and only applies when the event's
    /// local/remote tag matches the entry.
    pub fn apply_mute_changed(&mut self, subject: &Subject, track: &TrackRef, muted: bool) {
        let known = self
            .participants
            .get(&subject.identity)
            .is_some_and(|participant| {
                participant.kind() == subject.kind && participant.track(&track.sid).is_some()
            });
        if !known {
            tracing::debug!(
                identity = %subject.identity,
                sid = %track.sid,
                "mute change for unknown participant or track"
            );
            return;
        }
        if let Some(participant) = self.map_mut().get_mut(&subject.identity) {
            participant.set_muted(&track.sid, muted);
        }
    }

    /// Update the speaking flag of an existing entry.
    pub fn apply_speaking_changed(&mut self, subject: &Subject, speaking: bool) {
        if !self.matches(subject) {
            tracing::debug!(identity = %subject.identity, "speaking change for unknown participant");
            return;
        }
        if let Some(participant) = self.map_mut().get_mut(&subject.identity) {
            participant.set_speaking(speaking);
        }
    }

    fn matches(&self, subject: &Subject) -> bool {
        self.participants
            .get(&subject.identity)
            .is_some_and(|participant| participant.kind() == subject.kind)
    }
}

/// Immutable view of the room at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    participants: Arc<ParticipantMap>,
}

impl RoomSnapshot {
    pub fn get(&self, identity: &str) -> Option<&Participant> {
        self.participants.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.participants.contains_key(identity)
    }

    /// All participants, ordered by identity.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn local(&self) -> Option<&Participant> {
        self.iter().find(|participant| participant.is_local())
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Participant> {
        self.iter().filter(|participant| !participant.is_local())
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
