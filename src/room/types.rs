use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Whether a participant is this client or someone else in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantKind {
    Local,
    Remote,
}

/// The participant an event is about, tagged local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    pub identity: String,
    pub kind: ParticipantKind,
}

impl Subject {
    pub fn local(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            kind: ParticipantKind::Local,
        }
    }

    pub fn remote(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            kind: ParticipantKind::Remote,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.kind == ParticipantKind::Remote
    }
}

/// A published media track as seen by the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub sid: String,
    pub kind: TrackKind,
    pub muted: bool,
}

impl TrackRef {
    pub fn new(sid: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
            muted: false,
        }
    }

    pub fn audio(sid: impl Into<String>) -> Self {
        Self::new(sid, TrackKind::Audio)
    }

    pub fn video(sid: impl Into<String>) -> Self {
        Self::new(sid, TrackKind::Video)
    }

    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }
}

/// Renderable state of one room member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    identity: String,
    kind: ParticipantKind,
    tracks: BTreeMap<String, TrackRef>,
    speaking: bool,
}

impl Participant {
    pub fn new(subject: Subject) -> Self {
        Self {
            identity: subject.identity,
            kind: subject.kind,
            tracks: BTreeMap::new(),
            speaking: false,
        }
    }

    pub fn local(identity: impl Into<String>) -> Self {
        Self::new(Subject::local(identity))
    }

    pub fn remote(identity: impl Into<String>) -> Self {
        Self::new(Subject::remote(identity))
    }

    pub fn with_track(mut self, track: TrackRef) -> Self {
        self.insert_track(track);
        self
    }

    pub fn with_speaking(mut self, speaking: bool) -> Self {
        self.speaking = speaking;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> ParticipantKind {
        self.kind
    }

    pub fn subject(&self) -> Subject {
        Subject {
            identity: self.identity.clone(),
            kind: self.kind,
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == ParticipantKind::Local
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackRef> {
        self.tracks.values()
    }

    pub fn track(&self, sid: &str) -> Option<&TrackRef> {
        self.tracks.get(sid)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// First track of `kind`, the one a video tile renders.
    pub fn first_track(&self, kind: TrackKind) -> Option<&TrackRef> {
        self.tracks.values().find(|track| track.kind == kind)
    }

    /// Has an unmuted video track.
    pub fn is_camera_enabled(&self) -> bool {
        self.tracks
            .values()
            .any(|track| track.kind == TrackKind::Video && !track.muted)
    }

    /// Has an unmuted audio track.
    pub fn is_microphone_enabled(&self) -> bool {
        self.tracks
            .values()
            .any(|track| track.kind == TrackKind::Audio && !track.muted)
    }

    pub(crate) fn insert_track(&mut self, track: TrackRef) {
        self.tracks.insert(track.sid.clone(), track);
    }

    pub(crate) fn remove_track(&mut self, sid: &str) -> Option<TrackRef> {
        self.tracks.remove(sid)
    }

    /// Set the mute flag of a known track. Returns false if the track is unknown.
    pub(crate) fn set_muted(&mut self, sid: &str, muted: bool) -> bool {
        match self.tracks.get_mut(sid) {
            Some(track) => {
                track.muted = muted;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_speaking(&mut self, speaking: bool) {
        self.speaking = speaking;
    }
}
