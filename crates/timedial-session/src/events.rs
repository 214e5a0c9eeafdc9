//! Events broadcast by the session controller to front-ends.

use std::sync::Arc;

use timedial_core::persona::Persona;
use timedial_core::state::InteractionState;
use timedial_core::types::Message;
use timedial_media::tap::AmplitudeTap;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: InteractionState,
        to: InteractionState,
    },
    /// A persona room was entered; the transcript now holds only the greeting.
    TranscriptReset {
        persona_id: String,
        greeting: Message,
    },
    MessageAppended(Message),
    /// Transient indicator: the reply stays readable but will not be spoken.
    VoiceUnavailable {
        reason: String,
    },
    PlaybackStarted {
        playback_id: u64,
        tap: Arc<AmplitudeTap>,
    },
    PlaybackFinished {
        playback_id: u64,
    },
    PortraitReady {
        persona_id: String,
        image: String,
    },
    RoomLeft,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub persona: Option<Persona>,
    pub state: InteractionState,
    pub transcript: Vec<Message>,
    pub generation: u64,
    pub portrait: Option<String>,
}

/// Result of a request that is subject to the Idle-only guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    /// Dropped because another pipeline is active.
    Busy(InteractionState),
    EmptyText,
    NoPersona,
    /// The speech input unit refused to start.
    InputUnavailable(String),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        *self == Outcome::Accepted
    }
}
