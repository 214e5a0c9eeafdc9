//! Interaction state of a persona session.
//!
//! Allowed transitions:
//! - Idle -> Listening (voice capture started)
//! - Idle -> Thinking (text submitted, or greeting requested)
//! - Listening -> Thinking (final transcript)
//! - Listening -> Idle (capture error, end, or explicit stop)
//! - Thinking -> Speaking (reply arrived, or greeting audio started)
//! - Thinking -> Idle (greeting synthesis failed)
//! - Speaking -> Idle (playback finished, or synthesis failed)

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "idle"),
            InteractionState::Listening => write!(f, "listening"),
            InteractionState::Thinking => write!(f, "thinking"),
            InteractionState::Speaking => write!(f, "speaking"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: InteractionState,
    pub to: InteractionState,
}

impl InteractionState {
    pub fn can_transition_to(&self, target: InteractionState) -> bool {
        use InteractionState::*;
        matches!(
            (self, target),
            (Idle, Listening)
                | (Idle, Thinking)
                | (Listening, Thinking)
                | (Listening, Idle)
                | (Thinking, Speaking)
                | (Thinking, Idle)
                | (Speaking, Idle)
        )
    }

    /// Validate a transition, returning the target state on success.
    pub fn transition_to(
        self,
        target: InteractionState,
    ) -> std::result::Result<InteractionState, InvalidTransition> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(InvalidTransition { from: self, to: target })
        }
    }

    /// Whether a new request pipeline may start.
    pub fn accepts_input(&self) -> bool {
        *self == InteractionState::Idle
    }
}
