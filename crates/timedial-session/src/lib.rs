//! Persona session orchestration.
//!
//! [`SessionController`] drives Idle / Listening / Thinking / Speaking,
//! sequencing the reply fetcher, speech synthesizer, playback and speech
//! input. Front-ends talk to it through a [`SessionHandle`] and follow it
//! through [`SessionEvent`]s.

pub mod controller;
pub mod events;

pub use controller::{Collaborators, SessionController, SessionError, SessionHandle, SessionOptions};
pub use events::{Outcome, SessionEvent, SessionSnapshot};
