//! Core types, config, errors, and persona roster for TimeDial.

pub mod config;
pub mod error;
pub mod persona;
pub mod protocol;
pub mod state;
pub mod types;
