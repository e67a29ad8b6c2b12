//! Experience Memory
//!
//! Replay buffer for storing and sampling experiences.

pub mod replay_buffer;

pub use replay_buffer::{ExperienceBuffer, Transition};
