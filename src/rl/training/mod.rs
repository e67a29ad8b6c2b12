//! Training persistence
//!
//! Session snapshots and checkpoint rotation.

pub mod checkpointing;

pub use checkpointing::{resume_or_fresh, timestamped_name, Checkpointer, SessionSnapshot};
