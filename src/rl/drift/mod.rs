//! Concept Drift Detection
//!
//! Streaming change detectors over the reward signal.

mod adwin;

pub use adwin::Adwin;

/// Trait for drift detectors
pub trait DriftDetector: Send {
    /// Update detector with new value, returns true if drift detected
    fn update(&mut self, value: f64) -> bool;

    /// Whether the last update flagged a change
    fn drift_detected(&self) -> bool;

    /// Number of samples currently summarized by the detector
    fn samples_seen(&self) -> u64;
}
