//! Feature front-end collaborator interface.
//!
//! The front end turns raw PCM into feature frames (and, when the bundle has
//! an i-vector extractor, speaker-adaptation statistics). The session pushes
//! ~0.2 s sub-windows; the search engine pulls completed frames through
//! [`FeatureFrontEnd::frame`].

pub mod silence;

pub use silence::{SilenceConfig, SilenceWeightAdapter};

use crate::error::Result;

/// Contract the session core needs from the feature pipeline.
pub trait FeatureFrontEnd: Send {
    /// Push one sub-window of 16-bit mono PCM at the declared rate.
    fn push_chunk(&mut self, sample_rate: u32, samples: &[i16]) -> Result<()>;

    /// Number of complete feature frames extracted so far.
    fn frames_ready(&self) -> u32;

    /// Feature vector for frame `index`, once ready.
    fn frame(&self, index: u32) -> Option<&[f32]>;

    /// No more audio will arrive; flush any buffered tail into a final frame.
    fn input_finished(&mut self);

    /// Whether speaker-adaptation statistics are being accumulated. When
    /// false the silence-weight pass is a no-op.
    fn has_adaptation_state(&self) -> bool;

    /// Re-weight adaptation statistics for the given `(frame, weight)`
    /// pairs. Already-extracted features are untouched.
    fn apply_frame_weights(&mut self, weights: &[(u32, f32)]);
}
