//! Incremental search-engine collaborator interface.

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::frontend::FeatureFrontEnd;
use crate::lattice::{CompactLattice, Lattice, PhoneId};

/// Token-passing decoder contract consumed by the session core.
///
/// Frame counters are relative to the last (re)initialization, which is what
/// the recycle policy accumulates into its running frame offset.
pub trait SearchEngine: Send {
    /// Consume every feature frame the front end has ready.
    fn advance(&mut self, front: &mut dyn FeatureFrontEnd) -> Result<()>;

    fn frames_decoded(&self) -> u32;

    /// Frames currently represented in the (possibly partial) lattice.
    fn frames_in_lattice(&self) -> u32;

    fn endpoint_detected(&self, endpoint: &EndpointConfig) -> bool;

    /// Raw compact lattice over the first `num_frames` decoded frames.
    fn get_lattice(&mut self, num_frames: u32, use_final_probs: bool) -> Result<CompactLattice>;

    fn best_path(&self) -> Result<Lattice>;

    /// Close out the current utterance. Feature state is untouched.
    fn finalize(&mut self);

    /// Resume incremental search at `frame_offset` without discarding graph
    /// state (soft recycle).
    fn reinitialize_at(&mut self, frame_offset: u32) -> Result<()>;

    /// Phone per decoded frame along the current best traceback, used for
    /// silence weighting.
    fn best_traceback(&self) -> Vec<PhoneId>;
}
