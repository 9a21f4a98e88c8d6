//! Language-model collaborator traits.
//!
//! The rescoring pipeline only needs conditional word costs: the baseline
//! graph LM to subtract, a higher-order LM to add, and optionally a neural LM
//! blended in via pruned composition. Concrete formats (arpa, const-arpa,
//! rnnlm) belong to the model store.

use crate::lattice::WordId;

/// Conditional word costs in negative log space.
pub trait LanguageModel: Send + Sync {
    /// Cost of `word` given the preceding words of the path.
    fn word_cost(&self, context: &[WordId], word: WordId) -> f64;

    /// Extra cost for ending a sentence after `context`.
    fn final_cost(&self, _context: &[WordId]) -> f64 {
        0.0
    }
}

/// Neural LM used for the pruned-composition blend.
///
/// Implementations are stateful across calls (state/embedding caches grow as
/// states are visited), so the pipeline clears the cache after each use.
pub trait NeuralLm: LanguageModel {
    fn clear_cache(&self);
}
