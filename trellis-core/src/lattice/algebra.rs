//! `LatticeAlgebra` — the FST-algebra collaborator interface.
//!
//! The session core orchestrates these primitives (see `rescore` and
//! `render`); it never implements composition or determinization itself.
//! The in-tree `sim` backend supplies a small reference implementation for
//! development and tests.

use crate::error::Result;
use crate::lattice::{AlignedWord, CompactLattice, Lattice, MbrWord};
use crate::lm::{LanguageModel, NeuralLm};
use crate::model::WordBoundaryInfo;

/// The blended deterministic LM used for pruned composition: the higher-order
/// LM scaled negatively, the neural LM scaled positively.
pub struct BlendedLm<'a> {
    pub subtract: &'a dyn LanguageModel,
    pub add: &'a dyn NeuralLm,
    pub subtract_scale: f64,
    pub add_scale: f64,
}

impl<'a> BlendedLm<'a> {
    /// Blended cost for one word given its path context.
    pub fn word_cost(&self, context: &[crate::lattice::WordId], word: crate::lattice::WordId) -> f64 {
        self.add_scale * self.add.word_cost(context, word)
            - self.subtract_scale * self.subtract.word_cost(context, word)
    }
}

/// FST/lattice primitives consumed by the core.
///
/// Composition methods return an empty lattice (no start state) rather than
/// an error when the result is unreachable; only structural failures
/// (non-linear input where linear is required, failed alignment) are `Err`.
pub trait LatticeAlgebra: Send + Sync {
    /// Scale both score components of every arc and final weight.
    fn scale(&self, lat: &mut Lattice, factor: f64);

    /// Scale only the graph score (the final blend factor).
    fn scale_graph(&self, clat: &mut CompactLattice, graph_scale: f64);

    /// Arc-mapped composition against the baseline graph LM (the
    /// subtraction leg of rescoring).
    fn compose_graph_lm(&self, lat: &Lattice, lm: &dyn LanguageModel) -> Lattice;

    /// Label inversion. A no-op on single-tape word acceptors but kept in the
    /// contract so transducer-backed implementations stay correct.
    fn invert(&self, lat: &mut Lattice);

    fn determinize(&self, lat: Lattice) -> Result<Lattice>;

    /// Topologically sort in place. Returns false if the lattice is cyclic
    /// (left unmodified).
    fn top_sort(&self, lat: &mut Lattice) -> bool;

    /// On-demand deterministic composition against the higher-order LM; only
    /// LM states actually visited are expanded.
    fn compose_deterministic(&self, lat: &Lattice, lm: &dyn LanguageModel) -> Lattice;

    /// Pruned composition against the neural blend with a bounded beam and
    /// arc budget. An empty result is legal and signals "no hypothesis".
    fn compose_pruned(
        &self,
        clat: &CompactLattice,
        blend: &BlendedLm<'_>,
        beam: f64,
        max_arcs: usize,
    ) -> CompactLattice;

    /// Up to `n` best linear lattices, best first.
    fn shortest_paths(&self, lat: &Lattice, n: usize) -> Vec<Lattice>;

    /// Move word labels onto word-boundary-aligned arcs so frame spans match
    /// spoken words.
    fn word_align(
        &self,
        clat: &CompactLattice,
        info: &WordBoundaryInfo,
    ) -> Result<CompactLattice>;

    /// Minimum-Bayes-risk decode: one word sequence with per-word posterior
    /// confidence and frame spans. Empty vec for an empty lattice.
    fn mbr_decode(&self, clat: &CompactLattice) -> Vec<MbrWord>;

    /// Word/timing extraction from a linear lattice. Fails with
    /// `NonLinearLattice` when the input unexpectedly branches.
    fn linear_alignment(&self, clat: &CompactLattice) -> Result<Vec<AlignedWord>>;
}
