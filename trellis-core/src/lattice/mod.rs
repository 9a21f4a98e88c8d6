//! Lattice data model shared across the collaborator boundary.
//!
//! Two forms cross the `SearchEngine` / `LatticeAlgebra` interfaces:
//!
//! - [`CompactLattice`] — what the decoder emits; per-arc frame spans are
//!   authoritative and are used to recover word timing.
//! - [`Lattice`] — the expanded form composition operates on. Arcs keep their
//!   frame counts through rescoring so timing survives the round trip.
//!
//! The empty-lattice condition is `start == None`. A start-state id of 0 is a
//! perfectly valid lattice; only the absence of a start state means "no
//! hypothesis".

pub mod algebra;

pub type StateId = usize;
/// Word symbol id; 0 is epsilon.
pub type WordId = u32;
pub type PhoneId = i32;

pub const EPSILON: WordId = 0;

/// Pair of scores carried on every arc: graph (LM + pronunciation) cost and
/// acoustic cost, both negative log-likelihoods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeWeight {
    pub graph: f64,
    pub acoustic: f64,
}

impl LatticeWeight {
    pub const fn new(graph: f64, acoustic: f64) -> Self {
        Self { graph, acoustic }
    }

    pub const fn one() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn total(&self) -> f64 {
        self.graph + self.acoustic
    }

    pub fn plus(&self, other: &LatticeWeight) -> LatticeWeight {
        LatticeWeight::new(self.graph + other.graph, self.acoustic + other.acoustic)
    }

    pub fn scaled(&self, factor: f64) -> LatticeWeight {
        LatticeWeight::new(self.graph * factor, self.acoustic * factor)
    }
}

/// One transition: a word label, its scores, and the number of decoded frames
/// the arc spans.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeArc {
    pub word: WordId,
    pub weight: LatticeWeight,
    pub num_frames: u32,
    pub next: StateId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatticeState {
    pub arcs: Vec<LatticeArc>,
    /// `Some` marks a final state; the weight is added to every path ending
    /// here.
    pub final_weight: Option<LatticeWeight>,
}

/// Expanded word lattice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lattice {
    pub start: Option<StateId>,
    pub states: Vec<LatticeState>,
}

/// Decoder-native lattice with authoritative frame spans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactLattice {
    pub start: Option<StateId>,
    pub states: Vec<LatticeState>,
}

macro_rules! lattice_shared_impl {
    ($ty:ident) => {
        impl $ty {
            pub fn empty() -> Self {
                Self::default()
            }

            /// No start state means no hypothesis.
            pub fn is_empty(&self) -> bool {
                self.start.is_none() || self.states.is_empty()
            }

            pub fn num_states(&self) -> usize {
                self.states.len()
            }

            pub fn num_arcs(&self) -> usize {
                self.states.iter().map(|s| s.arcs.len()).sum()
            }

            pub fn add_state(&mut self) -> StateId {
                self.states.push(LatticeState::default());
                self.states.len() - 1
            }

            pub fn add_arc(&mut self, from: StateId, arc: LatticeArc) {
                self.states[from].arcs.push(arc);
            }

            pub fn set_final(&mut self, state: StateId, weight: LatticeWeight) {
                self.states[state].final_weight = Some(weight);
            }

            /// Build a single-path lattice from `(word, weight, num_frames)`
            /// triples. The end state is final with unit weight.
            pub fn linear(path: &[(WordId, LatticeWeight, u32)]) -> Self {
                let mut lat = Self::empty();
                let mut cur = lat.add_state();
                lat.start = Some(cur);
                for (word, weight, num_frames) in path {
                    let next = lat.add_state();
                    lat.add_arc(
                        cur,
                        LatticeArc {
                            word: *word,
                            weight: *weight,
                            num_frames: *num_frames,
                            next,
                        },
                    );
                    cur = next;
                }
                lat.set_final(cur, LatticeWeight::one());
                lat
            }
        }
    };
}

lattice_shared_impl!(Lattice);
lattice_shared_impl!(CompactLattice);

impl CompactLattice {
    /// Expanded form for composition. Frame spans are retained on the arcs.
    pub fn expand(&self) -> Lattice {
        Lattice {
            start: self.start,
            states: self.states.clone(),
        }
    }
}

impl Lattice {
    /// Back to the decoder-native form after rescoring.
    pub fn compact(&self) -> CompactLattice {
        CompactLattice {
            start: self.start,
            states: self.states.clone(),
        }
    }
}

/// A word with its frame span, extracted from a linear lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedWord {
    pub word: WordId,
    pub start_frame: u32,
    pub num_frames: u32,
}

/// MBR output: one word of the minimum-risk hypothesis with its posterior
/// confidence and frame span.
#[derive(Debug, Clone, PartialEq)]
pub struct MbrWord {
    pub word: WordId,
    pub confidence: f64,
    pub start_frame: u32,
    pub num_frames: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lattice_has_no_start() {
        let lat = Lattice::empty();
        assert!(lat.is_empty());
        assert_eq!(lat.num_arcs(), 0);
    }

    #[test]
    fn state_zero_start_is_not_empty() {
        // Start id 0 is valid; emptiness is only the absence of a start.
        let lat = Lattice::linear(&[(3, LatticeWeight::new(1.0, 2.0), 10)]);
        assert_eq!(lat.start, Some(0));
        assert!(!lat.is_empty());
        assert_eq!(lat.num_arcs(), 1);
    }

    #[test]
    fn linear_builder_chains_states() {
        let w = LatticeWeight::new(0.5, 1.5);
        let lat = CompactLattice::linear(&[(1, w, 5), (2, w, 7), (3, w, 3)]);
        assert_eq!(lat.num_states(), 4);
        assert_eq!(lat.num_arcs(), 3);
        assert!(lat.states[3].final_weight.is_some());
        assert_eq!(lat.states[0].arcs[0].next, 1);
    }

    #[test]
    fn expand_and_compact_round_trip() {
        let clat = CompactLattice::linear(&[(4, LatticeWeight::new(2.0, 3.0), 12)]);
        let back = clat.expand().compact();
        assert_eq!(back, clat);
    }

    #[test]
    fn weight_arithmetic() {
        let w = LatticeWeight::new(2.0, 3.0);
        assert!((w.total() - 5.0).abs() < 1e-12);
        let s = w.scaled(-1.0);
        assert!((s.graph + 2.0).abs() < 1e-12);
        let sum = w.plus(&s);
        assert!((sum.total()).abs() < 1e-12);
    }
}
