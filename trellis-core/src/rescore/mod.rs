//! Multi-stage language-model rescoring.
//!
//! ## Stages (when a subtract/add LM pair is configured)
//!
//! ```text
//! 1. expand compact lattice, scale by −1 (subtraction-by-composition)
//! 2. compose with baseline graph LM, invert, determinize, scale by −1
//! 3. top-sort, deterministic on-demand composition with higher-order LM
//! 4. optional: pruned composition against the neural blend
//!    (higher-order LM scaled −, neural LM scaled +), then clear the
//!    neural LM cache
//! 5. apply the final graph-scale blend factor
//! ```
//!
//! Without the pair, the raw lattice passes through unchanged. An empty
//! lattice at any stage means "no hypothesis" and short-circuits to the
//! empty result — never an error.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RescoreConfig;
use crate::lattice::algebra::{BlendedLm, LatticeAlgebra};
use crate::lattice::CompactLattice;
use crate::lm::NeuralLm;
use crate::model::{ModelHandle, RescoreLms};

pub struct RescoringPipeline {
    algebra: Arc<dyn LatticeAlgebra>,
    lms: Option<RescoreLms>,
    neural: Option<Arc<dyn NeuralLm>>,
    config: RescoreConfig,
}

impl RescoringPipeline {
    /// Build the pipeline for one session from the shared model bundle.
    pub fn for_model(model: &ModelHandle, config: RescoreConfig) -> Self {
        let lms = model.rescore_lms().map(|lms| RescoreLms {
            subtract: Arc::clone(&lms.subtract),
            add: Arc::clone(&lms.add),
        });
        let neural = model.neural_lm().cloned();
        Self {
            algebra: Arc::clone(model.algebra()),
            lms,
            neural,
            config,
        }
    }

    /// Replace the raw decoder lattice's LM contribution with the improved
    /// one. Returns an empty lattice when no hypothesis survives.
    pub fn rescore(&self, raw: CompactLattice) -> CompactLattice {
        let Some(lms) = &self.lms else {
            // No LM pair configured: pass-through, bit for bit.
            return raw;
        };
        if raw.is_empty() {
            return raw;
        }

        // Stage 1: expanded form, negated so composition subtracts.
        let mut lat = raw.expand();
        self.algebra.scale(&mut lat, -1.0);

        // Stage 2: remove the baseline graph LM's contribution.
        let mut composed = self.algebra.compose_graph_lm(&lat, lms.subtract.as_ref());
        if composed.is_empty() {
            debug!("subtraction composition produced no paths");
            return CompactLattice::empty();
        }
        self.algebra.invert(&mut composed);
        let mut det = match self.algebra.determinize(composed) {
            Ok(lat) => lat,
            Err(e) => {
                warn!(error = %e, "determinization failed after LM subtraction");
                return CompactLattice::empty();
            }
        };
        self.algebra.scale(&mut det, -1.0);

        // Stage 3: reinstate an improved LM score.
        if !self.algebra.top_sort(&mut det) {
            warn!("rescored lattice is cyclic — dropping hypothesis");
            return CompactLattice::empty();
        }
        let added = self.algebra.compose_deterministic(&det, lms.add.as_ref());
        if added.is_empty() {
            debug!("higher-order composition produced no paths");
            return CompactLattice::empty();
        }
        let mut clat = added.compact();

        // Stage 4: neural blend via pruned composition.
        if let Some(neural) = &self.neural {
            let blend = BlendedLm {
                subtract: lms.add.as_ref(),
                add: neural.as_ref(),
                subtract_scale: self.config.neural_subtract_scale,
                add_scale: self.config.neural_add_scale,
            };
            let pruned = self.algebra.compose_pruned(
                &clat,
                &blend,
                self.config.prune_beam,
                self.config.max_arcs,
            );
            // The neural LM caches visited states across calls; drop them.
            neural.clear_cache();

            if pruned.is_empty() {
                debug!(
                    beam = self.config.prune_beam,
                    max_arcs = self.config.max_arcs,
                    "pruned composition produced no hypothesis"
                );
                return CompactLattice::empty();
            }
            clat = pruned;
        }

        // Stage 5: final blend weight on the graph scores.
        self.algebra.scale_graph(&mut clat, self.config.graph_scale);
        clat
    }

    pub fn has_lm_pair(&self) -> bool {
        self.lms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{LatticeWeight, WordId};
    use crate::lm::LanguageModel;
    use crate::sim::{SimAlgebra, SimLm, SimNeuralLm};

    fn raw_lattice() -> CompactLattice {
        CompactLattice::linear(&[
            (1, LatticeWeight::new(2.0, 4.0), 10),
            (2, LatticeWeight::new(1.5, 3.0), 12),
        ])
    }

    fn pipeline(
        lms: Option<RescoreLms>,
        neural: Option<Arc<dyn NeuralLm>>,
        config: RescoreConfig,
    ) -> RescoringPipeline {
        RescoringPipeline {
            algebra: Arc::new(SimAlgebra::default()),
            lms,
            neural,
            config,
        }
    }

    fn lm_pair(subtract_cost: f64, add_cost: f64) -> RescoreLms {
        RescoreLms {
            subtract: Arc::new(SimLm::uniform(subtract_cost)),
            add: Arc::new(SimLm::uniform(add_cost)),
        }
    }

    #[test]
    fn pass_through_without_lm_pair() {
        let raw = raw_lattice();
        let out = pipeline(None, None, RescoreConfig::default()).rescore(raw.clone());
        assert_eq!(out, raw);
    }

    #[test]
    fn empty_input_stays_empty() {
        let out = pipeline(Some(lm_pair(1.0, 2.0)), None, RescoreConfig::default())
            .rescore(CompactLattice::empty());
        assert!(out.is_empty());
    }

    #[test]
    fn subtract_then_add_adjusts_graph_scores() {
        // Subtract a 1.0/word baseline, add a 3.0/word higher-order LM:
        // each word's graph cost shifts by +2.0, then the 0.9 graph scale.
        let mut config = RescoreConfig::default();
        config.graph_scale = 1.0;
        let out = pipeline(Some(lm_pair(1.0, 3.0)), None, config).rescore(raw_lattice());
        assert!(!out.is_empty());

        let words: Vec<(WordId, f64)> = out
            .states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .filter(|a| a.word != 0)
            .map(|a| (a.word, a.weight.graph))
            .collect();
        assert_eq!(words.len(), 2);
        let g1 = words.iter().find(|(w, _)| *w == 1).unwrap().1;
        let g2 = words.iter().find(|(w, _)| *w == 2).unwrap().1;
        assert!((g1 - 4.0).abs() < 1e-9, "g1={g1}");
        assert!((g2 - 3.5).abs() < 1e-9, "g2={g2}");
    }

    #[test]
    fn graph_scale_is_applied_last() {
        let mut config = RescoreConfig::default();
        config.graph_scale = 0.5;
        let out = pipeline(Some(lm_pair(0.0, 0.0)), None, config).rescore(raw_lattice());
        let g1 = out
            .states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .find(|a| a.word == 1)
            .unwrap()
            .weight
            .graph;
        assert!((g1 - 1.0).abs() < 1e-9, "g1={g1}");
    }

    #[test]
    fn acoustic_scores_survive_rescoring() {
        let mut config = RescoreConfig::default();
        config.graph_scale = 1.0;
        let out = pipeline(Some(lm_pair(1.0, 1.0)), None, config).rescore(raw_lattice());
        let a1 = out
            .states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .find(|a| a.word == 1)
            .unwrap()
            .weight
            .acoustic;
        assert!((a1 - 4.0).abs() < 1e-9, "a1={a1}");
    }

    #[test]
    fn neural_cache_is_cleared_after_each_use() {
        let neural = Arc::new(SimNeuralLm::new(SimLm::uniform(0.5)));
        let pipeline = pipeline(
            Some(lm_pair(1.0, 2.0)),
            Some(neural.clone()),
            RescoreConfig::default(),
        );

        pipeline.rescore(raw_lattice());
        assert_eq!(neural.cache_clears(), 1);
        pipeline.rescore(raw_lattice());
        assert_eq!(neural.cache_clears(), 2);
    }

    #[test]
    fn tiny_arc_budget_yields_empty_not_error() {
        let neural = Arc::new(SimNeuralLm::new(SimLm::uniform(0.5)));
        let mut config = RescoreConfig::default();
        config.max_arcs = 1; // best path alone needs two word arcs
        let out = pipeline(Some(lm_pair(1.0, 2.0)), Some(neural), config).rescore(raw_lattice());
        assert!(out.is_empty());
    }

    #[test]
    fn neural_blend_moves_graph_scores() {
        // higher-order 2.0 subtracted at 0.5, neural 4.0 added at 0.5:
        // net +1.0 per word on top of stage-3 output.
        let neural = Arc::new(SimNeuralLm::new(SimLm::uniform(4.0)));
        let mut config = RescoreConfig::default();
        config.graph_scale = 1.0;
        let out = pipeline(Some(lm_pair(1.0, 2.0)), Some(neural), config).rescore(raw_lattice());

        let g1 = out
            .states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .find(|a| a.word == 1)
            .unwrap()
            .weight
            .graph;
        // raw 2.0 − 1.0 + 2.0 + (0.5·4.0 − 0.5·2.0) = 4.0
        assert!((g1 - 4.0).abs() < 1e-9, "g1={g1}");
    }

    #[test]
    fn uniform_lm_cost_checks() {
        let lm = SimLm::uniform(1.25);
        assert!((lm.word_cost(&[], 7) - 1.25).abs() < 1e-12);
        assert!((lm.final_cost(&[3]) - 0.0).abs() < 1e-12);
    }
}
