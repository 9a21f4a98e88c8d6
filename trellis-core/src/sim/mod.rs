//! Simulation backend.
//!
//! A complete, self-contained implementation of every collaborator interface
//! (front end, search engine, lattice algebra, LMs, model store) with
//! deliberately simple semantics: energy gating instead of acoustic scoring,
//! a scripted vocabulary instead of a decoding graph, path enumeration
//! instead of FST algebra. It exists so the session core, rescoring pipeline
//! and renderers can be exercised end to end without any model data.

pub mod algebra;
pub mod frontend;
pub mod lm;
pub mod search;

pub use algebra::SimAlgebra;
pub use frontend::{SimFrontEnd, SIM_FRAME_SECS};
pub use lm::{SimLm, SimNeuralLm};
pub use search::SimSearchEngine;

use std::fs;
use std::sync::Arc;

use crate::config::DecodeConfig;
use crate::error::Result;
use crate::frontend::FeatureFrontEnd;
use crate::lattice::WordId;
use crate::lm::NeuralLm;
use crate::model::{
    LoadedModel, Model, ModelFiles, ModelHandle, ModelStore, RescoreLms, SessionFactory,
    SymbolTable, WordBoundaryInfo,
};
use crate::search::SearchEngine;

/// Hands each session its own front end and scripted decoder.
pub struct SimSessionFactory {
    sample_rate: u32,
    adaptation: bool,
    script: Vec<WordId>,
}

impl SessionFactory for SimSessionFactory {
    fn front_end(&self) -> Result<Box<dyn FeatureFrontEnd>> {
        Ok(Box::new(SimFrontEnd::new(self.sample_rate, self.adaptation)))
    }

    fn search_engine(&self, config: &DecodeConfig) -> Result<Box<dyn SearchEngine>> {
        Ok(Box::new(SimSearchEngine::new(
            self.script.clone(),
            config.frame_period_secs(),
        )))
    }
}

/// Builder for a sim model bundle without any on-disk layout.
pub struct SimModelConfig {
    /// Vocabulary in id order; epsilon is added as id 0.
    pub vocab: Vec<String>,
    /// Words the decoder emits, one per voiced region.
    pub script: Vec<String>,
    pub sample_rate: u32,
    pub adaptation: bool,
    /// Uniform `(subtract, add)` costs for the rescore LM pair.
    pub lm_costs: Option<(f64, f64)>,
    /// Uniform cost for the neural LM (needs `lm_costs` too).
    pub neural_cost: Option<f64>,
}

impl Default for SimModelConfig {
    fn default() -> Self {
        Self {
            vocab: Vec::new(),
            script: Vec::new(),
            sample_rate: 16_000,
            adaptation: true,
            lm_costs: None,
            neural_cost: None,
        }
    }
}

impl SimModelConfig {
    pub fn build(self) -> ModelHandle {
        let symbols = SymbolTable::from_words(
            std::iter::once("<eps>".to_string()).chain(self.vocab),
        );
        let script: Vec<WordId> = self.script.iter().filter_map(|w| symbols.id(w)).collect();
        let rescore = self.lm_costs.map(|(subtract, add)| RescoreLms {
            subtract: Arc::new(SimLm::uniform(subtract)),
            add: Arc::new(SimLm::uniform(add)),
        });
        let neural = self
            .neural_cost
            .map(|cost| Arc::new(SimNeuralLm::new(SimLm::uniform(cost))) as Arc<dyn NeuralLm>);

        Model::from_loaded(LoadedModel {
            symbols,
            word_boundary: None,
            rescore,
            neural,
            algebra: Arc::new(SimAlgebra),
            sessions: Arc::new(SimSessionFactory {
                sample_rate: self.sample_rate,
                adaptation: self.adaptation,
                script,
            }),
        })
    }
}

/// Plain sim bundle: given vocabulary, given script, no rescoring.
pub fn sim_model(vocab: &[&str], script: &[&str]) -> ModelHandle {
    SimModelConfig {
        vocab: vocab.iter().map(|w| w.to_string()).collect(),
        script: script.iter().map(|w| w.to_string()).collect(),
        ..SimModelConfig::default()
    }
    .build()
}

/// [`ModelStore`] over a probed directory layout: reads the real symbol
/// table and word-boundary metadata, and substitutes sim resources for the
/// binary components (acoustic model, graphs, LMs).
pub struct SimStore {
    pub script: Vec<String>,
    pub adaptation: bool,
    pub lm_costs: (f64, f64),
    pub neural_cost: f64,
    pub sample_rate: u32,
}

impl Default for SimStore {
    fn default() -> Self {
        Self {
            script: Vec::new(),
            adaptation: true,
            lm_costs: (1.0, 1.2),
            neural_cost: 1.1,
            sample_rate: 16_000,
        }
    }
}

impl ModelStore for SimStore {
    fn load(&self, files: &ModelFiles) -> Result<LoadedModel> {
        let symbols = SymbolTable::parse(&fs::read_to_string(&files.words_txt)?)?;
        let word_boundary = match &files.word_boundary_int {
            Some(path) => Some(WordBoundaryInfo::parse(&fs::read_to_string(path)?)?),
            None => None,
        };

        let (subtract_cost, add_cost) = self.lm_costs;
        let rescore = files.has_rescore_pair().then(|| RescoreLms {
            subtract: Arc::new(SimLm::uniform(subtract_cost)) as Arc<dyn crate::lm::LanguageModel>,
            add: Arc::new(SimLm::uniform(add_cost)),
        });
        let neural = files.neural_lm_dir.is_some().then(|| {
            Arc::new(SimNeuralLm::new(SimLm::uniform(self.neural_cost))) as Arc<dyn NeuralLm>
        });

        let script: Vec<WordId> = self.script.iter().filter_map(|w| symbols.id(w)).collect();
        Ok(LoadedModel {
            symbols,
            word_boundary,
            rescore,
            neural,
            algebra: Arc::new(SimAlgebra),
            sessions: Arc::new(SimSessionFactory {
                sample_rate: self.sample_rate,
                adaptation: self.adaptation,
                script,
            }),
        })
    }
}
