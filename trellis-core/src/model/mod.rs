//! Shared model bundle.
//!
//! One [`Model`] is loaded per model directory and shared, immutable, by any
//! number of concurrent sessions through [`ModelHandle`] (a thin `Arc`
//! newtype: clone = attach, drop = detach, last drop tears the bundle down —
//! `Arc`'s atomic count and release/acquire ordering give exactly the
//! contract sessions need).
//!
//! Loading the actual acoustic model, graphs and LMs is delegated to a
//! [`ModelStore`] collaborator; this module owns layout probing and the
//! bundle invariants.

pub mod files;
pub mod symbols;
pub mod word_boundary;

pub use files::{GraphSpec, LayoutKind, ModelFiles};
pub use symbols::SymbolTable;
pub use word_boundary::{WordBoundaryInfo, WordBoundaryKind};

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DecodeConfig;
use crate::error::Result;
use crate::frontend::FeatureFrontEnd;
use crate::lattice::algebra::LatticeAlgebra;
use crate::lattice::WordId;
use crate::lm::{LanguageModel, NeuralLm};
use crate::search::SearchEngine;

/// The subtract/add rescoring pair: both present or neither.
pub struct RescoreLms {
    /// Baseline graph LM whose contribution is subtracted.
    pub subtract: Arc<dyn LanguageModel>,
    /// Higher-order LM whose score replaces it.
    pub add: Arc<dyn LanguageModel>,
}

/// Everything a store produces from a probed layout.
pub struct LoadedModel {
    pub symbols: SymbolTable,
    pub word_boundary: Option<WordBoundaryInfo>,
    pub rescore: Option<RescoreLms>,
    pub neural: Option<Arc<dyn NeuralLm>>,
    pub algebra: Arc<dyn LatticeAlgebra>,
    pub sessions: Arc<dyn SessionFactory>,
}

/// AcousticModelStore collaborator: turns resolved file paths into loaded
/// resources. No partial result — either everything required loads or the
/// whole construction fails.
pub trait ModelStore: Send + Sync {
    fn load(&self, files: &ModelFiles) -> Result<LoadedModel>;
}

/// Per-session resource factory carried inside the bundle. Sessions own what
/// it hands out; the factory itself stays immutable and shared.
pub trait SessionFactory: Send + Sync {
    fn front_end(&self) -> Result<Box<dyn FeatureFrontEnd>>;
    fn search_engine(&self, config: &DecodeConfig) -> Result<Box<dyn SearchEngine>>;
}

/// Immutable model bundle. Construct via [`Model::open`] (directory probe +
/// store load) or [`Model::from_loaded`] (pre-built resources, used by the
/// sim backend and tests).
pub struct Model {
    files: Option<ModelFiles>,
    loaded: LoadedModel,
}

impl Model {
    pub fn open(dir: impl AsRef<Path>, store: &dyn ModelStore) -> Result<ModelHandle> {
        let files = ModelFiles::probe(dir)?;
        let loaded = store.load(&files)?;
        info!(
            root = %files.root.display(),
            layout = ?files.layout,
            words = loaded.symbols.len(),
            rescore = loaded.rescore.is_some(),
            neural = loaded.neural.is_some(),
            "model loaded"
        );
        Ok(Self::wrap(Some(files), loaded))
    }

    pub fn from_loaded(loaded: LoadedModel) -> ModelHandle {
        Self::wrap(None, loaded)
    }

    fn wrap(files: Option<ModelFiles>, mut loaded: LoadedModel) -> ModelHandle {
        // The neural LM is only usable on top of the rescore pair.
        if loaded.neural.is_some() && loaded.rescore.is_none() {
            warn!("neural LM configured without a rescore pair — disabling it");
            loaded.neural = None;
        }
        ModelHandle(Arc::new(Model { files, loaded }))
    }

    pub fn lookup_word_id(&self, word: &str) -> Option<WordId> {
        self.loaded.symbols.id(word)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.loaded.symbols
    }

    pub fn word_boundary(&self) -> Option<&WordBoundaryInfo> {
        self.loaded.word_boundary.as_ref()
    }

    pub fn rescore_lms(&self) -> Option<&RescoreLms> {
        self.loaded.rescore.as_ref()
    }

    pub fn neural_lm(&self) -> Option<&Arc<dyn NeuralLm>> {
        self.loaded.neural.as_ref()
    }

    pub fn algebra(&self) -> &Arc<dyn LatticeAlgebra> {
        &self.loaded.algebra
    }

    pub fn sessions(&self) -> &dyn SessionFactory {
        self.loaded.sessions.as_ref()
    }

    pub fn files(&self) -> Option<&ModelFiles> {
        self.files.as_ref()
    }
}

/// Reference-counted handle to a shared [`Model`].
#[derive(Clone)]
pub struct ModelHandle(Arc<Model>);

impl ModelHandle {
    /// Number of live handles, including this one. Mostly useful in tests
    /// asserting sessions attach and detach correctly.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl std::ops::Deref for ModelHandle {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.0
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("references", &self.references())
            .finish_non_exhaustive()
    }
}
