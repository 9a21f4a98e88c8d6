//! Table-driven language models for the sim backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::lattice::WordId;
use crate::lm::{LanguageModel, NeuralLm};

/// Context-free LM: a flat per-word cost with optional per-word overrides.
#[derive(Debug, Clone)]
pub struct SimLm {
    base_cost: f64,
    overrides: HashMap<WordId, f64>,
}

impl SimLm {
    /// Same cost for every word.
    pub fn uniform(cost: f64) -> Self {
        Self {
            base_cost: cost,
            overrides: HashMap::new(),
        }
    }

    pub fn with_cost(mut self, word: WordId, cost: f64) -> Self {
        self.overrides.insert(word, cost);
        self
    }
}

impl LanguageModel for SimLm {
    fn word_cost(&self, _context: &[WordId], word: WordId) -> f64 {
        self.overrides.get(&word).copied().unwrap_or(self.base_cost)
    }
}

/// A [`SimLm`] behind a query cache, standing in for a recurrent LM whose
/// hidden-state cache must be dropped between rescoring calls.
pub struct SimNeuralLm {
    inner: SimLm,
    cache: Mutex<HashMap<(Vec<WordId>, WordId), f64>>,
    clears: AtomicUsize,
}

impl SimNeuralLm {
    pub fn new(inner: SimLm) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            clears: AtomicUsize::new(0),
        }
    }

    /// How many times the cache has been cleared.
    pub fn cache_clears(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.lock().len()
    }
}

impl LanguageModel for SimNeuralLm {
    fn word_cost(&self, context: &[WordId], word: WordId) -> f64 {
        let key = (context.to_vec(), word);
        let mut cache = self.cache.lock();
        if let Some(&cost) = cache.get(&key) {
            return cost;
        }
        let cost = self.inner.word_cost(context, word);
        cache.insert(key, cost);
        cost
    }
}

impl NeuralLm for SimNeuralLm {
    fn clear_cache(&self) {
        self.cache.lock().clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }
}
