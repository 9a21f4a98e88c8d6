//! Recognizer configuration.
//!
//! Everything tunable lives here: decode beams, endpoint rules, rescoring
//! blend weights, output shape. All structs deserialize from a JSON config
//! file with `#[serde(default)]` so partial files work, and `Default` values
//! match the classic model-bundle defaults (`beam=13.0`, `max-active=7000`,
//! `lattice-beam=6.0`, endpoint rules at 0.5/1.0/2.0 s of trailing silence,
//! frame subsampling factor 3).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};
use crate::lattice::PhoneId;

/// Beam-search parameters handed to the `SearchEngine` collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub beam: f32,
    pub max_active: usize,
    pub min_active: usize,
    pub lattice_beam: f32,
    pub acoustic_scale: f32,
    /// Acoustic frames per decoded frame. The base frame is 10 ms, so a
    /// factor of 3 gives a 30 ms decoded-frame period.
    pub frame_subsampling_factor: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            beam: 13.0,
            max_active: 7_000,
            min_active: 200,
            lattice_beam: 6.0,
            acoustic_scale: 1.0,
            frame_subsampling_factor: 3,
        }
    }
}

impl DecodeConfig {
    /// Duration of one decoded frame in seconds.
    pub fn frame_period_secs(&self) -> f64 {
        0.01 * f64::from(self.frame_subsampling_factor)
    }
}

/// One endpointing rule. Decoding ends when ANY rule fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointRule {
    /// If true the rule only applies once some non-silence was decoded.
    pub must_contain_nonsilence: bool,
    /// Trailing silence needed for the rule to fire (seconds).
    pub min_trailing_silence_secs: f32,
    /// Utterance-length floor; 0 disables the length condition.
    pub min_utterance_length_secs: f32,
}

impl Default for EndpointRule {
    fn default() -> Self {
        Self {
            must_contain_nonsilence: true,
            min_trailing_silence_secs: 1.0,
            min_utterance_length_secs: 0.0,
        }
    }
}

impl EndpointRule {
    pub fn new(
        must_contain_nonsilence: bool,
        min_trailing_silence_secs: f32,
        min_utterance_length_secs: f32,
    ) -> Self {
        Self {
            must_contain_nonsilence,
            min_trailing_silence_secs,
            min_utterance_length_secs,
        }
    }
}

/// Endpoint detection settings consumed by `SearchEngine::endpoint_detected`.
///
/// The silence-phone list doubles as the phone set the
/// `SilenceWeightAdapter` down-weights in adaptation statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub silence_phones: Vec<PhoneId>,
    pub rules: Vec<EndpointRule>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            silence_phones: (1..=10).collect(),
            rules: vec![
                // rule1: long silence with no speech decoded at all
                EndpointRule::new(false, 5.0, 0.0),
                // rule2-4: increasingly long trailing silence after speech
                EndpointRule::new(true, 0.5, 0.0),
                EndpointRule::new(true, 1.0, 0.0),
                EndpointRule::new(true, 2.0, 0.0),
                // rule5: hard utterance-length cap regardless of silence
                EndpointRule::new(false, 0.0, 20.0),
            ],
        }
    }
}

/// Rescoring-stage tunables. The blend scales are deliberately configuration,
/// not constants; the defaults mirror the reference bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RescoreConfig {
    /// Beam width for pruned composition against the neural LM blend.
    pub prune_beam: f64,
    /// Arc budget for pruned composition; exceeding it empties the lattice.
    pub max_arcs: usize,
    /// Weight on the neural LM score added during blending.
    pub neural_add_scale: f64,
    /// Weight on the higher-order LM score subtracted during blending.
    pub neural_subtract_scale: f64,
    /// Final graph-score blend factor applied to the rescored lattice.
    pub graph_scale: f64,
}

impl Default for RescoreConfig {
    fn default() -> Self {
        Self {
            prune_beam: 8.0,
            max_arcs: 100_000,
            neural_add_scale: 0.5,
            neural_subtract_scale: 0.5,
            graph_scale: 0.9,
        }
    }
}

/// Output strategy, fixed at session construction.
///
/// Modelled as a tagged variant so rendering dispatches on the enum, never on
/// runtime type inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputMode {
    /// Single best hypothesis via MBR decoding, optional per-word timing.
    BestPath {
        #[serde(default)]
        word_times: bool,
    },
    /// Up to `max_alternatives` hypotheses with aggregate log-likelihoods.
    Nbest {
        max_alternatives: usize,
        #[serde(default)]
        word_times: bool,
    },
    /// Same alternative set rendered as an alternatives markup document.
    AlternativesXml { max_alternatives: usize },
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::BestPath { word_times: false }
    }
}

/// Full per-session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Declared input sample rate (little-endian 16-bit mono PCM).
    pub sample_rate: u32,
    /// Sub-window size waveform chunks are split into before each
    /// push → silence-weight → advance pass.
    pub window_secs: f32,
    /// Decoded-frame ceiling that forces a full recycle. Bounds memory
    /// growth of the incremental decoder's trace on very long audio.
    pub recycle_ceiling_frames: u32,
    /// Include word timing in partial results.
    pub partial_word_times: bool,
    pub decode: DecodeConfig,
    pub endpoint: EndpointConfig,
    pub rescore: RescoreConfig,
    pub output: OutputMode,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            window_secs: 0.2,
            recycle_ceiling_frames: 20_000,
            partial_word_times: false,
            decode: DecodeConfig::default(),
            endpoint: EndpointConfig::default(),
            rescore: RescoreConfig::default(),
            output: OutputMode::default(),
        }
    }
}

impl RecognizerConfig {
    /// Samples per accept-waveform sub-window (~0.2 s).
    pub fn window_samples(&self) -> usize {
        ((self.sample_rate as f32 * self.window_secs) as usize).max(1)
    }

    /// Load a config from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| TrellisError::Config(e.to_string()))
    }
}
