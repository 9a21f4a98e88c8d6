//! # trellis-core
//!
//! Streaming speech-recognition session engine.
//!
//! ## Architecture
//!
//! ```text
//! PCM chunks → RecognizerSession ─ push ─▶ FeatureFrontEnd
//!                    │                          │ frames
//!                    │ silence weighting        ▼
//!                    └────────────────▶ SearchEngine (lattice)
//!                                               │
//!                                     RescoringPipeline (LM swap)
//!                                               │
//!                                        ResultFormatter → JSON / XML
//! ```
//!
//! One [`Model`] bundle is shared immutably by any number of sessions through
//! [`ModelHandle`]; each session owns its front end, decoder and adapters.
//! The heavy collaborators (features, search, FST algebra, LMs) sit behind
//! traits; the in-tree [`sim`] backend implements all of them for
//! development and tests.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod frontend;
pub mod lattice;
pub mod lm;
pub mod model;
pub mod render;
pub mod rescore;
pub mod search;
pub mod session;
pub mod sim;

// Convenience re-exports for downstream crates
pub use config::{DecodeConfig, EndpointConfig, OutputMode, RecognizerConfig, RescoreConfig};
pub use error::{Result, TrellisError};
pub use frontend::{FeatureFrontEnd, SilenceWeightAdapter};
pub use lattice::algebra::LatticeAlgebra;
pub use lattice::{CompactLattice, Lattice};
pub use lm::{LanguageModel, NeuralLm};
pub use model::{Model, ModelFiles, ModelHandle, ModelStore, SessionFactory};
pub use rescore::RescoringPipeline;
pub use search::SearchEngine;
pub use session::{RecognizerSession, SessionState};
