//! Streaming recognition session.
//!
//! ## Lifecycle
//!
//! ```text
//!             accept_waveform          result()/reset()
//! Initialized ───────────────▶ Running ───────────────▶ Endpoint
//!                                 ▲                        │
//!                                 │     accept_waveform    │
//!                                 └────────(recycle)───────┘
//!                                 │
//!                                 │ final_result()
//!                                 ▼
//!                             Finalized
//! ```
//!
//! A session owns its front end, search engine and silence-weight adapter;
//! the model bundle stays shared and immutable behind a [`ModelHandle`].
//! Waveform is split into ~0.2 s sub-windows, each pushed through a
//! push → silence-weight → advance pass so partial results and endpoint
//! checks stay responsive inside large writes.

use tracing::{debug, warn};

use crate::config::RecognizerConfig;
use crate::error::Result;
use crate::frontend::{FeatureFrontEnd, SilenceConfig, SilenceWeightAdapter};
use crate::model::ModelHandle;
use crate::render::{ResultFormatter, Timing};
use crate::rescore::RescoringPipeline;
use crate::search::SearchEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no audio accepted yet.
    Initialized,
    /// Decoding in progress.
    Running,
    /// An utterance was closed out; the next write recycles the decoder.
    Endpoint,
    /// Stream ended; only the cached final result remains.
    Finalized,
}

/// How the decoder is brought back up for the next utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleKind {
    /// Fresh front end and search engine, frame numbering restarts.
    Full,
    /// Keep both, resume incremental search at the accumulated offset.
    Soft,
}

/// Recycle policy, kept as a pure function so the state table is testable
/// on its own.
pub fn recycle_kind(
    decoder_exists: bool,
    prior: SessionState,
    frame_offset: u32,
    ceiling_frames: u32,
) -> RecycleKind {
    if !decoder_exists || prior == SessionState::Finalized || frame_offset > ceiling_frames {
        RecycleKind::Full
    } else {
        RecycleKind::Soft
    }
}

pub struct RecognizerSession {
    model: ModelHandle,
    config: RecognizerConfig,
    state: SessionState,
    front: Option<Box<dyn FeatureFrontEnd>>,
    search: Option<Box<dyn SearchEngine>>,
    silence: SilenceWeightAdapter,
    rescorer: RescoringPipeline,
    formatter: ResultFormatter,
    /// Decoded frames accumulated by earlier utterances of the current
    /// decoder round.
    frame_offset: u32,
    /// Samples pushed since the current round began.
    samples_round: u64,
    /// Samples pushed before the current round began; anchors timestamps.
    samples_before_round: u64,
    last_result: String,
}

impl RecognizerSession {
    pub fn new(model: &ModelHandle, config: RecognizerConfig) -> Self {
        let rescorer = RescoringPipeline::for_model(model, config.rescore.clone());
        let formatter = ResultFormatter::new(
            model.clone(),
            config.output.clone(),
            config.partial_word_times,
        );
        let silence = SilenceWeightAdapter::new(SilenceConfig {
            silence_phones: config.endpoint.silence_phones.clone(),
            ..SilenceConfig::default()
        });
        let last_result = formatter.empty_final();
        Self {
            model: model.clone(),
            config,
            state: SessionState::Initialized,
            front: None,
            search: None,
            silence,
            rescorer,
            formatter,
            frame_offset: 0,
            samples_round: 0,
            samples_before_round: 0,
            last_result,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Feed 16-bit mono PCM. Returns `true` when an endpoint was detected;
    /// the caller should then pull [`RecognizerSession::result`].
    pub fn accept_waveform(&mut self, samples: &[i16]) -> Result<bool> {
        self.ensure_decoding()?;
        // Both set by ensure_decoding.
        let (Some(front), Some(search)) = (self.front.as_mut(), self.search.as_mut()) else {
            return Ok(false);
        };

        for window in samples.chunks(self.config.window_samples()) {
            front.push_chunk(self.config.sample_rate, window)?;
            self.silence.update(search.as_ref(), front.as_mut());
            search.advance(front.as_mut())?;
        }
        self.samples_round += samples.len() as u64;
        Ok(search.endpoint_detected(&self.config.endpoint))
    }

    /// Byte-oriented variant: little-endian 16-bit mono PCM.
    pub fn accept_waveform_bytes(&mut self, bytes: &[u8]) -> Result<bool> {
        if bytes.len() % 2 != 0 {
            warn!("odd trailing byte in waveform write — dropping it");
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        self.accept_waveform(&samples)
    }

    /// Close out the current utterance and render its final-shaped result.
    /// Outside `Running` this returns the canonical empty result without
    /// touching the decoder.
    pub fn result(&mut self) -> Result<String> {
        if self.state != SessionState::Running {
            return Ok(self.formatter.empty_final());
        }
        let Some(search) = self.search.as_mut() else {
            return Ok(self.formatter.empty_final());
        };

        search.finalize();
        let raw = search.get_lattice(search.frames_in_lattice(), true)?;
        let rescored = self.rescorer.rescore(raw);
        let out = self.formatter.render_final(&rescored, &self.timing());
        self.state = SessionState::Endpoint;
        self.last_result = out.clone();
        Ok(out)
    }

    /// In-progress hypothesis for the current utterance. Never rescored and
    /// never changes session state.
    pub fn partial_result(&mut self) -> Result<String> {
        if self.state != SessionState::Running {
            return Ok(self.formatter.empty_partial());
        }
        let Some(search) = self.search.as_mut() else {
            return Ok(self.formatter.empty_partial());
        };

        let raw = search.get_lattice(search.frames_in_lattice(), false)?;
        let timing = self.timing();
        Ok(self.formatter.render_partial(&raw, &timing))
    }

    /// End of stream: flush buffered audio, decode the tail, render and cache
    /// the final result, release per-session decoder resources.
    pub fn final_result(&mut self) -> Result<String> {
        if self.state == SessionState::Finalized {
            return Ok(self.last_result.clone());
        }

        let out = match (self.front.as_mut(), self.search.as_mut()) {
            (Some(front), Some(search)) if self.state == SessionState::Running => {
                front.input_finished();
                self.silence.update(search.as_ref(), front.as_mut());
                search.advance(front.as_mut())?;
                search.finalize();
                let raw = search.get_lattice(search.frames_in_lattice(), true)?;
                let rescored = self.rescorer.rescore(raw);
                self.formatter.render_final(&rescored, &self.timing())
            }
            _ => self.formatter.empty_final(),
        };

        debug!(
            frames = self.frame_offset,
            samples = self.samples_before_round + self.samples_round,
            "session finalized"
        );
        self.state = SessionState::Finalized;
        self.front = None;
        self.search = None;
        self.last_result = out.clone();
        Ok(out)
    }

    /// Abandon the current utterance without producing a result. Always lands
    /// in `Endpoint`, even after `final_result`; the next write recycles the
    /// decoder (full, when the decoder was already released).
    pub fn reset(&mut self) {
        if self.state == SessionState::Running {
            if let Some(search) = self.search.as_mut() {
                search.finalize();
            }
        }
        self.state = SessionState::Endpoint;
        self.last_result = self.formatter.empty_final();
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn ensure_decoding(&mut self) -> Result<()> {
        if self.state == SessionState::Running && self.search.is_some() {
            return Ok(());
        }

        let next_offset = self
            .frame_offset
            .saturating_add(self.search.as_ref().map_or(0, |s| s.frames_decoded()));
        let kind = recycle_kind(
            self.search.is_some(),
            self.state,
            next_offset,
            self.config.recycle_ceiling_frames,
        );
        debug!(?kind, offset = next_offset, "recycling decoder");

        match kind {
            RecycleKind::Full => {
                self.samples_before_round += self.samples_round;
                self.samples_round = 0;
                self.frame_offset = 0;
                self.front = Some(self.model.sessions().front_end()?);
                self.search = Some(self.model.sessions().search_engine(&self.config.decode)?);
            }
            RecycleKind::Soft => {
                self.frame_offset = next_offset;
                if let Some(search) = self.search.as_mut() {
                    search.reinitialize_at(self.frame_offset)?;
                }
            }
        }
        self.silence.reset();
        self.state = SessionState::Running;
        Ok(())
    }

    fn timing(&self) -> Timing {
        Timing {
            round_start_secs: self.samples_before_round as f64 / f64::from(self.config.sample_rate),
            frame_offset: self.frame_offset,
            frame_period_secs: self.config.decode.frame_period_secs(),
        }
    }
}
