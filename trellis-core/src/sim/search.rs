//! Scripted energy-gate decoder for the sim backend.
//!
//! Voiced regions (frame energy over a fixed gate, at least three frames
//! long) each emit the next word of a preset script. Silence between and
//! around words is kept as epsilon arcs so frame spans, endpointing and
//! silence weighting all behave like a real decoder's.

use tracing::{debug, trace};

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::frontend::FeatureFrontEnd;
use crate::lattice::{CompactLattice, Lattice, LatticeWeight, PhoneId, WordId, EPSILON};
use crate::search::SearchEngine;

const ENERGY_GATE: f32 = 0.01;
const MIN_RUN_FRAMES: u32 = 3;
/// Fixed per-word scores; the interesting score motion happens in rescoring.
const WORD_GRAPH_COST: f64 = 2.0;
const WORD_ACOUSTIC_COST: f64 = 4.0;

const SILENCE_PHONE: PhoneId = 1;
const VOICED_PHONE: PhoneId = 11;

#[derive(Debug, Clone)]
struct Emission {
    word: WordId,
    start_frame: u32,
    num_frames: u32,
}

pub struct SimSearchEngine {
    script: Vec<WordId>,
    script_pos: usize,
    frame_period_secs: f64,
    /// Next frame to pull from the front end; absolute across soft recycles.
    next_fetch: u32,
    /// Voiced flag per frame of the current utterance.
    voiced: Vec<bool>,
    emitted: Vec<Emission>,
    current_run: Option<(u32, u32)>,
}

impl SimSearchEngine {
    pub fn new(script: Vec<WordId>, frame_period_secs: f64) -> Self {
        Self {
            script,
            script_pos: 0,
            frame_period_secs,
            next_fetch: 0,
            voiced: Vec::new(),
            emitted: Vec::new(),
            current_run: None,
        }
    }

    fn close_run(&mut self) {
        let Some((start, len)) = self.current_run.take() else {
            return;
        };
        if len < MIN_RUN_FRAMES {
            return;
        }
        if let Some(&word) = self.script.get(self.script_pos) {
            self.script_pos += 1;
            debug!(word, start, len, "emitting scripted word");
            self.emitted.push(Emission {
                word,
                start_frame: start,
                num_frames: len,
            });
        }
    }

    fn trailing_silence_frames(&self) -> u32 {
        self.voiced.iter().rev().take_while(|&&v| !v).count() as u32
    }

    /// Completed emissions plus, mid-run, a provisional word for the region
    /// still being spoken.
    fn hypotheses(&self) -> Vec<Emission> {
        let mut words = self.emitted.clone();
        if let Some((start, len)) = self.current_run {
            if len >= MIN_RUN_FRAMES {
                if let Some(&word) = self.script.get(self.script_pos) {
                    words.push(Emission {
                        word,
                        start_frame: start,
                        num_frames: len,
                    });
                }
            }
        }
        words
    }

    fn build_lattice(&self, num_frames: u32) -> CompactLattice {
        let words = self.hypotheses();
        if words.is_empty() {
            return CompactLattice::empty();
        }

        // Linear path with epsilon arcs covering the silence gaps so
        // cumulative frame spans line up with the audio.
        let mut triples: Vec<(WordId, LatticeWeight, u32)> = Vec::new();
        let mut covered = 0u32;
        for e in &words {
            if e.start_frame >= num_frames {
                break;
            }
            if e.start_frame > covered {
                triples.push((EPSILON, LatticeWeight::one(), e.start_frame - covered));
            }
            let span = e.num_frames.min(num_frames - e.start_frame);
            triples.push((
                e.word,
                LatticeWeight::new(WORD_GRAPH_COST, WORD_ACOUSTIC_COST),
                span,
            ));
            covered = e.start_frame + span;
        }
        if triples.is_empty() {
            return CompactLattice::empty();
        }
        if num_frames > covered {
            triples.push((EPSILON, LatticeWeight::one(), num_frames - covered));
        }
        CompactLattice::linear(&triples)
    }
}

impl SearchEngine for SimSearchEngine {
    fn advance(&mut self, front: &mut dyn FeatureFrontEnd) -> Result<()> {
        while let Some(frame) = front.frame(self.next_fetch) {
            let energy = frame.first().copied().unwrap_or(0.0);
            self.next_fetch += 1;

            let frame_index = self.voiced.len() as u32;
            let is_voiced = energy >= ENERGY_GATE;
            self.voiced.push(is_voiced);
            trace!(frame = frame_index, energy, is_voiced, "consumed frame");

            if is_voiced {
                match &mut self.current_run {
                    Some((_, len)) => *len += 1,
                    None => self.current_run = Some((frame_index, 1)),
                }
            } else {
                self.close_run();
            }
        }
        Ok(())
    }

    fn frames_decoded(&self) -> u32 {
        self.voiced.len() as u32
    }

    fn frames_in_lattice(&self) -> u32 {
        self.voiced.len() as u32
    }

    fn endpoint_detected(&self, endpoint: &EndpointConfig) -> bool {
        let utterance_secs = self.voiced.len() as f64 * self.frame_period_secs;
        let trailing_secs = f64::from(self.trailing_silence_frames()) * self.frame_period_secs;
        let contains_nonsilence = self.voiced.iter().any(|&v| v);

        endpoint.rules.iter().any(|rule| {
            (contains_nonsilence || !rule.must_contain_nonsilence)
                && trailing_secs >= f64::from(rule.min_trailing_silence_secs)
                && utterance_secs >= f64::from(rule.min_utterance_length_secs)
                && !self.voiced.is_empty()
        })
    }

    fn get_lattice(&mut self, num_frames: u32, _use_final_probs: bool) -> Result<CompactLattice> {
        Ok(self.build_lattice(num_frames))
    }

    fn best_path(&self) -> Result<Lattice> {
        Ok(self.build_lattice(self.voiced.len() as u32).expand())
    }

    fn finalize(&mut self) {
        self.close_run();
    }

    fn reinitialize_at(&mut self, frame_offset: u32) -> Result<()> {
        debug!(frame_offset, "soft recycle — resuming incremental search");
        self.voiced.clear();
        self.emitted.clear();
        self.current_run = None;
        Ok(())
    }

    fn best_traceback(&self) -> Vec<PhoneId> {
        self.voiced
            .iter()
            .map(|&v| if v { VOICED_PHONE } else { SILENCE_PHONE })
            .collect()
    }
}
