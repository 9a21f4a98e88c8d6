//! Energy-based feature front end for the sim backend.
//!
//! Emits one single-component frame (normalized RMS energy) per 30 ms of
//! audio, matching the default decoded-frame period, and models the
//! adaptation-statistics surface by recording applied frame weights.

use tracing::trace;

use crate::error::{Result, TrellisError};
use crate::frontend::FeatureFrontEnd;

/// Seconds of audio per sim feature frame.
pub const SIM_FRAME_SECS: f64 = 0.03;

pub struct SimFrontEnd {
    sample_rate: u32,
    frame_len: usize,
    pending: Vec<i16>,
    frames: Vec<[f32; 1]>,
    finished: bool,
    adaptation: bool,
    applied_weights: Vec<(u32, f32)>,
}

impl SimFrontEnd {
    pub fn new(sample_rate: u32, adaptation: bool) -> Self {
        let frame_len = ((f64::from(sample_rate) * SIM_FRAME_SECS) as usize).max(1);
        Self {
            sample_rate,
            frame_len,
            pending: Vec::new(),
            frames: Vec::new(),
            finished: false,
            adaptation,
            applied_weights: Vec::new(),
        }
    }

    /// Weights pushed via [`FeatureFrontEnd::apply_frame_weights`], in order.
    pub fn applied_weights(&self) -> &[(u32, f32)] {
        &self.applied_weights
    }

    fn extract_ready(&mut self) {
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let frame = std::mem::replace(&mut self.pending, rest);
            self.frames.push([rms_energy(&frame)]);
        }
    }
}

/// RMS amplitude normalized to `[0, 1]`.
fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    ((sum_sq / samples.len() as f64).sqrt() / f64::from(i16::MAX)) as f32
}

impl FeatureFrontEnd for SimFrontEnd {
    fn push_chunk(&mut self, sample_rate: u32, samples: &[i16]) -> Result<()> {
        if self.finished {
            return Err(TrellisError::Decode(
                "audio pushed after input was finished".into(),
            ));
        }
        if sample_rate != self.sample_rate {
            return Err(TrellisError::Decode(format!(
                "sample rate changed mid-stream: {} then {sample_rate}",
                self.sample_rate
            )));
        }
        self.pending.extend_from_slice(samples);
        self.extract_ready();
        trace!(
            ready = self.frames.len(),
            buffered = self.pending.len(),
            "pushed audio chunk"
        );
        Ok(())
    }

    fn frames_ready(&self) -> u32 {
        self.frames.len() as u32
    }

    fn frame(&self, index: u32) -> Option<&[f32]> {
        self.frames.get(index as usize).map(|f| f.as_slice())
    }

    fn input_finished(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        // Flush the tail as one zero-padded frame.
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.frames.push([rms_energy(&tail)]);
        }
    }

    fn has_adaptation_state(&self) -> bool {
        self.adaptation
    }

    fn apply_frame_weights(&mut self, weights: &[(u32, f32)]) {
        if self.adaptation {
            self.applied_weights.extend_from_slice(weights);
        }
    }
}
