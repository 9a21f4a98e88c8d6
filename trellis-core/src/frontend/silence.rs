//! Silence down-weighting of speaker-adaptation statistics.
//!
//! After each sub-window is pushed and before the decoder advances, frames
//! the decoder currently believes are silence get their adaptation weight
//! dropped to `silence_weight`. Running the pass before `advance()` keeps the
//! weights causally consistent with the frames just pushed.

use std::collections::HashSet;

use tracing::debug;

use crate::frontend::FeatureFrontEnd;
use crate::lattice::PhoneId;
use crate::search::SearchEngine;

#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Weight applied to silence frames in adaptation statistics.
    pub silence_weight: f32,
    /// Phones treated as silence; shared with endpointing.
    pub silence_phones: Vec<PhoneId>,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            silence_weight: 1e-3,
            silence_phones: (1..=10).collect(),
        }
    }
}

/// Stateful per-session adapter. Tracks how many traceback frames have
/// already been weighted so each pass pushes only the delta.
pub struct SilenceWeightAdapter {
    silence_weight: f32,
    silence_phones: HashSet<PhoneId>,
    frames_weighted: u32,
}

impl SilenceWeightAdapter {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            silence_weight: config.silence_weight,
            silence_phones: config.silence_phones.into_iter().collect(),
            frames_weighted: 0,
        }
    }

    /// One weighting pass. No-op when adaptation is disabled or the decoder
    /// has produced no new traceback frames.
    pub fn update(&mut self, search: &dyn SearchEngine, front: &mut dyn FeatureFrontEnd) {
        if !front.has_adaptation_state() {
            return;
        }

        let traceback = search.best_traceback();
        if traceback.len() as u32 <= self.frames_weighted {
            return;
        }

        let deltas: Vec<(u32, f32)> = traceback
            .iter()
            .enumerate()
            .skip(self.frames_weighted as usize)
            .map(|(frame, phone)| {
                let weight = if self.silence_phones.contains(phone) {
                    self.silence_weight
                } else {
                    1.0
                };
                (frame as u32, weight)
            })
            .collect();

        debug!(
            from = self.frames_weighted,
            to = traceback.len(),
            "silence-weight delta"
        );
        self.frames_weighted = traceback.len() as u32;
        front.apply_frame_weights(&deltas);
    }

    /// Forget weighting progress; used when the decoder restarts and its
    /// traceback frame numbering resets.
    pub fn reset(&mut self) {
        self.frames_weighted = 0;
    }
}
