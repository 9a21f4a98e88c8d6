//! Result rendering.
//!
//! One formatter per session, locked to an [`OutputMode`] at construction.
//! Finals render as `{"text"}` / `{"alternatives"}` / alternatives-markup
//! XML; partials always render as `{"partial"}` objects. Every mode has a
//! canonical "no hypothesis" shape so callers never see an error for silence.
//!
//! Word timing: `round_start + (frame_offset + frame) * frame_period`, with
//! the frame period equal to the subsampled frame (0.03 s by default).

use serde::Serialize;
use tracing::{error, warn};

use crate::config::OutputMode;
use crate::lattice::{AlignedWord, CompactLattice, Lattice, MbrWord, WordId, EPSILON};
use crate::model::ModelHandle;

/// Timestamp context for one render call, reconstructed by the session from
/// its recycle counters.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub round_start_secs: f64,
    pub frame_offset: u32,
    pub frame_period_secs: f64,
}

impl Timing {
    fn start_of(&self, frame: u32) -> f64 {
        self.round_start_secs + f64::from(self.frame_offset + frame) * self.frame_period_secs
    }

    fn end_of(&self, frame: u32, num_frames: u32) -> f64 {
        self.start_of(frame) + f64::from(num_frames) * self.frame_period_secs
    }
}

#[derive(Debug, Clone, Serialize)]
struct WordEntry {
    word: String,
    start: f64,
    end: f64,
    conf: f64,
}

#[derive(Serialize)]
struct TextResult {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Vec<WordEntry>>,
}

#[derive(Serialize)]
struct AlternativeEntry {
    text: String,
    confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Vec<WordEntry>>,
}

#[derive(Serialize)]
struct AlternativesResult {
    alternatives: Vec<AlternativeEntry>,
}

#[derive(Serialize)]
struct PartialResult {
    partial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_result: Option<Vec<WordEntry>>,
}

pub struct ResultFormatter {
    model: ModelHandle,
    mode: OutputMode,
    partial_word_times: bool,
}

impl ResultFormatter {
    pub fn new(model: ModelHandle, mode: OutputMode, partial_word_times: bool) -> Self {
        Self {
            model,
            mode,
            partial_word_times,
        }
    }

    pub fn render_final(&self, clat: &CompactLattice, timing: &Timing) -> String {
        if clat.is_empty() {
            return self.empty_final();
        }
        match &self.mode {
            OutputMode::BestPath { word_times } => self.render_best(clat, timing, *word_times),
            OutputMode::Nbest {
                max_alternatives,
                word_times,
            } => self.render_nbest(clat, timing, *max_alternatives, *word_times),
            OutputMode::AlternativesXml { max_alternatives } => {
                self.render_xml(clat, timing, *max_alternatives)
            }
        }
    }

    /// In-progress hypothesis. Always the `{"partial"}` shape, regardless of
    /// the final-output mode.
    pub fn render_partial(&self, clat: &CompactLattice, timing: &Timing) -> String {
        if clat.is_empty() {
            return self.empty_partial();
        }
        let words = self.model.algebra().mbr_decode(&self.aligned(clat));
        if words.is_empty() {
            return self.empty_partial();
        }
        let out = PartialResult {
            partial: self.join_text(words.iter().map(|w| w.word)),
            partial_result: self
                .partial_word_times
                .then(|| self.mbr_entries(&words, timing)),
        };
        to_json(&out)
    }

    /// Canonical "no hypothesis" rendering for the active output mode.
    pub fn empty_final(&self) -> String {
        match &self.mode {
            OutputMode::BestPath { .. } => to_json(&TextResult {
                text: String::new(),
                result: None,
            }),
            OutputMode::Nbest { .. } => to_json(&AlternativesResult {
                alternatives: vec![AlternativeEntry {
                    text: String::new(),
                    confidence: 0.0,
                    result: None,
                }],
            }),
            OutputMode::AlternativesXml { .. } => xml_document("  <noinput/>\n"),
        }
    }

    pub fn empty_partial(&self) -> String {
        to_json(&PartialResult {
            partial: String::new(),
            partial_result: None,
        })
    }

    // ── Mode renderers ───────────────────────────────────────────────────

    fn render_best(&self, clat: &CompactLattice, timing: &Timing, word_times: bool) -> String {
        let words = self.model.algebra().mbr_decode(&self.aligned(clat));
        if words.is_empty() {
            return self.empty_final();
        }
        let out = TextResult {
            text: self.join_text(words.iter().map(|w| w.word)),
            result: word_times.then(|| self.mbr_entries(&words, timing)),
        };
        to_json(&out)
    }

    fn render_nbest(
        &self,
        clat: &CompactLattice,
        timing: &Timing,
        max_alternatives: usize,
        word_times: bool,
    ) -> String {
        let alternatives = self.collect_alternatives(clat, timing, max_alternatives, word_times);
        if alternatives.is_empty() {
            return self.empty_final();
        }
        to_json(&AlternativesResult { alternatives })
    }

    fn render_xml(&self, clat: &CompactLattice, timing: &Timing, max_alternatives: usize) -> String {
        let alternatives = self.collect_alternatives(clat, timing, max_alternatives, false);
        if alternatives.is_empty() {
            return xml_document("  <noinput/>\n");
        }

        // Normalise the aggregate log-likelihoods to a posterior over the
        // alternative set.
        let max_ll = alternatives
            .iter()
            .map(|a| a.confidence)
            .fold(f64::NEG_INFINITY, f64::max);
        let denom: f64 = alternatives
            .iter()
            .map(|a| (a.confidence - max_ll).exp())
            .sum();

        let mut body = String::new();
        for alt in &alternatives {
            let posterior = (alt.confidence - max_ll).exp() / denom;
            body.push_str(&format!(
                "  <interpretation confidence=\"{:.3}\">\n    <text>{}</text>\n  </interpretation>\n",
                posterior,
                xml_escape(&alt.text)
            ));
        }
        xml_document(&body)
    }

    fn collect_alternatives(
        &self,
        clat: &CompactLattice,
        timing: &Timing,
        max_alternatives: usize,
        word_times: bool,
    ) -> Vec<AlternativeEntry> {
        let expanded = clat.expand();
        let paths = self
            .model
            .algebra()
            .shortest_paths(&expanded, max_alternatives.max(1));

        let mut alternatives = Vec::with_capacity(paths.len());
        for path in &paths {
            let path_clat = self.aligned(&path.compact());
            match self.model.algebra().linear_alignment(&path_clat) {
                Ok(words) => alternatives.push(AlternativeEntry {
                    text: self.join_text(words.iter().map(|w| w.word)),
                    confidence: -path_cost(path),
                    result: word_times.then(|| self.aligned_entries(&words, timing)),
                }),
                Err(e) => {
                    // One bad alternative must not poison the rest.
                    warn!(error = %e, "word alignment failed for one alternative");
                    alternatives.push(AlternativeEntry {
                        text: String::new(),
                        confidence: 0.0,
                        result: None,
                    });
                }
            }
        }
        alternatives
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// Word-boundary-align when the bundle has the metadata; on failure keep
    /// the unaligned lattice (timing degrades, text does not).
    fn aligned(&self, clat: &CompactLattice) -> CompactLattice {
        let Some(info) = self.model.word_boundary() else {
            return clat.clone();
        };
        match self.model.algebra().word_align(clat, info) {
            Ok(aligned) => aligned,
            Err(e) => {
                warn!(error = %e, "word-boundary alignment failed — using raw spans");
                clat.clone()
            }
        }
    }

    fn join_text(&self, words: impl Iterator<Item = WordId>) -> String {
        let symbols = self.model.symbols();
        words
            .filter(|&w| w != EPSILON)
            .filter_map(|w| symbols.word(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn mbr_entries(&self, words: &[MbrWord], timing: &Timing) -> Vec<WordEntry> {
        let symbols = self.model.symbols();
        words
            .iter()
            .filter(|w| w.word != EPSILON)
            .filter_map(|w| {
                symbols.word(w.word).map(|text| WordEntry {
                    word: text.to_string(),
                    start: timing.start_of(w.start_frame),
                    end: timing.end_of(w.start_frame, w.num_frames),
                    conf: w.confidence,
                })
            })
            .collect()
    }

    fn aligned_entries(&self, words: &[AlignedWord], timing: &Timing) -> Vec<WordEntry> {
        let symbols = self.model.symbols();
        words
            .iter()
            .filter(|w| w.word != EPSILON)
            .filter_map(|w| {
                symbols.word(w.word).map(|text| WordEntry {
                    word: text.to_string(),
                    start: timing.start_of(w.start_frame),
                    end: timing.end_of(w.start_frame, w.num_frames),
                    conf: 1.0,
                })
            })
            .collect()
    }
}

/// Total cost of a linear path lattice, final weights included.
fn path_cost(path: &Lattice) -> f64 {
    let mut cost = 0.0;
    for state in &path.states {
        for arc in &state.arcs {
            cost += arc.weight.total();
        }
        if let Some(final_weight) = &state.final_weight {
            cost += final_weight.total();
        }
    }
    cost
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        // Unreachable for these plain structs; keep the session alive anyway.
        error!(error = %e, "result serialization failed");
        "{}".to_string()
    })
}

fn xml_document(body: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<result>\n{body}</result>\n")
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
