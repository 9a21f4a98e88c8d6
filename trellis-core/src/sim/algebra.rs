//! Path-enumeration lattice algebra for the sim backend.
//!
//! Every operation works by enumerating complete paths (bounded by
//! [`MAX_PATHS`]) and rebuilding a lattice from the surviving set. That is
//! hopeless for production-sized lattices and exactly right for the small
//! ones the sim decoder emits: the semantics of each primitive stay easy to
//! verify against by hand.

use std::collections::HashMap;

use crate::error::{Result, TrellisError};
use crate::lattice::algebra::{BlendedLm, LatticeAlgebra};
use crate::lattice::{
    AlignedWord, CompactLattice, Lattice, LatticeArc, LatticeWeight, MbrWord, StateId, WordId,
    EPSILON,
};
use crate::lm::LanguageModel;
use crate::model::WordBoundaryInfo;

/// Enumeration cap; lattices with more complete paths are truncated.
const MAX_PATHS: usize = 4_096;

#[derive(Debug, Clone)]
struct PathArc {
    word: WordId,
    weight: LatticeWeight,
    num_frames: u32,
}

#[derive(Debug, Clone)]
struct SimPath {
    arcs: Vec<PathArc>,
    final_weight: LatticeWeight,
}

impl SimPath {
    fn total(&self) -> f64 {
        self.arcs.iter().map(|a| a.weight.total()).sum::<f64>() + self.final_weight.total()
    }

    /// Non-epsilon words with their cumulative frame spans.
    fn words(&self) -> Vec<(WordId, u32, u32)> {
        let mut out = Vec::new();
        let mut frame = 0u32;
        for arc in &self.arcs {
            if arc.word != EPSILON {
                out.push((arc.word, frame, arc.num_frames));
            }
            frame += arc.num_frames;
        }
        out
    }

    fn word_key(&self) -> Vec<WordId> {
        self.arcs
            .iter()
            .filter(|a| a.word != EPSILON)
            .map(|a| a.word)
            .collect()
    }
}

fn enumerate(lat: &Lattice) -> Vec<SimPath> {
    let Some(start) = lat.start else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    let mut prefix = Vec::new();
    walk(lat, start, &mut prefix, &mut paths);
    paths
}

fn walk(lat: &Lattice, state: StateId, prefix: &mut Vec<PathArc>, out: &mut Vec<SimPath>) {
    if out.len() >= MAX_PATHS || prefix.len() > lat.num_states() {
        return;
    }
    let Some(node) = lat.states.get(state) else {
        return;
    };
    if let Some(final_weight) = node.final_weight {
        out.push(SimPath {
            arcs: prefix.clone(),
            final_weight,
        });
    }
    for arc in &node.arcs {
        prefix.push(PathArc {
            word: arc.word,
            weight: arc.weight,
            num_frames: arc.num_frames,
        });
        walk(lat, arc.next, prefix, out);
        prefix.pop();
    }
}

/// Rebuild a lattice as chains sharing one start state.
fn union_of_paths(paths: &[SimPath]) -> Lattice {
    if paths.is_empty() {
        return Lattice::empty();
    }
    let mut lat = Lattice::empty();
    let start = lat.add_state();
    lat.start = Some(start);
    for path in paths {
        let mut cur = start;
        for arc in &path.arcs {
            let next = lat.add_state();
            lat.add_arc(
                cur,
                LatticeArc {
                    word: arc.word,
                    weight: arc.weight,
                    num_frames: arc.num_frames,
                    next,
                },
            );
            cur = next;
        }
        lat.set_final(cur, path.final_weight);
    }
    lat
}

/// Add the LM's cost to every word arc, threading the path context.
fn compose_paths(mut paths: Vec<SimPath>, lm: &dyn LanguageModel) -> Vec<SimPath> {
    for path in &mut paths {
        let mut context: Vec<WordId> = Vec::new();
        for arc in &mut path.arcs {
            if arc.word != EPSILON {
                arc.weight.graph += lm.word_cost(&context, arc.word);
                context.push(arc.word);
            }
        }
        path.final_weight.graph += lm.final_cost(&context);
    }
    paths
}

fn sort_by_total(paths: &mut [SimPath]) {
    paths.sort_by(|a, b| a.total().partial_cmp(&b.total()).unwrap_or(std::cmp::Ordering::Equal));
}

#[derive(Debug, Default)]
pub struct SimAlgebra;

impl LatticeAlgebra for SimAlgebra {
    fn scale(&self, lat: &mut Lattice, factor: f64) {
        for state in &mut lat.states {
            for arc in &mut state.arcs {
                arc.weight = arc.weight.scaled(factor);
            }
            if let Some(final_weight) = &mut state.final_weight {
                *final_weight = final_weight.scaled(factor);
            }
        }
    }

    fn scale_graph(&self, clat: &mut CompactLattice, graph_scale: f64) {
        for state in &mut clat.states {
            for arc in &mut state.arcs {
                arc.weight.graph *= graph_scale;
            }
            if let Some(final_weight) = &mut state.final_weight {
                final_weight.graph *= graph_scale;
            }
        }
    }

    fn compose_graph_lm(&self, lat: &Lattice, lm: &dyn LanguageModel) -> Lattice {
        union_of_paths(&compose_paths(enumerate(lat), lm))
    }

    /// Single-tape word acceptor: nothing to swap.
    fn invert(&self, _lat: &mut Lattice) {}

    fn determinize(&self, lat: Lattice) -> Result<Lattice> {
        let paths = enumerate(&lat);
        let mut best: HashMap<Vec<WordId>, SimPath> = HashMap::new();
        for path in paths {
            let key = path.word_key();
            match best.get(&key) {
                Some(kept) if kept.total() <= path.total() => {}
                _ => {
                    best.insert(key, path);
                }
            }
        }
        let mut kept: Vec<SimPath> = best.into_values().collect();
        sort_by_total(&mut kept);
        Ok(union_of_paths(&kept))
    }

    fn top_sort(&self, lat: &mut Lattice) -> bool {
        let Some(start) = lat.start else {
            return true;
        };

        // DFS with postorder; a back edge means a cycle.
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }
        let mut color = vec![Color::White; lat.num_states()];
        let mut postorder: Vec<StateId> = Vec::new();
        let mut stack: Vec<(StateId, usize)> = vec![(start, 0)];
        color[start] = Color::Grey;

        loop {
            let Some(top) = stack.last_mut() else { break };
            let (state, arc_index) = (top.0, top.1);
            top.1 += 1;
            match lat.states[state].arcs.get(arc_index) {
                Some(arc) => match color[arc.next] {
                    Color::Grey => return false,
                    Color::White => {
                        color[arc.next] = Color::Grey;
                        stack.push((arc.next, 0));
                    }
                    Color::Black => {}
                },
                None => {
                    color[state] = Color::Black;
                    postorder.push(state);
                    stack.pop();
                }
            }
        }

        // Reverse postorder is a topological order of the reachable states;
        // unreachable ones are dropped.
        let order: Vec<StateId> = postorder.into_iter().rev().collect();
        let mut remap: HashMap<StateId, StateId> = HashMap::new();
        for (new_id, &old_id) in order.iter().enumerate() {
            remap.insert(old_id, new_id);
        }

        let mut states = Vec::with_capacity(order.len());
        for &old_id in &order {
            let mut node = lat.states[old_id].clone();
            for arc in &mut node.arcs {
                arc.next = remap[&arc.next];
            }
            states.push(node);
        }
        lat.states = states;
        lat.start = Some(0);
        true
    }

    fn compose_deterministic(&self, lat: &Lattice, lm: &dyn LanguageModel) -> Lattice {
        union_of_paths(&compose_paths(enumerate(lat), lm))
    }

    fn compose_pruned(
        &self,
        clat: &CompactLattice,
        blend: &BlendedLm<'_>,
        beam: f64,
        max_arcs: usize,
    ) -> CompactLattice {
        let mut paths = enumerate(&clat.expand());
        for path in &mut paths {
            let mut context: Vec<WordId> = Vec::new();
            for arc in &mut path.arcs {
                if arc.word != EPSILON {
                    arc.weight.graph += blend.word_cost(&context, arc.word);
                    context.push(arc.word);
                }
            }
        }
        sort_by_total(&mut paths);

        let Some(best) = paths.first().map(SimPath::total) else {
            return CompactLattice::empty();
        };
        let mut kept: Vec<SimPath> = Vec::new();
        let mut arcs_used = 0usize;
        for path in paths {
            if path.total() > best + beam {
                break;
            }
            if arcs_used + path.arcs.len() > max_arcs {
                break;
            }
            arcs_used += path.arcs.len();
            kept.push(path);
        }
        union_of_paths(&kept).compact()
    }

    fn shortest_paths(&self, lat: &Lattice, n: usize) -> Vec<Lattice> {
        let mut paths = enumerate(lat);
        sort_by_total(&mut paths);
        paths.truncate(n);
        paths
            .into_iter()
            .map(|p| union_of_paths(std::slice::from_ref(&p)))
            .collect()
    }

    /// The sim decoder already emits word-aligned frame spans.
    fn word_align(
        &self,
        clat: &CompactLattice,
        _info: &WordBoundaryInfo,
    ) -> Result<CompactLattice> {
        Ok(clat.clone())
    }

    fn mbr_decode(&self, clat: &CompactLattice) -> Vec<MbrWord> {
        let mut paths = enumerate(&clat.expand());
        if paths.is_empty() {
            return Vec::new();
        }
        sort_by_total(&mut paths);

        let min = paths[0].total();
        let masses: Vec<f64> = paths.iter().map(|p| (-(p.total() - min)).exp()).collect();
        let z: f64 = masses.iter().sum();

        let best_words = paths[0].words();
        let others: Vec<Vec<(WordId, u32, u32)>> = paths.iter().map(SimPath::words).collect();

        best_words
            .into_iter()
            .enumerate()
            .map(|(position, (word, start_frame, num_frames))| {
                // Posterior of this word appearing at this sequence position.
                let mass: f64 = others
                    .iter()
                    .zip(&masses)
                    .filter(|(words, _)| words.get(position).is_some_and(|&(w, _, _)| w == word))
                    .map(|(_, &m)| m)
                    .sum();
                MbrWord {
                    word,
                    confidence: mass / z,
                    start_frame,
                    num_frames,
                }
            })
            .collect()
    }

    fn linear_alignment(&self, clat: &CompactLattice) -> Result<Vec<AlignedWord>> {
        let Some(mut cur) = clat.start else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut frame = 0u32;
        let mut steps = 0usize;

        loop {
            let Some(state) = clat.states.get(cur) else {
                return Err(TrellisError::NonLinearLattice);
            };
            match state.arcs.as_slice() {
                [] => {
                    return if state.final_weight.is_some() {
                        Ok(out)
                    } else {
                        Err(TrellisError::NonLinearLattice)
                    };
                }
                [arc] => {
                    if arc.word != EPSILON {
                        out.push(AlignedWord {
                            word: arc.word,
                            start_frame: frame,
                            num_frames: arc.num_frames,
                        });
                    }
                    frame += arc.num_frames;
                    cur = arc.next;
                    steps += 1;
                    if steps > clat.num_states() {
                        return Err(TrellisError::NonLinearLattice);
                    }
                }
                _ => return Err(TrellisError::NonLinearLattice),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimLm;

    fn w(graph: f64, acoustic: f64) -> LatticeWeight {
        LatticeWeight::new(graph, acoustic)
    }

    fn branching_lattice() -> Lattice {
        // start ─1/cheap─▶ end, start ─2/expensive─▶ end
        let mut lat = Lattice::empty();
        let s0 = lat.add_state();
        let s1 = lat.add_state();
        lat.start = Some(s0);
        lat.set_final(s1, LatticeWeight::one());
        lat.add_arc(s0, LatticeArc { word: 1, weight: w(1.0, 0.0), num_frames: 5, next: s1 });
        lat.add_arc(s0, LatticeArc { word: 2, weight: w(3.0, 0.0), num_frames: 5, next: s1 });
        lat
    }

    #[test]
    fn compose_threads_path_context() {
        struct ContextLm;
        impl LanguageModel for ContextLm {
            fn word_cost(&self, context: &[WordId], _word: WordId) -> f64 {
                context.len() as f64
            }
        }

        let alg = SimAlgebra;
        let lat = Lattice::linear(&[(1, w(0.0, 0.0), 1), (2, w(0.0, 0.0), 1), (3, w(0.0, 0.0), 1)]);
        let out = alg.compose_graph_lm(&lat, &ContextLm);
        let graphs: Vec<f64> = out
            .states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .map(|a| a.weight.graph)
            .collect();
        assert_eq!(graphs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn determinize_keeps_cheapest_duplicate() {
        let mut lat = branching_lattice();
        // duplicate word sequence "1" with a worse score
        let s0 = 0;
        let s2 = lat.add_state();
        lat.set_final(s2, LatticeWeight::one());
        lat.add_arc(s0, LatticeArc { word: 1, weight: w(9.0, 0.0), num_frames: 5, next: s2 });

        let alg = SimAlgebra;
        let det = alg.determinize(lat).unwrap();
        let paths = enumerate(&det);
        assert_eq!(paths.len(), 2);
        let cheap = paths.iter().find(|p| p.word_key() == vec![1]).unwrap();
        assert!((cheap.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn top_sort_rejects_cycles_and_orders_the_rest() {
        let alg = SimAlgebra;

        let mut cyclic = Lattice::empty();
        let s0 = cyclic.add_state();
        let s1 = cyclic.add_state();
        cyclic.start = Some(s0);
        cyclic.set_final(s1, LatticeWeight::one());
        cyclic.add_arc(s0, LatticeArc { word: 1, weight: w(0.0, 0.0), num_frames: 1, next: s1 });
        cyclic.add_arc(s1, LatticeArc { word: 2, weight: w(0.0, 0.0), num_frames: 1, next: s0 });
        assert!(!alg.top_sort(&mut cyclic));

        // backwards ids: start at 1, final at 0
        let mut rev = Lattice::empty();
        let f = rev.add_state();
        let s = rev.add_state();
        rev.start = Some(s);
        rev.set_final(f, LatticeWeight::one());
        rev.add_arc(s, LatticeArc { word: 3, weight: w(0.0, 0.0), num_frames: 1, next: f });
        assert!(alg.top_sort(&mut rev));
        assert_eq!(rev.start, Some(0));
        assert_eq!(rev.states[0].arcs[0].next, 1);
    }

    #[test]
    fn shortest_paths_come_back_best_first() {
        let alg = SimAlgebra;
        let paths = alg.shortest_paths(&branching_lattice(), 5);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].states[0].arcs[0].word, 1);
        assert_eq!(paths[1].states[0].arcs[0].word, 2);
    }

    #[test]
    fn mbr_single_path_has_full_confidence() {
        let alg = SimAlgebra;
        let clat = CompactLattice::linear(&[(1, w(1.0, 1.0), 4), (2, w(1.0, 1.0), 6)]);
        let words = alg.mbr_decode(&clat);
        assert_eq!(words.len(), 2);
        approx::assert_relative_eq!(words[0].confidence, 1.0);
        assert_eq!(words[1].start_frame, 4);
        assert_eq!(words[1].num_frames, 6);
    }

    #[test]
    fn mbr_confidence_splits_across_competing_words() {
        let alg = SimAlgebra;
        let clat = branching_lattice().compact();
        let words = alg.mbr_decode(&clat);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, 1);
        // two paths, costs 1 and 3: posterior of the best is 1/(1+e^-2)
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        approx::assert_relative_eq!(words[0].confidence, expected, max_relative = 1e-9);
    }

    #[test]
    fn linear_alignment_rejects_branches_and_skips_epsilon() {
        let alg = SimAlgebra;
        assert!(matches!(
            alg.linear_alignment(&branching_lattice().compact()),
            Err(TrellisError::NonLinearLattice)
        ));

        let clat = CompactLattice::linear(&[
            (EPSILON, LatticeWeight::one(), 3),
            (7, w(1.0, 2.0), 5),
        ]);
        let words = alg.linear_alignment(&clat).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].start_frame, 3);
    }

    #[test]
    fn pruned_composition_respects_beam() {
        let alg = SimAlgebra;
        let subtract = SimLm::uniform(0.0);
        let add = crate::sim::SimNeuralLm::new(SimLm::uniform(0.0));
        let blend = BlendedLm {
            subtract: &subtract,
            add: &add,
            subtract_scale: 0.5,
            add_scale: 0.5,
        };

        let clat = branching_lattice().compact();
        // beam 1.0: only the cost-1 path survives (cost-3 path is 2.0 worse)
        let pruned = alg.compose_pruned(&clat, &blend, 1.0, 1_000);
        let paths = enumerate(&pruned.expand());
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].word_key(), vec![1]);
    }
}
