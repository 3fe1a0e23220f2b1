//! Filtered n-shortest-path extraction.
//!
//! The standard n-shortest-path algorithm enumerates paths over the reversed
//! lattice, best-first. This variant hands every completed path to a
//! [`PathFilter`](crate::filter::PathFilter) and counts a hypothesis only if
//! its canonical uniques vector has not been seen before, so the n returned
//! paths are the n best *distinct* hypotheses. Tied variants are either
//! discarded or log-added into the winning path. Avoiding determinization
//! here keeps n-gram weights exactly where the model put them.

use std::collections::BinaryHeap;

use anyhow::Result;
use rustfst::algorithms::reverse;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst};
use rustfst::prelude::*;
use rustfst::StateId;

use crate::filter::{PathFilter, PathSet};
use crate::path::PathData;

/// Knobs for one n-best extraction.
#[derive(Debug, Clone)]
pub struct NbestConfig {
    /// Number of distinct hypotheses to collect.
    pub nbest: usize,
    /// Per-state visit bound on the path enumeration.
    pub beam: usize,
    /// Admissible weight margin relative to the 1-best path.
    pub threshold: f32,
    /// Log-add tied variants into the winning path instead of discarding.
    pub accumulate: bool,
    /// When false, skip deduplication: plain n-shortest paths.
    pub unique: bool,
}

impl Default for NbestConfig {
    fn default() -> Self {
        Self {
            nbest: 1,
            beam: 10_000,
            threshold: 99.0,
            accumulate: false,
            unique: true,
        }
    }
}

/// Heap entry ordered so the smallest tropical priority pops first; ties
/// break on creation order, which makes the enumeration deterministic.
#[derive(Debug)]
struct HeapEntry {
    priority: f32,
    state: StateId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.state == other.state
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.state.cmp(&self.state))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A state of the path tree: the reversed-lattice state still to be expanded
/// (None once the path has consumed the whole lattice) and the weight
/// accumulated so far.
type Pair = (Option<StateId>, TropicalWeight);

fn remaining(pair_state: Option<StateId>, distance: &[TropicalWeight]) -> f32 {
    match pair_state {
        None => 0.0,
        Some(s) => match distance.get(s as usize) {
            Some(w) => *w.value(),
            None => f32::INFINITY,
        },
    }
}

/// Extract up to `nbest` filter-distinct paths from `ifst` (Tropical).
///
/// Returns the collected paths and the connected tree of enumerated winning
/// paths, which doubles as the n-best-pruned version of the input lattice.
pub fn shortest_path_filtered<F: PathFilter>(
    ifst: &VectorFst<TropicalWeight>,
    filter: &F,
    config: &NbestConfig,
) -> Result<(PathSet, VectorFst<TropicalWeight>)> {
    let mut paths = PathSet::new();
    let mut ofst = VectorFst::<TropicalWeight>::new();

    if config.nbest == 0 || config.threshold < 0.0 {
        return Ok((paths, ofst));
    }
    let start = match ifst.start() {
        Some(s) => s,
        None => return Ok((paths, ofst)),
    };
    let mut distance = shortest_distance(ifst, false)?;
    if start as usize >= distance.len() || distance[start as usize] == TropicalWeight::zero() {
        return Ok((paths, ofst));
    }

    // The algorithm walks the reversed lattice; state s+1 there is state s
    // here, and state 0 is the new superinitial. Prepending the total best
    // weight lines `distance` up with the reversed state ids.
    let rfst: VectorFst<TropicalWeight> = reverse(ifst)?;
    let rstart = match rfst.start() {
        Some(s) => s,
        None => return Ok((paths, ofst)),
    };
    let mut total = TropicalWeight::zero();
    for tr in rfst.get_trs(rstart)?.iter() {
        if tr.nextstate >= 1 {
            if let Some(d) = distance.get((tr.nextstate - 1) as usize) {
                total = total.plus(tr.weight.times(d)?)?;
            }
        }
    }
    distance.insert(0, total);

    let limit = *distance[rstart as usize].value() + config.threshold;

    ofst.add_state();
    ofst.set_start(0)?;
    let tree_final = ofst.add_state();
    ofst.set_final(tree_final, TropicalWeight::one())?;

    let mut pairs: Vec<Pair> = vec![
        (None, TropicalWeight::zero()),
        (Some(rstart), TropicalWeight::one()),
    ];
    let mut visits: Vec<usize> = Vec::new();
    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry {
        priority: remaining(Some(rstart), &distance) + *TropicalWeight::one().value(),
        state: tree_final,
    });

    while let Some(entry) = heap.pop() {
        let state = entry.state;
        let (pair_state, pair_weight) = pairs[state as usize].clone();
        let d = remaining(pair_state, &distance);

        if limit < d + *pair_weight.value() {
            continue;
        }

        let visit_idx = match pair_state {
            None => 0,
            Some(s) => s as usize + 1,
        };
        if visits.len() <= visit_idx {
            visits.resize(visit_idx + 1, 0);
        }
        visits[visit_idx] += 1;

        if pair_state.is_none() {
            // Completed path: hook it to the tree root and read it off in
            // forward order through the filter.
            ofst.add_tr(0, Tr::new(0, 0, TropicalWeight::one(), state))?;
            let mut path = PathData::default();
            let mut tstate = state;
            while ofst.final_weight(tstate)?.is_none() {
                for tr in ofst.get_trs(tstate)?.iter() {
                    tstate = tr.nextstate;
                    filter.extend(&mut path, tr);
                }
            }

            let is_new = !config.unique || !paths.contains(&path.uniques);
            if is_new {
                if paths.len() < config.nbest {
                    paths.insert(path);
                }
                // With accumulation on, keep enumerating so that tied
                // variants found later still fold into the winners.
                if paths.len() >= config.nbest && !(config.unique && config.accumulate) {
                    break;
                }
            } else if config.accumulate {
                paths.accumulate(&path)?;
            }
        }

        if pair_state.is_none() && visits[0] == config.beam {
            break;
        }
        if visits[visit_idx] > config.beam {
            continue;
        }
        let expand_state = match pair_state {
            None => continue,
            Some(s) => s,
        };

        for tr in rfst.get_trs(expand_state)?.iter() {
            let w = pair_weight.times(&tr.weight)?;
            let next = ofst.add_state();
            pairs.push((Some(tr.nextstate), w.clone()));
            ofst.add_tr(next, Tr::new(tr.ilabel, tr.olabel, tr.weight.clone(), state))?;
            heap.push(HeapEntry {
                priority: remaining(Some(tr.nextstate), &distance) + *w.value(),
                state: next,
            });
        }

        if let Some(final_weight) = rfst.final_weight(expand_state)? {
            if final_weight != TropicalWeight::zero() {
                let w = pair_weight.times(&final_weight)?;
                let next = ofst.add_state();
                pairs.push((None, w.clone()));
                ofst.add_tr(next, Tr::new(0, 0, final_weight, state))?;
                heap.push(HeapEntry {
                    priority: *w.value(),
                    state: next,
                });
            }
        }
    }

    connect(&mut ofst)?;
    Ok((paths, ofst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::IdentityFilter;

    /// Two distinct paths: [3 4] at weight 1.5 and [5 4] at weight 2.5.
    fn two_path_lattice() -> VectorFst<TropicalWeight> {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0).unwrap();
        fst.set_final(s2, TropicalWeight::one()).unwrap();
        fst.add_tr(s0, Tr::new(3, 3, TropicalWeight::new(1.0), s1))
            .unwrap();
        fst.add_tr(s0, Tr::new(5, 5, TropicalWeight::new(2.0), s1))
            .unwrap();
        fst.add_tr(s1, Tr::new(4, 4, TropicalWeight::new(0.5), s2))
            .unwrap();
        fst
    }

    #[test]
    fn test_two_paths_in_weight_order() {
        let fst = two_path_lattice();
        let config = NbestConfig {
            nbest: 2,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert_eq!(paths.len(), 2);
        let collected: Vec<_> = paths.iter_ordered().collect();
        assert_eq!(collected[0].uniques, vec![3, 4]);
        assert!((collected[0].path_weight - 1.5).abs() < 1e-5);
        assert_eq!(collected[1].uniques, vec![5, 4]);
        assert!((collected[1].path_weight - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_nbest_zero_returns_nothing() {
        let fst = two_path_lattice();
        let config = NbestConfig {
            nbest: 0,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_empty_fst_returns_nothing() {
        let fst = VectorFst::<TropicalWeight>::new();
        let (paths, _) =
            shortest_path_filtered(&fst, &IdentityFilter, &NbestConfig::default()).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_threshold_is_relative_to_best() {
        let fst = two_path_lattice();
        let config = NbestConfig {
            nbest: 2,
            threshold: 0.5,
            ..Default::default()
        };
        // Second-best is 1.0 worse than the 1-best, outside the margin.
        let (paths, _) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths.iter_ordered().next().unwrap().uniques, vec![3, 4]);
    }

    /// Two parallel arcs with the same label, so the two paths are tied
    /// variants of the same hypothesis.
    fn tied_lattice() -> VectorFst<TropicalWeight> {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0).unwrap();
        fst.set_final(s2, TropicalWeight::one()).unwrap();
        fst.add_tr(s0, Tr::new(3, 3, TropicalWeight::new(1.0), s1))
            .unwrap();
        fst.add_tr(s0, Tr::new(3, 3, TropicalWeight::new(2.0), s1))
            .unwrap();
        fst.add_tr(s1, Tr::new(4, 4, TropicalWeight::one(), s2))
            .unwrap();
        fst
    }

    #[test]
    fn test_tied_variants_collapse() {
        let fst = tied_lattice();
        let config = NbestConfig {
            nbest: 2,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert_eq!(paths.len(), 1);
        let best = paths.iter_ordered().next().unwrap();
        assert_eq!(best.uniques, vec![3, 4]);
        assert!((best.path_weight - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_tied_variants_accumulate() {
        let fst = tied_lattice();
        let config = NbestConfig {
            nbest: 2,
            accumulate: true,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert_eq!(paths.len(), 1);
        let best = paths.iter_ordered().next().unwrap();
        // -ln(e^-1 + e^-2)
        assert!((best.path_weight - 0.68673).abs() < 1e-4);
    }

    #[test]
    fn test_accumulate_with_nbest_one() {
        let fst = tied_lattice();
        let config = NbestConfig {
            nbest: 1,
            accumulate: true,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert_eq!(paths.len(), 1);
        // The tied variant found after the winner still folds in.
        let best = paths.iter_ordered().next().unwrap();
        assert!((best.path_weight - 0.68673).abs() < 1e-4);
    }

    #[test]
    fn test_plain_mode_keeps_duplicates() {
        let fst = tied_lattice();
        let config = NbestConfig {
            nbest: 2,
            unique: false,
            ..Default::default()
        };
        let (paths, tree) = shortest_path_filtered(&fst, &IdentityFilter, &config).unwrap();
        assert_eq!(paths.len(), 2);
        // The returned tree holds both enumerated paths.
        assert!(tree.num_states() > 0);
        let start = tree.start().unwrap();
        assert_eq!(tree.get_trs(start).unwrap().iter().count(), 2);
    }
}
