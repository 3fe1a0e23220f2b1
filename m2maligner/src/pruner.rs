//! Pruning and re-weighting of alignment lattices.
//!
//! Implements a cascade of heuristics over a Tropical lattice: arc
//! penalization by subsequence size, forward-backward posterior
//! re-weighting (Sixtus and Ortmanns 1999), beam pruning, and n-best
//! extraction. When only the single best path is wanted the relative
//! heuristics cannot change the argmax and are skipped.

use anyhow::Result;
use fstpath::{log_to_tropical, shortest_path_filtered, tropical_to_log, IdentityFilter, NbestConfig};
use rustfst::algorithms::{push_weights, ReweightType};
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst};
use rustfst::prelude::*;
use rustfst::StateId;

use crate::penalty::PenaltyTable;

/// Clamp for poisoned weights produced during penalization.
const PENALTY_CLAMP: f32 = 999.0;

pub struct Pruner {
    pub penalties: PenaltyTable,
    /// Beam width around the best path; infinite disables beam pruning.
    pub beam: f32,
    pub nbest: usize,
    /// Apply forward-backward posterior re-weighting before pruning.
    pub fb: bool,
    /// Apply subsequence-size arc penalties.
    pub penalize: bool,
}

impl Pruner {
    pub fn new(penalties: PenaltyTable, beam: f32, nbest: usize, fb: bool, penalize: bool) -> Self {
        Self {
            penalties,
            beam,
            nbest,
            fb,
            penalize,
        }
    }

    /// A pruner for arbitrary lattices, with no penalty model.
    pub fn without_penalties(beam: f32, nbest: usize, fb: bool) -> Self {
        Self::new(PenaltyTable::new(), beam, nbest, fb, false)
    }

    pub fn prune(&self, fst: &mut VectorFst<TropicalWeight>) -> Result<()> {
        if self.penalize {
            self.penalize_arcs(fst)?;
        }

        if self.nbest == 1 {
            // Everything below is computed relative to the 1-best
            // hypothesis and cannot change it.
            *fst = self.nbest_prune(fst)?;
            return Ok(());
        }

        if self.fb {
            self.forward_backward(fst)?;
        }
        if self.beam.is_finite() {
            self.beam_prune(fst)?;
        }
        if self.nbest > 1 {
            *fst = self.nbest_prune(fst)?;
        }
        Ok(())
    }

    fn penalize_arcs(&self, fst: &mut VectorFst<TropicalWeight>) -> Result<()> {
        for state in 0..fst.num_states() {
            let mut trs = fst.tr_iter_mut(state as StateId)?;
            for i in 0..trs.len() {
                let (label, weight) = match trs.get(i) {
                    Some(tr) => (tr.ilabel, *tr.weight.value()),
                    None => continue,
                };
                let ld = self.penalties.get(&label).copied().unwrap_or_default();
                let mut new_weight = if ld.lhs > 1 && ld.rhs > 1 {
                    PENALTY_CLAMP
                } else {
                    weight * ld.max as f32
                };
                if new_weight == f32::INFINITY || new_weight.is_nan() {
                    new_weight = PENALTY_CLAMP;
                }
                trs.set_weight(i, TropicalWeight::new(new_weight))?;
            }
        }
        Ok(())
    }

    /// Re-weight every arc by its posterior probability in the Log
    /// semiring, after pushing weights to the final state and normalizing
    /// final weights to one.
    fn forward_backward(&self, fst: &mut VectorFst<TropicalWeight>) -> Result<()> {
        let mut lfst = tropical_to_log(fst)?;
        if lfst.num_states() == 0 {
            return Ok(());
        }
        push_weights(&mut lfst, ReweightType::ReweightToFinal)?;
        for state in 0..lfst.num_states() {
            let state = state as StateId;
            if lfst.final_weight(state)?.is_some() {
                lfst.set_final(state, LogWeight::one())?;
            }
        }

        let start = match lfst.start() {
            Some(s) => s,
            None => return Ok(()),
        };
        let alpha = shortest_distance(&lfst, false)?;
        let beta = shortest_distance(&lfst, true)?;
        let b0 = match beta.get(start as usize) {
            Some(b) if *b != LogWeight::zero() => b.clone(),
            _ => return Ok(()),
        };

        for state in 0..lfst.num_states() {
            let state = state as StateId;
            let a = match alpha.get(state as usize) {
                Some(a) => a.clone(),
                None => continue,
            };
            let mut trs = lfst.tr_iter_mut(state)?;
            for i in 0..trs.len() {
                let (weight, nextstate) = match trs.get(i) {
                    Some(tr) => (tr.weight.clone(), tr.nextstate),
                    None => continue,
                };
                let b = match beta.get(nextstate as usize) {
                    Some(b) => b,
                    None => continue,
                };
                let gamma = a
                    .times(&weight)?
                    .times(b)?
                    .divide(&b0, DivideType::DivideAny)?;
                if !gamma.value().is_nan() {
                    trs.set_weight(i, gamma)?;
                }
            }
        }

        *fst = log_to_tropical(&lfst)?;
        Ok(())
    }

    /// Drop every arc and final weight lying more than `beam` outside the
    /// best path.
    fn beam_prune(&self, fst: &mut VectorFst<TropicalWeight>) -> Result<()> {
        let start = match fst.start() {
            Some(s) => s,
            None => return Ok(()),
        };
        let alpha = shortest_distance(fst, false)?;
        let beta = shortest_distance(fst, true)?;
        let best = match beta.get(start as usize) {
            Some(b) if *b != TropicalWeight::zero() => *b.value(),
            _ => return Ok(()),
        };
        let limit = best + self.beam;

        let mut pruned = VectorFst::<TropicalWeight>::new();
        for _ in 0..fst.num_states() {
            pruned.add_state();
        }
        pruned.set_start(start)?;
        for state in fst.states_iter() {
            let a = match alpha.get(state as usize) {
                Some(a) => *a.value(),
                None => continue,
            };
            if let Some(fw) = fst.final_weight(state)? {
                if a + fw.value() <= limit {
                    pruned.set_final(state, fw)?;
                }
            }
            for tr in fst.get_trs(state)?.iter() {
                let b = match beta.get(tr.nextstate as usize) {
                    Some(b) => *b.value(),
                    None => continue,
                };
                if a + tr.weight.value() + b <= limit {
                    pruned.add_tr(state, tr.clone())?;
                }
            }
        }
        connect(&mut pruned)?;
        *fst = pruned;
        Ok(())
    }

    /// Replace the lattice by the tree of its n shortest paths.
    fn nbest_prune(&self, fst: &VectorFst<TropicalWeight>) -> Result<VectorFst<TropicalWeight>> {
        let config = NbestConfig {
            nbest: self.nbest,
            beam: usize::MAX,
            threshold: f32::INFINITY,
            accumulate: false,
            unique: false,
        };
        let (_, tree) = shortest_path_filtered(fst, &IdentityFilter, &config)?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::penalty::LabelPenalty;

    /// Two paths: labels [3, 4] at weight 2.3 and [5, 4] at weight 3.1.
    fn two_path_lattice() -> VectorFst<TropicalWeight> {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        fst.set_start(s0).unwrap();
        fst.set_final(s2, TropicalWeight::one()).unwrap();
        fst.add_tr(s0, Tr::new(3, 3, TropicalWeight::new(2.0), s1))
            .unwrap();
        fst.add_tr(s0, Tr::new(5, 5, TropicalWeight::new(2.8), s1))
            .unwrap();
        fst.add_tr(s1, Tr::new(4, 4, TropicalWeight::new(0.3), s2))
            .unwrap();
        fst
    }

    fn best_paths(fst: &VectorFst<TropicalWeight>, n: usize) -> Vec<(Vec<u32>, f32)> {
        let config = NbestConfig {
            nbest: n,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(fst, &IdentityFilter, &config).unwrap();
        paths
            .iter_ordered()
            .map(|p| (p.uniques.clone(), p.path_weight))
            .collect()
    }

    #[test]
    fn test_nbest_one_keeps_only_the_spine() {
        let mut fst = two_path_lattice();
        let original_states = fst.num_states();
        let pruner = Pruner::without_penalties(f32::INFINITY, 1, false);
        pruner.prune(&mut fst).unwrap();

        let paths = best_paths(&fst, 5);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0, vec![3, 4]);
        assert!((paths[0].1 - 2.3).abs() < 1e-5);
        assert!(fst.num_states() > 0);
        assert!(fst.num_states() <= original_states + 2);
    }

    #[test]
    fn test_beam_prune_drops_distant_path() {
        let mut fst = two_path_lattice();
        let pruner = Pruner::without_penalties(0.5, 5, false);
        pruner.prune(&mut fst).unwrap();

        let paths = best_paths(&fst, 5);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0, vec![3, 4]);
    }

    #[test]
    fn test_beam_prune_keeps_close_path() {
        let mut fst = two_path_lattice();
        let pruner = Pruner::without_penalties(2.0, 5, false);
        pruner.prune(&mut fst).unwrap();
        assert_eq!(best_paths(&fst, 5).len(), 2);
    }

    #[test]
    fn test_forward_backward_normalizes_outgoing_mass() {
        let mut fst = two_path_lattice();
        let pruner = Pruner::without_penalties(f32::INFINITY, 5, true);
        pruner.prune(&mut fst).unwrap();

        // Posterior weights: the two arcs leaving the start state carry the
        // whole probability mass between them.
        let start = fst.start().unwrap();
        let mass: f32 = fst
            .get_trs(start)
            .unwrap()
            .iter()
            .map(|tr| (-tr.weight.value()).exp())
            .sum();
        assert!((mass - 1.0).abs() < 1e-3, "outgoing mass was {}", mass);
    }

    #[test]
    fn test_penalize_arcs() {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0).unwrap();
        fst.set_final(s1, TropicalWeight::one()).unwrap();
        fst.add_tr(s0, Tr::new(3, 3, TropicalWeight::new(1.5), s1))
            .unwrap();
        fst.add_tr(s0, Tr::new(4, 4, TropicalWeight::new(1.5), s1))
            .unwrap();

        let mut penalties = PenaltyTable::new();
        penalties.insert(3, LabelPenalty::new(2, 2, false, false));
        penalties.insert(4, LabelPenalty::new(2, 1, false, false));
        let pruner = Pruner::new(penalties, f32::INFINITY, 5, false, true);
        pruner.penalize_arcs(&mut fst).unwrap();

        let trs = fst.get_trs(s0).unwrap();
        let mut weights: Vec<(u32, f32)> =
            trs.iter().map(|tr| (tr.ilabel, *tr.weight.value())).collect();
        weights.sort_by_key(|(l, _)| *l);
        // 2x2 links get the flat penalty; others scale by max side length.
        assert!((weights[0].1 - 999.0).abs() < 1e-6);
        assert!((weights[1].1 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nbest_two_keeps_both_paths_in_order() {
        let mut fst = two_path_lattice();
        let pruner = Pruner::without_penalties(f32::INFINITY, 2, false);
        pruner.prune(&mut fst).unwrap();
        let paths = best_paths(&fst, 5);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].0, vec![3, 4]);
        assert_eq!(paths[1].0, vec![5, 4]);
        assert!(paths[0].1 < paths[1].1);
    }
}
