//! Expectation-maximization over the full set of alignment lattices.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use colored::Colorize;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst};
use rustfst::prelude::*;
use rustfst::{Label, StateId};

use crate::lattice;
use crate::penalty::{LabelPenalty, PenaltyTable};

/// Clamp for numerically poisoned arc weights (NaN or LogZero); keeps
/// downstream shortest-distance well-defined.
const POISON_WEIGHT: f32 = 99.0;

/// Training parameters, passed explicitly instead of living in module-scope
/// flags.
#[derive(Debug, Clone)]
pub struct AlignerConfig {
    /// Allow null alignments on the letter side (phones with no letters).
    pub seq1_del: bool,
    /// Allow null alignments on the phone side (letters with no phones).
    pub seq2_del: bool,
    /// Maximum letter-subsequence length.
    pub seq1_max: usize,
    /// Maximum phone-subsequence length.
    pub seq2_max: usize,
    /// Separator between tokens within a letter subsequence.
    pub seq1_sep: String,
    /// Separator between tokens within a phone subsequence.
    pub seq2_sep: String,
    /// Separator between the letter and phone sides of a multigram.
    pub s1s2_sep: String,
    /// Null-alignment sentinel token. Distinct from epsilon.
    pub skip: String,
    /// Penalize lattice arcs by subsequence size when pruning.
    pub penalize: bool,
    /// Penalize links during the EM iterations themselves.
    pub penalize_em: bool,
    /// Restrict links to 1-N and M-1 during construction.
    pub restrict: bool,
    /// Grow subsequence maxima for pairs that cannot otherwise align.
    pub grow: bool,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            seq1_del: true,
            seq2_del: true,
            seq1_max: 2,
            seq2_max: 2,
            seq1_sep: "|".to_string(),
            seq2_sep: "|".to_string(),
            s1s2_sep: "}".to_string(),
            skip: "_".to_string(),
            penalize: true,
            penalize_em: false,
            restrict: true,
            grow: false,
        }
    }
}

/// Owns the training lattices, the shared multigram symbol table, the
/// alignment-operation weight maps and the penalty table, and runs EM to
/// convergence.
pub struct Aligner {
    pub config: AlignerConfig,
    /// Shared multigram symbol table; ids are stable for the life of the
    /// model. Slot 0 is epsilon, slots 1-4 carry bookkeeping symbols.
    pub syms: SymbolTable,
    pub lattices: Vec<VectorFst<LogWeight>>,
    /// The current model: multigram id -> negative log probability.
    pub model: HashMap<Label, LogWeight>,
    /// Running expectation tallies; rewritten into `model` at each
    /// maximization step.
    pub prev_model: HashMap<Label, LogWeight>,
    pub penalties: PenaltyTable,
    total: LogWeight,
    prev_total: LogWeight,
}

impl Aligner {
    pub fn new(config: AlignerConfig) -> Self {
        // Reserve the bookkeeping slots. Slot 0 (<eps>) comes with the
        // fresh table; the rest are fixed by position so a written model
        // can be restored without outside context.
        let mut syms = SymbolTable::new();
        syms.add_symbol(&config.skip);
        syms.add_symbol(format!("{}_{}", config.seq1_sep, config.seq2_sep));
        syms.add_symbol(&config.s1s2_sep);
        syms.add_symbol(format!(
            "{}_{}_{}_{}",
            config.seq1_del, config.seq2_del, config.seq1_max, config.seq2_max
        ));
        Self::from_parts(config, syms, HashMap::new())
    }

    /// Assemble an aligner around an existing symbol table and model map,
    /// as when restoring a written model.
    pub fn from_parts(
        config: AlignerConfig,
        syms: SymbolTable,
        model: HashMap<Label, LogWeight>,
    ) -> Self {
        Self {
            config,
            syms,
            lattices: Vec::new(),
            model,
            prev_model: HashMap::new(),
            penalties: PenaltyTable::new(),
            total: LogWeight::zero(),
            prev_total: LogWeight::zero(),
        }
    }

    /// Build the alignment lattice for one training pair and fold its arcs
    /// into the initial distribution. Returns false (after a warning) for
    /// pairs that cannot be aligned; these contribute nothing.
    pub fn add_entry(&mut self, seq1: &[String], seq2: &[String]) -> Result<bool> {
        let fst =
            lattice::build_lattice_grown(seq1, seq2, &self.config, &mut self.syms, None)?;
        let aligned = fst.num_states() > 0;

        for state in fst.states_iter() {
            for tr in fst.get_trs(state)?.iter() {
                if let Some(w) = self.prev_model.get_mut(&tr.ilabel) {
                    w.plus_assign(&tr.weight)?;
                } else {
                    self.prev_model.insert(tr.ilabel, tr.weight.clone());
                    let pen = penalty_for(&self.syms, &self.config, tr.ilabel)?;
                    self.penalties.insert(tr.ilabel, pen);
                }
                self.total.plus_assign(&tr.weight)?;
            }
        }

        self.lattices.push(fst);
        Ok(aligned)
    }

    /// Build a lattice weighted from the already-trained model, without
    /// touching the distribution. Used when aligning new data with a
    /// restored model.
    pub fn add_entry_with_model(&mut self, seq1: &[String], seq2: &[String]) -> Result<bool> {
        let fst = lattice::build_lattice_grown(
            seq1,
            seq2,
            &self.config,
            &mut self.syms,
            Some(&self.model),
        )?;
        let aligned = fst.num_states() > 0;

        for state in fst.states_iter() {
            for tr in fst.get_trs(state)?.iter() {
                if !self.penalties.contains_key(&tr.ilabel) {
                    let pen = penalty_for(&self.syms, &self.config, tr.ilabel)?;
                    self.penalties.insert(tr.ilabel, pen);
                }
            }
        }

        self.lattices.push(fst);
        Ok(aligned)
    }

    /// Expectation step: accumulate arc posteriors over every lattice.
    pub fn expectation(&mut self) -> Result<()> {
        for fst in self.lattices.iter() {
            if fst.num_states() == 0 {
                continue;
            }
            let start = match fst.start() {
                Some(s) => s,
                None => continue,
            };
            let alpha = shortest_distance(fst, false)?;
            let beta = shortest_distance(fst, true)?;
            let b0 = match beta.get(start as usize) {
                Some(b) if *b != LogWeight::zero() => b.clone(),
                _ => continue,
            };

            for state in fst.states_iter() {
                let a = match alpha.get(state as usize) {
                    Some(a) => a.clone(),
                    None => continue,
                };
                for tr in fst.get_trs(state)?.iter() {
                    let b = match beta.get(tr.nextstate as usize) {
                        Some(b) => b,
                        None => continue,
                    };
                    let gamma = a
                        .times(&tr.weight)?
                        .times(b)?
                        .divide(&b0, DivideType::DivideAny)?;
                    if gamma.value().is_nan() {
                        continue;
                    }
                    if let Some(w) = self.prev_model.get_mut(&tr.ilabel) {
                        w.plus_assign(&gamma)?;
                    }
                    self.total.plus_assign(&gamma)?;
                }
            }
        }
        Ok(())
    }

    /// Maximization step: normalize the tallies into the next model and
    /// rewrite every lattice arc from it. Returns the change metric
    /// |total - prev_total|.
    pub fn maximization(&mut self) -> Result<f32> {
        let change = (self.total.value() - self.prev_total.value()).abs();
        self.prev_total = self.total.clone();

        for (label, count) in self.prev_model.iter_mut() {
            let w = count.divide(&self.total, DivideType::DivideAny)?;
            self.model.insert(*label, w);
            *count = LogWeight::zero();
        }

        for fst in self.lattices.iter_mut() {
            for state in 0..fst.num_states() {
                let mut trs = fst.tr_iter_mut(state as StateId)?;
                for i in 0..trs.len() {
                    let label = match trs.get(i) {
                        Some(tr) => tr.ilabel,
                        None => continue,
                    };
                    let current = match trs.get(i) {
                        Some(tr) => tr.weight.clone(),
                        None => continue,
                    };
                    let new_weight = if self.config.penalize_em {
                        let ld = self.penalties.get(&label).copied().unwrap_or_default();
                        let w = if ld.lhs > 1 && ld.rhs > 1 {
                            LogWeight::new(POISON_WEIGHT)
                        } else if !ld.lhs_skip && !ld.rhs_skip {
                            let base = self
                                .model
                                .get(&label)
                                .cloned()
                                .unwrap_or_else(LogWeight::zero);
                            LogWeight::new(base.value() * ld.tot as f32)
                        } else {
                            current
                        };
                        if w == LogWeight::zero() || w.value().is_nan() {
                            LogWeight::new(POISON_WEIGHT)
                        } else {
                            w
                        }
                    } else {
                        self.model
                            .get(&label)
                            .cloned()
                            .unwrap_or_else(LogWeight::zero)
                    };
                    trs.set_weight(i, new_weight)?;
                }
            }
        }

        self.total = LogWeight::zero();
        Ok(change)
    }

    /// Run EM: an initial maximization over the construction counts, then
    /// expectation/maximization until the change drops below `thresh` or
    /// the iteration budget runs out, then one final pass.
    pub fn train(&mut self, iters: usize, thresh: f32) -> Result<()> {
        self.maximization()?;
        for i in 1..=iters {
            self.expectation()?;
            let change = self.maximization()?;
            eprintln!(
                "{} change: {:.10}",
                format!("Iteration {i}").blue(),
                change
            );
            if change < thresh {
                break;
            }
        }
        self.expectation()?;
        self.maximization()?;
        Ok(())
    }
}

/// Derive the penalty record for a multigram from its symbol string.
fn penalty_for(
    syms: &SymbolTable,
    config: &AlignerConfig,
    label: Label,
) -> Result<LabelPenalty> {
    let sym = syms
        .get_symbol(label)
        .ok_or_else(|| anyhow!("label {} missing from the symbol table", label))?;
    let (lhs_str, rhs_str) = sym
        .split_once(&config.s1s2_sep)
        .ok_or_else(|| anyhow!("symbol '{}' is not a multigram", sym))?;
    let lhs_skip = lhs_str == config.skip;
    let rhs_skip = rhs_str == config.skip;
    let lhs = if lhs_skip {
        1
    } else {
        lhs_str.matches(&config.seq1_sep).count() + 1
    };
    let rhs = if rhs_skip {
        1
    } else {
        rhs_str.matches(&config.seq2_sep).count() + 1
    };
    Ok(LabelPenalty::new(lhs, rhs, lhs_skip, rhs_skip))
}
