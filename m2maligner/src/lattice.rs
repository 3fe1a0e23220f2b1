//! Construction of the alignment lattice for a single sequence pair.
//!
//! The lattice is a WFSA over the Log semiring whose states form the
//! `(|seq1|+1) x (|seq2|+1)` grid; an arc from cell `(i, j)` to
//! `(i+k, j+l)` stands for aligning `seq1[i..i+k)` with `seq2[j..j+l)` as a
//! single multigram. Every multigram is interned into the shared symbol
//! table on first appearance and carries the same id on both tapes.

use anyhow::Result;
use colored::Colorize;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst};
use rustfst::prelude::*;
use rustfst::{Label, StateId};
use std::collections::HashMap;

use crate::aligner::AlignerConfig;

/// Default weight for null-alignment (skip) arcs; effectively zero
/// probability until EM reassigns mass.
const SKIP_WEIGHT: f32 = 99.0;

fn multigram(config: &AlignerConfig, left: &str, right: &str) -> String {
    format!("{}{}{}", left, config.s1s2_sep, right)
}

/// Build the alignment lattice for one pair with explicit subsequence
/// maxima. Arc weights come from `model` when given, otherwise from the
/// uniform length-weighted construction defaults.
pub fn build_lattice(
    seq1: &[String],
    seq2: &[String],
    s1_max: usize,
    s2_max: usize,
    config: &AlignerConfig,
    syms: &mut SymbolTable,
    model: Option<&HashMap<Label, LogWeight>>,
) -> Result<VectorFst<LogWeight>> {
    let cols = seq2.len() + 1;
    let num_states = (seq1.len() + 1) * cols;
    let mut fst = VectorFst::<LogWeight>::new();
    for _ in 0..num_states {
        fst.add_state();
    }

    let weight_of = |label: Label, default: f32| -> LogWeight {
        match model {
            Some(m) => m.get(&label).cloned().unwrap_or_else(LogWeight::zero),
            None => LogWeight::new(default),
        }
    };

    for i in 0..=seq1.len() {
        for j in 0..=seq2.len() {
            let istate = (i * cols + j) as StateId;

            // Null arcs consuming only seq2
            if config.seq1_del {
                for l in 1..=s2_max {
                    if j + l > seq2.len() {
                        continue;
                    }
                    let right = seq2[j..j + l].join(&config.seq2_sep);
                    let sym = multigram(config, &config.skip, &right);
                    let label = syms.add_symbol(sym);
                    let ostate = (i * cols + j + l) as StateId;
                    let w = weight_of(label, SKIP_WEIGHT);
                    fst.add_tr(istate, Tr::new(label, label, w, ostate))?;
                }
            }

            // Null arcs consuming only seq1
            if config.seq2_del {
                for k in 1..=s1_max {
                    if i + k > seq1.len() {
                        continue;
                    }
                    let left = seq1[i..i + k].join(&config.seq1_sep);
                    let sym = multigram(config, &left, &config.skip);
                    let label = syms.add_symbol(sym);
                    let ostate = ((i + k) * cols + j) as StateId;
                    let w = weight_of(label, SKIP_WEIGHT);
                    fst.add_tr(istate, Tr::new(label, label, w, ostate))?;
                }
            }

            // Substantive arcs consuming both sides
            for k in 1..=s1_max {
                for l in 1..=s2_max {
                    if i + k > seq1.len() || j + l > seq2.len() {
                        continue;
                    }
                    // Only 1-M and N-1 links, no M-N links
                    if config.restrict && k > 1 && l > 1 {
                        continue;
                    }
                    let left = seq1[i..i + k].join(&config.seq1_sep);
                    let right = seq2[j..j + l].join(&config.seq2_sep);
                    let sym = multigram(config, &left, &right);
                    let label = syms.add_symbol(sym);
                    let ostate = ((i + k) * cols + j + l) as StateId;
                    let default = *LogWeight::one().value() * (k + l) as f32;
                    let w = weight_of(label, default);
                    fst.add_tr(istate, Tr::new(label, label, w, ostate))?;
                }
            }
        }
    }

    fst.set_start(0)?;
    fst.set_final((num_states - 1) as StateId, LogWeight::one())?;

    // Unless both deletion kinds are allowed some grid cells are
    // unreachable and must be swept out.
    if !config.seq1_del || !config.seq2_del {
        connect(&mut fst)?;
    }

    Ok(fst)
}

/// Build a lattice, optionally growing the subsequence maxima on failure.
///
/// Growth stops once both maxima cover the full sequence lengths; past that
/// point no further arc can appear, so a still-empty lattice means the pair
/// cannot be aligned under the deletion flags and is reported.
pub fn build_lattice_grown(
    seq1: &[String],
    seq2: &[String],
    config: &AlignerConfig,
    syms: &mut SymbolTable,
    model: Option<&HashMap<Label, LogWeight>>,
) -> Result<VectorFst<LogWeight>> {
    let mut s1_max = config.seq1_max;
    let mut s2_max = config.seq2_max;
    let mut fst = build_lattice(seq1, seq2, s1_max, s2_max, config, syms, model)?;
    while config.grow
        && fst.num_states() == 0
        && (s1_max < seq1.len() || s2_max < seq2.len())
    {
        s1_max += 1;
        s2_max += 1;
        fst = build_lattice(seq1, seq2, s1_max, s2_max, config, syms, model)?;
    }

    if fst.num_states() == 0 {
        eprintln!(
            "{} {}",
            "Alignment failed:".yellow(),
            seq1.join(" ")
        );
    }
    Ok(fst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::AlignerConfig;

    fn seq(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn reserved_syms(config: &AlignerConfig) -> SymbolTable {
        let mut syms = SymbolTable::new();
        syms.add_symbol(&config.skip);
        syms.add_symbol(format!("{}_{}", config.seq1_sep, config.seq2_sep));
        syms.add_symbol(&config.s1s2_sep);
        syms
    }

    #[test]
    fn test_grid_shape_with_deletions() {
        let config = AlignerConfig::default();
        let mut syms = reserved_syms(&config);
        let fst = build_lattice(
            &seq(&["a", "b"]),
            &seq(&["X", "Y"]),
            2,
            2,
            &config,
            &mut syms,
            None,
        )
        .unwrap();
        // Full grid kept: both deletion kinds allowed.
        assert_eq!(fst.num_states(), 9);
        assert_eq!(fst.start(), Some(0));
        assert!(fst.final_weight(8).unwrap().is_some());
    }

    #[test]
    fn test_restrict_forbids_m_n_links() {
        let config = AlignerConfig::default();
        let mut syms = reserved_syms(&config);
        build_lattice(
            &seq(&["a", "b"]),
            &seq(&["X", "Y"]),
            2,
            2,
            &config,
            &mut syms,
            None,
        )
        .unwrap();
        assert!(syms.get_label("a|b}X").is_some());
        assert!(syms.get_label("a}X|Y").is_some());
        assert!(syms.get_label("a|b}X|Y").is_none());
    }

    #[test]
    fn test_one_to_one_lattice_is_the_diagonal() {
        let config = AlignerConfig {
            seq1_del: false,
            seq2_del: false,
            seq1_max: 1,
            seq2_max: 1,
            ..Default::default()
        };
        let mut syms = reserved_syms(&config);
        let fst = build_lattice(
            &seq(&["a", "b"]),
            &seq(&["X", "Y"]),
            1,
            1,
            &config,
            &mut syms,
            None,
        )
        .unwrap();
        // Only the diagonal survives connect: (0,0) -> (1,1) -> (2,2).
        assert_eq!(fst.num_states(), 3);
        assert!(syms.get_label("a}X").is_some());
        assert!(syms.get_label("b}Y").is_some());
    }

    #[test]
    fn test_unequal_lengths_without_deletions_is_empty() {
        let config = AlignerConfig {
            seq1_del: false,
            seq2_del: false,
            seq1_max: 1,
            seq2_max: 1,
            ..Default::default()
        };
        let mut syms = reserved_syms(&config);
        let fst = build_lattice(
            &seq(&["a", "b", "c"]),
            &seq(&["X"]),
            1,
            1,
            &config,
            &mut syms,
            None,
        )
        .unwrap();
        assert_eq!(fst.num_states(), 0);
    }

    #[test]
    fn test_grow_recovers_unalignable_pair() {
        let config = AlignerConfig {
            seq1_del: false,
            seq2_del: false,
            seq1_max: 1,
            seq2_max: 1,
            grow: true,
            ..Default::default()
        };
        let mut syms = reserved_syms(&config);
        let fst = build_lattice_grown(
            &seq(&["a", "b", "c"]),
            &seq(&["X"]),
            &config,
            &mut syms,
            None,
        )
        .unwrap();
        // Growing to a 3-token left subsequence makes a|b|c}X possible.
        assert!(fst.num_states() > 0);
        assert!(syms.get_label("a|b|c}X").is_some());
    }

    #[test]
    fn test_skip_arcs_carry_large_weight() {
        let config = AlignerConfig::default();
        let mut syms = reserved_syms(&config);
        let fst = build_lattice(
            &seq(&["a"]),
            &seq(&["X"]),
            2,
            2,
            &config,
            &mut syms,
            None,
        )
        .unwrap();
        let skip_label = syms.get_label("a}_").unwrap();
        let full_label = syms.get_label("a}X").unwrap();
        let mut saw_skip = false;
        let mut saw_full = false;
        for state in fst.states_iter() {
            for tr in fst.get_trs(state).unwrap().iter() {
                if tr.ilabel == skip_label {
                    saw_skip = true;
                    assert!((tr.weight.value() - 99.0).abs() < 1e-6);
                }
                if tr.ilabel == full_label {
                    saw_full = true;
                    assert!((tr.weight.value() - 0.0).abs() < 1e-6);
                }
            }
        }
        assert!(saw_skip && saw_full);
    }
}
