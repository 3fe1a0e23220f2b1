//! Emission of the aligned training corpus.
//!
//! Two formats: a plain text corpus with one alignment per line (the usual
//! input to an N-gram toolkit), and a keyed archive of posterior-normalized
//! N-best lattices for pipelines that can consume weighted alternatives.
//! With anything beyond 1-best text output the relative scores are
//! stripped, so the lattice archive is the right choice when the ranking
//! matters downstream.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fstpath::{log_to_tropical, shortest_path_filtered, tropical_to_log, IdentityFilter, NbestConfig};
use rustfst::algorithms::rm_epsilon::rm_epsilon;
use rustfst::algorithms::{push_weights, ReweightType};
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst, SerializableFst};
use rustfst::prelude::*;
use rustfst::StateId;

use crate::aligner::Aligner;
use crate::pruner::Pruner;

/// Write one alignment per line, tokens separated by single spaces.
///
/// Pairs whose lattice is empty (the deletion flags forbade the necessary
/// null step) produce no output.
pub fn write_corpus<W: Write>(aligner: &Aligner, pruner: &Pruner, out: &mut W) -> Result<()> {
    for lattice in &aligner.lattices {
        if lattice.num_states() == 0 {
            continue;
        }
        let mut tfst = log_to_tropical(lattice)?;
        pruner.prune(&mut tfst)?;
        rm_epsilon(&mut tfst)?;
        if tfst.num_states() == 0 {
            continue;
        }

        let config = NbestConfig {
            nbest: pruner.nbest,
            ..Default::default()
        };
        let (paths, _) = shortest_path_filtered(&tfst, &IdentityFilter, &config)?;
        for path in paths.iter_ordered() {
            let tokens: Vec<&str> = path
                .uniques
                .iter()
                .filter_map(|label| aligner.syms.get_symbol(*label))
                .collect();
            writeln!(out, "{}", tokens.join(" "))?;
        }
    }
    Ok(())
}

/// Write an archive of pruned, posterior-normalized lattices.
///
/// Each surviving lattice is pushed to final in the Log semiring and its
/// final weights reset to one, which makes every arc weight interpretable
/// as P(arc | lattice); the result is stored in the Tropical semiring under
/// a zero-padded numeric key. Entries that prune to nothing are omitted.
pub fn write_archive<P: AsRef<Path>>(aligner: &Aligner, pruner: &Pruner, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create archive directory {}", dir.display()))?;
    let syms = Arc::new(aligner.syms.clone());

    for (i, lattice) in aligner.lattices.iter().enumerate() {
        if lattice.num_states() == 0 {
            continue;
        }
        let mut tfst = log_to_tropical(lattice)?;
        pruner.prune(&mut tfst)?;

        let mut lfst = tropical_to_log(&tfst)?;
        if lfst.num_states() == 0 {
            continue;
        }
        push_weights(&mut lfst, ReweightType::ReweightToFinal)?;
        for state in 0..lfst.num_states() {
            let state = state as StateId;
            if lfst.final_weight(state)?.is_some() {
                lfst.set_final(state, LogWeight::one())?;
            }
        }

        let mut entry = log_to_tropical(&lfst)?;
        entry.set_input_symbols(Arc::clone(&syms));
        entry.set_output_symbols(Arc::clone(&syms));
        let key = format!("{:08}.fst", i + 1);
        entry
            .write(dir.join(&key))
            .with_context(|| format!("failed to write archive entry {}", key))?;
    }
    Ok(())
}
