//! Compilation of a query word into an input FSA.

use std::collections::HashMap;

use anyhow::Result;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::MutableFst;
use rustfst::prelude::*;
use rustfst::{Label, StateId};

/// Build the FSA accepting the input letter sequence plus every cluster arc
/// the model knows. State `i` sits before letter `i`; each matching cluster
/// of length 2..=`max_len` adds a parallel arc skipping ahead by its length.
///
/// With `superfinal` the machine grows a two-state tail carrying the
/// sentence-boundary markers, for models trained with explicit boundaries.
/// An empty word yields the single-state machine accepting the empty
/// string.
pub fn entry_to_fsa(
    word: &[Label],
    max_len: usize,
    inv_clusters: &HashMap<Vec<Label>, Label>,
    superfinal: bool,
) -> Result<VectorFst<TropicalWeight>> {
    let mut fsa = VectorFst::<TropicalWeight>::new();
    for _ in 0..=word.len() {
        fsa.add_state();
    }
    fsa.set_start(0)?;

    for i in 0..word.len() {
        let label = word[i];
        fsa.add_tr(
            i as StateId,
            Tr::new(label, label, TropicalWeight::one(), (i + 1) as StateId),
        )?;
        for j in 2..=max_len {
            if i + j > word.len() {
                break;
            }
            if let Some(&cluster) = inv_clusters.get(&word[i..i + j]) {
                fsa.add_tr(
                    i as StateId,
                    Tr::new(cluster, cluster, TropicalWeight::one(), (i + j) as StateId),
                )?;
            }
        }
    }

    if superfinal {
        let begin = fsa.add_state();
        fsa.add_tr(
            word.len() as StateId,
            Tr::new(0, 0, TropicalWeight::one(), begin),
        )?;
        let end = fsa.add_state();
        fsa.add_tr(begin, Tr::new(1, 1, TropicalWeight::one(), end))?;
        fsa.set_final(end, TropicalWeight::one())?;
    } else {
        fsa.set_final(word.len() as StateId, TropicalWeight::one())?;
    }
    Ok(fsa)
}
