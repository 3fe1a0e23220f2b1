//! The joint decoder: word in, ranked pronunciation hypotheses out.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use fstpath::{plus_log, shortest_path_filtered, MultigramFilter, NbestConfig, PathData};
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{ExpandedFst, MutableFst, SerializableFst};
use rustfst::prelude::*;
use rustfst::Label;

use crate::model::{DecodeMode, JointModel};
use crate::tokenize::word_to_labels;
use crate::wordfsa::entry_to_fsa;

/// Sentinel disabling the probability-mass cutoff.
pub const PMASS_DISABLED: f32 = 99.0;

/// Per-request decoding options.
#[derive(Debug, Clone)]
pub struct DecodeOpts {
    /// Distinct hypotheses to return.
    pub nbest: usize,
    /// Per-state visit bound of the n-best search.
    pub beam: usize,
    /// Admissible weight margin relative to the 1-best hypothesis.
    pub threshold: f32,
    /// Log-add tied multigram variants instead of discarding them. The
    /// result marginalizes over ties, which is not interchangeable with
    /// plain tropical scores downstream.
    pub accumulate: bool,
    /// Probability-mass budget as -ln(mass); `PMASS_DISABLED` turns the
    /// cutoff off.
    pub pmass: f32,
    /// Reverse the input word before decoding.
    pub reverse: bool,
    /// Dump the word machine and the composed lattice next to the model,
    /// for debugging.
    pub write_fsts: bool,
}

impl Default for DecodeOpts {
    fn default() -> Self {
        Self {
            nbest: 1,
            beam: 10_000,
            threshold: 99.0,
            accumulate: false,
            pmass: PMASS_DISABLED,
            reverse: false,
            write_fsts: false,
        }
    }
}

/// A loaded model plus the request-independent decode state. The model is
/// immutable after load, so a decoder can be shared freely across threads;
/// each `phoneticize` call keeps its scratch on its own frame.
pub struct Decoder {
    model: JointModel,
    gsep: String,
    veto: HashSet<Label>,
}

impl Decoder {
    pub fn new(model: JointModel, gsep: &str) -> Self {
        let veto: HashSet<Label> = [0, 1, 2].into_iter().collect();
        Self {
            model,
            gsep: gsep.to_string(),
            veto,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P, mode: DecodeMode, gsep: &str) -> Result<Self> {
        Ok(Self::new(JointModel::from_file(path, mode)?, gsep))
    }

    pub fn osym(&self, label: Label) -> Option<&str> {
        self.model.osyms.get_symbol(label)
    }

    pub fn isym(&self, label: Label) -> Option<&str> {
        self.model.isyms.get_symbol(label)
    }

    /// Decode one word into up to `nbest` filter-distinct pronunciations,
    /// best first. A word with no accepting path yields an empty list.
    pub fn phoneticize(&self, word: &str, opts: &DecodeOpts) -> Result<Vec<PathData>> {
        let mut labels = word_to_labels(word, &self.gsep, &self.model.isyms);
        if opts.reverse {
            labels.reverse();
        }

        let mut fsa = entry_to_fsa(
            &labels,
            self.model.iclusters.max_len,
            &self.model.iclusters.inv_clusters,
            false,
        )?;
        fsa.set_input_symbols(Arc::clone(&self.model.isyms));
        fsa.set_output_symbols(Arc::clone(&self.model.isyms));
        if opts.write_fsts {
            fsa.write(format!("{word}.fst"))?;
        }

        let lattice: VectorFst<TropicalWeight> = self.model.compose_word(fsa)?;
        if opts.write_fsts {
            lattice.write(format!("{word}.lat.fst"))?;
        }
        if lattice.num_states() == 0 {
            return Ok(Vec::new());
        }

        let filter = MultigramFilter::new(self.model.oclusters.clusters.clone(), self.veto.clone());
        let config = NbestConfig {
            nbest: opts.nbest,
            beam: opts.beam,
            threshold: opts.threshold,
            accumulate: opts.accumulate,
            unique: true,
        };
        let (paths, _) = shortest_path_filtered(&lattice, &filter, &config)?;

        // Optional probability-mass cutoff: renormalize by the collected
        // total and return the smallest prefix crossing the budget. The
        // cut is greedy: the hypothesis crossing the line is included.
        let mut total = PMASS_DISABLED;
        if opts.pmass < PMASS_DISABLED {
            for path in paths.iter_ordered() {
                total = plus_log(total, path.path_weight)?;
            }
        }

        let mut results = Vec::new();
        let mut running = PMASS_DISABLED;
        for path in paths.iter_ordered() {
            let mut out = path.clone();
            if opts.pmass < PMASS_DISABLED {
                out.path_weight -= total;
                running = plus_log(running, out.path_weight)?;
            }
            results.push(out);
            if opts.pmass < PMASS_DISABLED && running < opts.pmass {
                break;
            }
        }
        Ok(results)
    }
}
