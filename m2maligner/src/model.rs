//! Alignment-model persistence.
//!
//! The model is written as a single-state WFSA in the Log semiring: state 0
//! is final with weight one and carries one `(id, id, weight)` self-loop per
//! multigram. The training parameters ride along in the reserved slots of
//! the attached symbol table (the legacy format); at load time they are
//! decoded once into an explicit [`ModelHeader`] instead of being re-read
//! from the table piecemeal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst, SerializableFst};
use rustfst::prelude::*;
use rustfst::Label;

use crate::aligner::{Aligner, AlignerConfig};

/// Training parameters recovered from the reserved symbol slots of a
/// written model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHeader {
    pub skip: String,
    pub seq1_sep: String,
    pub seq2_sep: String,
    pub s1s2_sep: String,
    pub seq1_del: bool,
    pub seq2_del: bool,
    pub seq1_max: usize,
    pub seq2_max: usize,
}

impl ModelHeader {
    /// Decode the legacy slot encoding: 1 = skip, 2 = packed separators,
    /// 3 = side separator, 4 = packed deletion flags and maxima.
    pub fn parse(syms: &SymbolTable) -> Result<Self> {
        let skip = syms
            .get_symbol(1)
            .ok_or_else(|| anyhow!("model symbol table lacks the skip slot"))?
            .to_string();
        let packed_seps = syms
            .get_symbol(2)
            .ok_or_else(|| anyhow!("model symbol table lacks the separator slot"))?;
        let (seq1_sep, seq2_sep) = packed_seps
            .split_once('_')
            .ok_or_else(|| anyhow!("malformed separator slot '{}'", packed_seps))?;
        let s1s2_sep = syms
            .get_symbol(3)
            .ok_or_else(|| anyhow!("model symbol table lacks the side-separator slot"))?
            .to_string();
        let packed_params = syms
            .get_symbol(4)
            .ok_or_else(|| anyhow!("model symbol table lacks the parameter slot"))?;
        let parts: Vec<&str> = packed_params.split('_').collect();
        if parts.len() != 4 {
            return Err(anyhow!("malformed parameter slot '{}'", packed_params));
        }
        Ok(Self {
            skip,
            seq1_sep: seq1_sep.to_string(),
            seq2_sep: seq2_sep.to_string(),
            s1s2_sep,
            seq1_del: parts[0] == "true",
            seq2_del: parts[1] == "true",
            seq1_max: parts[2]
                .parse()
                .with_context(|| format!("bad seq1_max in '{}'", packed_params))?,
            seq2_max: parts[3]
                .parse()
                .with_context(|| format!("bad seq2_max in '{}'", packed_params))?,
        })
    }
}

/// Write the aligner's model to disk. Self-loops are emitted in label order
/// so repeated writes of the same model are identical.
pub fn write_model<P: AsRef<Path>>(aligner: &Aligner, path: P) -> Result<()> {
    let mut fst = VectorFst::<LogWeight>::new();
    let s0 = fst.add_state();
    fst.set_start(s0)?;
    fst.set_final(s0, LogWeight::one())?;

    let mut entries: Vec<(&Label, &LogWeight)> = aligner.model.iter().collect();
    entries.sort_by_key(|(label, _)| **label);
    for (label, weight) in entries {
        fst.add_tr(s0, Tr::new(*label, *label, weight.clone(), s0))?;
    }

    fst.set_input_symbols(Arc::new(aligner.syms.clone()));
    fst.write(path.as_ref())
        .with_context(|| format!("failed to write model to {}", path.as_ref().display()))?;
    Ok(())
}

/// Restore an aligner from a written model.
pub fn load_model<P: AsRef<Path>>(
    path: P,
    penalize: bool,
    penalize_em: bool,
    restrict: bool,
) -> Result<Aligner> {
    let fst = VectorFst::<LogWeight>::read(path.as_ref())
        .with_context(|| format!("failed to read model from {}", path.as_ref().display()))?;
    let syms = fst
        .input_symbols()
        .cloned()
        .ok_or_else(|| anyhow!("alignment model carries no symbol table"))?;
    let header = ModelHeader::parse(&syms)?;

    let mut model = HashMap::new();
    for state in fst.states_iter() {
        for tr in fst.get_trs(state)?.iter() {
            model.insert(tr.ilabel, tr.weight.clone());
        }
    }

    let config = AlignerConfig {
        seq1_del: header.seq1_del,
        seq2_del: header.seq2_del,
        seq1_max: header.seq1_max,
        seq2_max: header.seq2_max,
        seq1_sep: header.seq1_sep.clone(),
        seq2_sep: header.seq2_sep.clone(),
        s1s2_sep: header.s1s2_sep.clone(),
        skip: header.skip.clone(),
        penalize,
        penalize_em,
        restrict,
        grow: false,
    };
    Ok(Aligner::from_parts(config, (*syms).clone(), model))
}
