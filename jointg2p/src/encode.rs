//! Bijective encoding of (ilabel, olabel) pairs into single labels.
//!
//! Failure-arc composition over a transducer needs the label pairs packed
//! onto one tape; the back-off eps:eps pair is pinned to id 1 so the phi
//! matcher can name it.

use anyhow::{anyhow, Result};
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst};
use rustfst::prelude::*;
use rustfst::Label;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct LabelPairEncoder {
    pairs: Vec<(Label, Label)>,
    map: HashMap<(Label, Label), Label>,
}

impl Default for LabelPairEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelPairEncoder {
    pub fn new() -> Self {
        let mut encoder = Self {
            pairs: Vec::new(),
            map: HashMap::new(),
        };
        encoder.encode_pair(0, 0);
        encoder
    }

    /// Intern a pair, allocating the next id on first sight. Ids start at 1
    /// and (0, 0) always encodes to 1.
    pub fn encode_pair(&mut self, ilabel: Label, olabel: Label) -> Label {
        if let Some(&label) = self.map.get(&(ilabel, olabel)) {
            return label;
        }
        self.pairs.push((ilabel, olabel));
        let label = self.pairs.len() as Label;
        self.map.insert((ilabel, olabel), label);
        label
    }

    /// Look up a pair without interning.
    pub fn get_pair(&self, ilabel: Label, olabel: Label) -> Option<Label> {
        self.map.get(&(ilabel, olabel)).copied()
    }

    pub fn decode_pair(&self, label: Label) -> Option<(Label, Label)> {
        if label == 0 {
            return None;
        }
        self.pairs.get((label - 1) as usize).copied()
    }

    /// Rewrite a transducer as an acceptor over encoded pair labels.
    pub fn encode_fst(
        &mut self,
        fst: &VectorFst<TropicalWeight>,
    ) -> Result<VectorFst<TropicalWeight>> {
        let mut out = VectorFst::<TropicalWeight>::new();
        for _ in 0..fst.num_states() {
            out.add_state();
        }
        if let Some(start) = fst.start() {
            out.set_start(start)?;
        }
        for state in fst.states_iter() {
            if let Some(w) = fst.final_weight(state)? {
                out.set_final(state, w)?;
            }
            for tr in fst.get_trs(state)?.iter() {
                let label = self.encode_pair(tr.ilabel, tr.olabel);
                out.add_tr(
                    state,
                    Tr::new(label, label, tr.weight.clone(), tr.nextstate),
                )?;
            }
        }
        Ok(out)
    }

    /// Restore the original label pairs on an encoded machine.
    pub fn decode_fst(
        &self,
        fst: &VectorFst<TropicalWeight>,
    ) -> Result<VectorFst<TropicalWeight>> {
        let mut out = VectorFst::<TropicalWeight>::new();
        for _ in 0..fst.num_states() {
            out.add_state();
        }
        if let Some(start) = fst.start() {
            out.set_start(start)?;
        }
        for state in fst.states_iter() {
            if let Some(w) = fst.final_weight(state)? {
                out.set_final(state, w)?;
            }
            for tr in fst.get_trs(state)?.iter() {
                let (ilabel, olabel) = if tr.ilabel == 0 {
                    (0, 0)
                } else {
                    self.decode_pair(tr.ilabel)
                        .ok_or_else(|| anyhow!("label {} was never encoded", tr.ilabel))?
                };
                out.add_tr(state, Tr::new(ilabel, olabel, tr.weight.clone(), tr.nextstate))?;
            }
        }
        Ok(out)
    }
}
