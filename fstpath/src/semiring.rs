//! Value-wise mapping between the Log and Tropical semirings.
//!
//! Both semirings carry f32 negative-log values, so mapping a lattice from
//! one to the other preserves topology and weight values; only the meaning
//! of plus changes (log-add vs min).

use anyhow::Result;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst};
use rustfst::prelude::*;

pub fn log_to_tropical(fst: &VectorFst<LogWeight>) -> Result<VectorFst<TropicalWeight>> {
    let mut ofst = VectorFst::<TropicalWeight>::new();
    for _ in 0..fst.num_states() {
        ofst.add_state();
    }
    if let Some(start) = fst.start() {
        ofst.set_start(start)?;
    }
    for state in fst.states_iter() {
        if let Some(w) = fst.final_weight(state)? {
            ofst.set_final(state, TropicalWeight::new(*w.value()))?;
        }
        for tr in fst.get_trs(state)?.iter() {
            ofst.add_tr(
                state,
                Tr::new(
                    tr.ilabel,
                    tr.olabel,
                    TropicalWeight::new(*tr.weight.value()),
                    tr.nextstate,
                ),
            )?;
        }
    }
    Ok(ofst)
}

pub fn tropical_to_log(fst: &VectorFst<TropicalWeight>) -> Result<VectorFst<LogWeight>> {
    let mut ofst = VectorFst::<LogWeight>::new();
    for _ in 0..fst.num_states() {
        ofst.add_state();
    }
    if let Some(start) = fst.start() {
        ofst.set_start(start)?;
    }
    for state in fst.states_iter() {
        if let Some(w) = fst.final_weight(state)? {
            ofst.set_final(state, LogWeight::new(*w.value()))?;
        }
        for tr in fst.get_trs(state)?.iter() {
            ofst.add_tr(
                state,
                Tr::new(
                    tr.ilabel,
                    tr.olabel,
                    LogWeight::new(*tr.weight.value()),
                    tr.nextstate,
                ),
            )?;
        }
    }
    Ok(ofst)
}

/// Log-semiring plus on raw negative-log values: -ln(e^-a + e^-b).
pub fn plus_log(a: f32, b: f32) -> Result<f32> {
    let sum = LogWeight::new(a).plus(LogWeight::new(b))?;
    Ok(*sum.value())
}
