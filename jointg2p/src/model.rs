//! Joint model loading and back-off preparation.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use rustfst::algorithms::compose::compose;
use rustfst::algorithms::tr_sort;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, ExpandedFst, MutableFst, SerializableFst};
use rustfst::prelude::*;
use rustfst::{Label, StateId};

use crate::clusters::{load_clusters, ClusterMaps};
use crate::encode::LabelPairEncoder;
use crate::matcher::{compose_with_matcher, MatchRule};

/// How the decoder treats the model's back-off transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeMode {
    /// Epsilon back-off; the model is composed as-is.
    FsaEps,
    /// Failure-arc back-off over the FSA word machine; the model is
    /// rewritten at load so every input label reachable through back-off
    /// chains has an explicit arc.
    FsaPhi,
    /// Failure-arc back-off with label pairs encoded onto one tape.
    FstPhi,
}

impl FromStr for DecodeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fsa_eps" => Ok(Self::FsaEps),
            "fsa_phi" => Ok(Self::FsaPhi),
            "fst_phi" => Ok(Self::FstPhi),
            other => bail!("decoder type must be fsa_eps, fsa_phi or fst_phi, got '{other}'"),
        }
    }
}

/// A loaded joint N-gram model, prepared for its composition mode and
/// immutable afterwards.
pub struct JointModel {
    pub fst: VectorFst<TropicalWeight>,
    pub isyms: Arc<SymbolTable>,
    pub osyms: Arc<SymbolTable>,
    pub iclusters: ClusterMaps,
    pub oclusters: ClusterMaps,
    pub mode: DecodeMode,
    /// Pair encoder for `fst_phi`.
    encoder: Option<LabelPairEncoder>,
    /// Input label -> every output label the model pairs with it; used to
    /// expand the word machine in `fst_phi`.
    i2omap: HashMap<Label, Vec<Label>>,
}

impl JointModel {
    pub fn from_file<P: AsRef<Path>>(path: P, mode: DecodeMode) -> Result<Self> {
        let path = path.as_ref();
        let mut fst = VectorFst::<TropicalWeight>::read(path)
            .with_context(|| format!("failed to open model file '{}'", path.display()))?;
        let isyms = fst
            .input_symbols()
            .cloned()
            .ok_or_else(|| anyhow!("joint model carries no input symbol table"))?;
        let osyms = fst
            .output_symbols()
            .cloned()
            .ok_or_else(|| anyhow!("joint model carries no output symbol table"))?;

        let mut encoder = None;
        let mut i2omap = HashMap::new();
        match mode {
            DecodeMode::FsaEps => {}
            DecodeMode::FsaPhi => {
                phiify(&mut fst)?;
                resolve_final_backoff(&mut fst)?;
            }
            DecodeMode::FstPhi => {
                i2omap = observed_pairs(&fst)?;
                resolve_final_backoff(&mut fst)?;
                let mut enc = LabelPairEncoder::new();
                fst = enc.encode_fst(&fst)?;
                encoder = Some(enc);
            }
        }
        tr_sort(&mut fst, ILabelCompare {});

        let iclusters = load_clusters(&isyms)?;
        let oclusters = load_clusters(&osyms)?;
        Ok(Self {
            fst,
            isyms,
            osyms,
            iclusters,
            oclusters,
            mode,
            encoder,
            i2omap,
        })
    }

    /// Compose a word machine with the model according to the decode mode.
    /// The result carries raw model labels in every mode.
    pub fn compose_word(
        &self,
        mut word: VectorFst<TropicalWeight>,
    ) -> Result<VectorFst<TropicalWeight>> {
        match self.mode {
            DecodeMode::FsaEps => {
                tr_sort(&mut word, OLabelCompare {});
                let composed: VectorFst<TropicalWeight> = compose::<
                    TropicalWeight,
                    VectorFst<TropicalWeight>,
                    VectorFst<TropicalWeight>,
                    _,
                    _,
                    _,
                >(word, &self.fst)?;
                Ok(composed)
            }
            DecodeMode::FsaPhi => compose_with_matcher(&word, &self.fst, &MatchRule::Phi(0)),
            DecodeMode::FstPhi => {
                let encoder = self
                    .encoder
                    .as_ref()
                    .ok_or_else(|| anyhow!("fst_phi model lost its encoder"))?;
                let expanded = self.expand_word_pairs(&word, encoder)?;
                let composed = compose_with_matcher(&expanded, &self.fst, &MatchRule::Phi(1))?;
                encoder.decode_fst(&composed)
            }
        }
    }

    /// Turn the word acceptor into a transducer over every input/output
    /// pair the model has ever observed for its labels, encoded onto one
    /// tape for failure-arc composition.
    fn expand_word_pairs(
        &self,
        word: &VectorFst<TropicalWeight>,
        encoder: &LabelPairEncoder,
    ) -> Result<VectorFst<TropicalWeight>> {
        let mut out = VectorFst::<TropicalWeight>::new();
        for _ in 0..word.num_states() {
            out.add_state();
        }
        if let Some(start) = word.start() {
            out.set_start(start)?;
        }
        for state in word.states_iter() {
            if let Some(w) = word.final_weight(state)? {
                out.set_final(state, w)?;
            }
            for tr in word.get_trs(state)?.iter() {
                let outputs = match self.i2omap.get(&tr.ilabel) {
                    Some(outputs) => outputs,
                    None => continue,
                };
                for olabel in outputs {
                    if let Some(pair) = encoder.get_pair(tr.ilabel, *olabel) {
                        out.add_tr(
                            state,
                            Tr::new(pair, pair, tr.weight.clone(), tr.nextstate),
                        )?;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Global map from each input label to the set of output labels it ever
/// pairs with.
fn observed_pairs(fst: &VectorFst<TropicalWeight>) -> Result<HashMap<Label, Vec<Label>>> {
    let mut gp: HashMap<Label, HashSet<Label>> = HashMap::new();
    for state in fst.states_iter() {
        for tr in fst.get_trs(state)?.iter() {
            if tr.ilabel == 0 {
                continue;
            }
            gp.entry(tr.ilabel).or_default().insert(tr.olabel);
        }
    }
    let mut out = HashMap::new();
    for (ilabel, olabels) in gp {
        let mut olabels: Vec<Label> = olabels.into_iter().collect();
        olabels.sort_unstable();
        out.insert(ilabel, olabels);
    }
    Ok(out)
}

/// Rewrite the model so that every input/output pair reachable from a state
/// through its back-off chain also has an explicit arc there, with the
/// chain weights folded in. Required for failure-arc matching over an FSA
/// word machine, and it grows the model considerably.
fn phiify(fst: &mut VectorFst<TropicalWeight>) -> Result<()> {
    let gp = observed_pairs(fst)?;

    for state in 0..fst.num_states() {
        let state = state as StateId;
        let mut backoff: Option<(StateId, f32)> = None;
        let mut here: HashMap<Label, HashSet<Label>> = HashMap::new();
        let trs = fst.get_trs(state)?;
        for tr in trs.iter() {
            if tr.ilabel == 0 {
                backoff = Some((tr.nextstate, *tr.weight.value()));
                continue;
            }
            here.entry(tr.ilabel).or_default().insert(tr.olabel);
        }
        let (backoff_state, backoff_cost) = match backoff {
            Some(b) => b,
            None => continue,
        };

        for (ilabel, olabels) in &here {
            let known = match gp.get(ilabel) {
                Some(k) => k,
                None => continue,
            };
            for missing in known.iter().filter(|o| !olabels.contains(*o)) {
                add_backoff_arc(fst, state, backoff_state, (*ilabel, *missing), backoff_cost)?;
            }
        }
    }
    Ok(())
}

/// Chase the back-off chain from `from` until the wanted pair appears, then
/// add the resolved arc at `orig` with the accumulated cost.
fn add_backoff_arc(
    fst: &mut VectorFst<TropicalWeight>,
    orig: StateId,
    from: StateId,
    pair: (Label, Label),
    cost: f32,
) -> Result<()> {
    let mut cur = from;
    let mut cost = cost;
    let mut seen = HashSet::new();
    loop {
        let trs = fst.get_trs(cur)?;
        let mut fallback = None;
        for tr in trs.iter() {
            if tr.ilabel == 0 {
                fallback = Some((tr.nextstate, cost + *tr.weight.value()));
                continue;
            }
            if tr.ilabel == pair.0 && tr.olabel == pair.1 {
                let w = TropicalWeight::new(cost + *tr.weight.value());
                fst.add_tr(orig, Tr::new(pair.0, pair.1, w, tr.nextstate))?;
                return Ok(());
            }
        }
        match fallback {
            Some((next, c)) if seen.insert(next) => {
                cur = next;
                cost = c;
            }
            _ => return Ok(()),
        }
    }
}

/// Give every unreachable-final state the final weight of its back-off
/// chain. Follows the first epsilon arc only, as the legacy format assumes
/// a single back-off transition per state.
fn resolve_final_backoff(fst: &mut VectorFst<TropicalWeight>) -> Result<()> {
    for state in 0..fst.num_states() {
        let state = state as StateId;
        if fst.final_weight(state)?.is_some() {
            continue;
        }
        let mut chain = Vec::new();
        let mut cur = state;
        let mut seen = HashSet::new();
        let resolved = loop {
            if let Some(w) = fst.final_weight(cur)? {
                break Some(*w.value());
            }
            if !seen.insert(cur) {
                break None;
            }
            let trs = fst.get_trs(cur)?;
            let mut eps = None;
            for tr in trs.iter() {
                if tr.ilabel == 0 {
                    eps = Some((tr.nextstate, *tr.weight.value()));
                    break;
                }
            }
            match eps {
                Some((next, w)) => {
                    chain.push((cur, w));
                    cur = next;
                }
                None => break None,
            }
        };
        if let Some(final_weight) = resolved {
            let mut acc = final_weight;
            for (st, w) in chain.into_iter().rev() {
                acc += w;
                fst.set_final(st, TropicalWeight::new(acc))?;
            }
        }
    }
    Ok(())
}
