//! Back-off matchers and composition.
//!
//! The OpenFst-style matcher hierarchy collapses here into a closed set of
//! tagged variants; the pair-construction composition dispatches on the
//! variant in its inner loop. The left operand is the (epsilon-free on its
//! output tape, acyclic) word machine, the right operand the joint model.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use rustfst::fst_impls::VectorFst;
use rustfst::fst_traits::{CoreFst, MutableFst};
use rustfst::prelude::*;
use rustfst::{Label, StateId};

/// How unmatched input labels are resolved against the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// Arcs labelled 0 on the model's input tape are free moves.
    Epsilon,
    /// Arcs with this label are failure arcs: followed, with their weights
    /// accumulated, only when the current state has no explicit match.
    Phi(Label),
    /// Arcs with this label match any input label; the label is rewritten
    /// to the consumed one.
    Sigma(Label),
    /// Arcs with this label match any input label lacking an explicit
    /// match; the label is rewritten to the consumed one.
    Rho(Label),
}

fn intern(
    out: &mut VectorFst<TropicalWeight>,
    map: &mut HashMap<(StateId, StateId), StateId>,
    queue: &mut VecDeque<(StateId, StateId)>,
    pair: (StateId, StateId),
) -> StateId {
    *map.entry(pair).or_insert_with(|| {
        queue.push_back(pair);
        out.add_state()
    })
}

/// Compose the word machine with the model under the given match rule.
pub fn compose_with_matcher(
    word: &VectorFst<TropicalWeight>,
    model: &VectorFst<TropicalWeight>,
    rule: &MatchRule,
) -> Result<VectorFst<TropicalWeight>> {
    let mut out = VectorFst::<TropicalWeight>::new();
    let (s1, s2) = match (word.start(), model.start()) {
        (Some(s1), Some(s2)) => (s1, s2),
        _ => return Ok(out),
    };

    let mut map: HashMap<(StateId, StateId), StateId> = HashMap::new();
    let mut queue: VecDeque<(StateId, StateId)> = VecDeque::new();
    let start = intern(&mut out, &mut map, &mut queue, (s1, s2));
    out.set_start(start)?;

    while let Some((q1, q2)) = queue.pop_front() {
        let oq = map[&(q1, q2)];

        if let (Some(f1), Some(f2)) = (word.final_weight(q1)?, model.final_weight(q2)?) {
            out.set_final(oq, f1.times(&f2)?)?;
        }

        // Model-side free moves.
        if *rule == MatchRule::Epsilon {
            let model_trs = model.get_trs(q2)?;
            for tr2 in model_trs.iter() {
                if tr2.ilabel == 0 {
                    let dest = intern(&mut out, &mut map, &mut queue, (q1, tr2.nextstate));
                    out.add_tr(oq, Tr::new(0, tr2.olabel, tr2.weight.clone(), dest))?;
                }
            }
        }

        let word_trs = word.get_trs(q1)?;
        for tr1 in word_trs.iter() {
            if tr1.olabel == 0 {
                // Input-side epsilon: advance the word machine alone.
                let dest = intern(&mut out, &mut map, &mut queue, (tr1.nextstate, q2));
                out.add_tr(oq, Tr::new(tr1.ilabel, 0, tr1.weight.clone(), dest))?;
                continue;
            }

            match rule {
                MatchRule::Epsilon => {
                    let model_trs = model.get_trs(q2)?;
                    for tr2 in model_trs.iter() {
                        if tr2.ilabel == tr1.olabel {
                            let dest =
                                intern(&mut out, &mut map, &mut queue, (tr1.nextstate, tr2.nextstate));
                            let w = tr1.weight.times(&tr2.weight)?;
                            out.add_tr(oq, Tr::new(tr1.ilabel, tr2.olabel, w, dest))?;
                        }
                    }
                }
                MatchRule::Phi(phi) => {
                    // Walk the failure chain until an explicit match turns
                    // up, accumulating the failure weights.
                    let mut cur = q2;
                    let mut acc = TropicalWeight::one();
                    let mut seen = HashSet::new();
                    loop {
                        let model_trs = model.get_trs(cur)?;
                        let mut matched = false;
                        for tr2 in model_trs.iter() {
                            if tr2.ilabel == tr1.olabel && tr2.ilabel != *phi {
                                let dest = intern(
                                    &mut out,
                                    &mut map,
                                    &mut queue,
                                    (tr1.nextstate, tr2.nextstate),
                                );
                                let w = tr1.weight.times(&acc)?.times(&tr2.weight)?;
                                out.add_tr(oq, Tr::new(tr1.ilabel, tr2.olabel, w, dest))?;
                                matched = true;
                            }
                        }
                        if matched {
                            break;
                        }
                        let mut fallback = None;
                        for tr2 in model_trs.iter() {
                            if tr2.ilabel == *phi {
                                fallback = Some((tr2.nextstate, tr2.weight.clone()));
                                break;
                            }
                        }
                        match fallback {
                            Some((next, w)) if seen.insert(next) => {
                                acc = acc.times(&w)?;
                                cur = next;
                            }
                            _ => break,
                        }
                    }
                }
                MatchRule::Sigma(sigma) => {
                    let model_trs = model.get_trs(q2)?;
                    for tr2 in model_trs.iter() {
                        if tr2.ilabel == tr1.olabel || tr2.ilabel == *sigma {
                            let olabel = if tr2.olabel == *sigma {
                                tr1.olabel
                            } else {
                                tr2.olabel
                            };
                            let dest =
                                intern(&mut out, &mut map, &mut queue, (tr1.nextstate, tr2.nextstate));
                            let w = tr1.weight.times(&tr2.weight)?;
                            out.add_tr(oq, Tr::new(tr1.ilabel, olabel, w, dest))?;
                        }
                    }
                }
                MatchRule::Rho(rho) => {
                    let model_trs = model.get_trs(q2)?;
                    let explicit = model_trs.iter().any(|tr2| tr2.ilabel == tr1.olabel);
                    for tr2 in model_trs.iter() {
                        let usable = if explicit {
                            tr2.ilabel == tr1.olabel
                        } else {
                            tr2.ilabel == *rho
                        };
                        if usable {
                            let olabel = if tr2.olabel == *rho {
                                tr1.olabel
                            } else {
                                tr2.olabel
                            };
                            let dest =
                                intern(&mut out, &mut map, &mut queue, (tr1.nextstate, tr2.nextstate));
                            let w = tr1.weight.times(&tr2.weight)?;
                            out.add_tr(oq, Tr::new(tr1.ilabel, olabel, w, dest))?;
                        }
                    }
                }
            }
        }
    }

    connect(&mut out)?;
    Ok(out)
}
