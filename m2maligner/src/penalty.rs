use std::collections::HashMap;

use rustfst::Label;

/// Cached shape of one alignment operation, filled in on first sight of the
/// multigram id and reused by EM penalization and lattice pruning.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelPenalty {
    /// Token count of the letter side.
    pub lhs: usize,
    /// Token count of the phone side.
    pub rhs: usize,
    pub max: usize,
    pub tot: usize,
    /// The letter side is the skip sentinel.
    pub lhs_skip: bool,
    /// The phone side is the skip sentinel.
    pub rhs_skip: bool,
}

impl LabelPenalty {
    pub fn new(lhs: usize, rhs: usize, lhs_skip: bool, rhs_skip: bool) -> Self {
        Self {
            lhs,
            rhs,
            max: lhs.max(rhs),
            tot: lhs + rhs,
            lhs_skip,
            rhs_skip,
        }
    }
}

pub type PenaltyTable = HashMap<Label, LabelPenalty>;
