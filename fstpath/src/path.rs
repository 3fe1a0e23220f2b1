use rustfst::Label;

/// A single decoded hypothesis extracted from a lattice.
///
/// `uniques` is the canonical form of the path under whichever filter
/// produced it: for the multigram filter this is the flat phone sequence
/// with separators and skips removed, so that tied multigram variants of
/// the same pronunciation collapse onto one record.
#[derive(Debug, Clone, Default)]
pub struct PathData {
    /// Total path weight (negative log probability).
    pub path_weight: f32,
    /// Per-arc weights in path order.
    pub path_weights: Vec<f32>,
    /// Raw input labels, including epsilons and boundary markers.
    pub ilabels: Vec<Label>,
    /// Raw output labels, including epsilons and boundary markers.
    pub olabels: Vec<Label>,
    /// Filtered output labels identifying the hypothesis.
    pub uniques: Vec<Label>,
}
