//! Path filters: the pluggable definition of when two lattice paths are the
//! same hypothesis.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rustfst::prelude::*;
use rustfst::Label;

use crate::path::PathData;

/// Strategy deciding how an arc contributes to a path and to its canonical
/// `uniques` vector.
pub trait PathFilter {
    fn extend(&self, path: &mut PathData, tr: &Tr<TropicalWeight>);
}

/// Keeps every non-trivial output label as-is.
///
/// Labels 0..=2 are reserved (epsilon, separator, skip) and never enter the
/// uniques vector.
pub struct IdentityFilter;

impl PathFilter for IdentityFilter {
    fn extend(&self, path: &mut PathData, tr: &Tr<TropicalWeight>) {
        if tr.ilabel == 0 && tr.olabel == 0 && tr.weight == TropicalWeight::one() {
            return;
        }
        if tr.olabel > 2 {
            path.uniques.push(tr.olabel);
        }
        path.ilabels.push(tr.ilabel);
        path.olabels.push(tr.olabel);
        path.path_weights.push(*tr.weight.value());
        path.path_weight += *tr.weight.value();
    }
}

/// Decomposes tied multigram output labels into their constituent tokens and
/// drops a veto set of non-phonetic labels.
///
/// A path labelled `(a|b}p|r)(c}t)` and a path labelled `(a}p)(b}r)(c}t)`
/// both reduce to the uniques vector `[p, r, t]`.
pub struct MultigramFilter {
    clusters: HashMap<Label, Vec<Label>>,
    veto: HashSet<Label>,
}

impl MultigramFilter {
    pub fn new(clusters: HashMap<Label, Vec<Label>>, veto: HashSet<Label>) -> Self {
        Self { clusters, veto }
    }
}

impl PathFilter for MultigramFilter {
    fn extend(&self, path: &mut PathData, tr: &Tr<TropicalWeight>) {
        if tr.ilabel == 0 && tr.olabel == 0 && tr.weight == TropicalWeight::one() {
            return;
        }
        if let Some(tokens) = self.clusters.get(&tr.olabel) {
            for token in tokens {
                if !self.veto.contains(token) {
                    path.uniques.push(*token);
                }
            }
        }
        path.ilabels.push(tr.ilabel);
        path.olabels.push(tr.olabel);
        path.path_weights.push(*tr.weight.value());
        path.path_weight += *tr.weight.value();
    }
}

/// Accumulated winning paths keyed by their uniques vector, in discovery
/// order.
#[derive(Debug, Default)]
pub struct PathSet {
    map: HashMap<Vec<Label>, PathData>,
    ordered: Vec<Vec<Label>>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, uniques: &[Label]) -> bool {
        self.map.contains_key(uniques)
    }

    /// Record a newly completed path. The first path seen for a given
    /// uniques vector wins; later duplicates only extend the ordered list
    /// when deduplication is disabled upstream.
    pub fn insert(&mut self, path: PathData) {
        self.ordered.push(path.uniques.clone());
        self.map.entry(path.uniques.clone()).or_insert(path);
    }

    /// Log-add the weight of a redundant tied path into the stored entry.
    pub fn accumulate(&mut self, path: &PathData) -> Result<()> {
        if let Some(entry) = self.map.get_mut(&path.uniques) {
            entry.path_weight = crate::semiring::plus_log(entry.path_weight, path.path_weight)?;
        }
        Ok(())
    }

    pub fn get(&self, uniques: &[Label]) -> Option<&PathData> {
        self.map.get(uniques)
    }

    /// Paths in discovery order, which is ascending weight order for paths
    /// produced by the n-shortest routine.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &PathData> {
        self.ordered.iter().filter_map(|u| self.map.get(u))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(ilabel: Label, olabel: Label, weight: f32) -> Tr<TropicalWeight> {
        Tr::new(ilabel, olabel, TropicalWeight::new(weight), 0)
    }

    #[test]
    fn test_identity_filter_drops_reserved() {
        let filter = IdentityFilter;
        let mut path = PathData::default();
        filter.extend(&mut path, &tr(3, 3, 0.5));
        filter.extend(&mut path, &tr(4, 0, 0.25));
        filter.extend(&mut path, &tr(5, 2, 0.0));
        assert_eq!(path.uniques, vec![3]);
        assert_eq!(path.olabels, vec![3, 0, 2]);
        assert!((path.path_weight - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_identity_filter_skips_free_epsilon() {
        let filter = IdentityFilter;
        let mut path = PathData::default();
        filter.extend(&mut path, &tr(0, 0, 0.0));
        assert!(path.olabels.is_empty());
        assert!(path.path_weights.is_empty());
    }

    #[test]
    fn test_multigram_filter_expands_clusters() {
        let mut clusters = HashMap::new();
        clusters.insert(3, vec![3]);
        clusters.insert(4, vec![5, 6]);
        let veto: HashSet<Label> = [0, 1, 2].into_iter().collect();
        let filter = MultigramFilter::new(clusters, veto);

        let mut path = PathData::default();
        filter.extend(&mut path, &tr(7, 4, 1.0));
        filter.extend(&mut path, &tr(8, 3, 1.0));
        assert_eq!(path.uniques, vec![5, 6, 3]);
        assert_eq!(path.olabels, vec![4, 3]);
    }

    #[test]
    fn test_multigram_filter_vetoes_separators() {
        let mut clusters = HashMap::new();
        clusters.insert(4, vec![5, 1, 2, 6]);
        let veto: HashSet<Label> = [0, 1, 2].into_iter().collect();
        let filter = MultigramFilter::new(clusters, veto);

        let mut path = PathData::default();
        filter.extend(&mut path, &tr(7, 4, 0.0));
        assert_eq!(path.uniques, vec![5, 6]);
    }

    #[test]
    fn test_path_set_accumulate() {
        let mut set = PathSet::new();
        let mut first = PathData::default();
        first.uniques = vec![3, 4];
        first.path_weight = 1.0;
        set.insert(first);

        let mut tied = PathData::default();
        tied.uniques = vec![3, 4];
        tied.path_weight = 2.0;
        set.accumulate(&tied).unwrap();

        let stored = set.get(&[3, 4]).unwrap();
        // -ln(e^-1 + e^-2)
        assert!((stored.path_weight - 0.68673).abs() < 1e-4);
        assert_eq!(set.len(), 1);
    }
}
