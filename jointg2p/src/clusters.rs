//! Cluster mining from a joint model's symbol tables.
//!
//! Clusters learned during alignment survive into the model as symbols
//! containing the separator (reserved at slot 1), e.g. `a|b`. Scanning the
//! table once recovers, for every label, the constituent token labels, plus
//! the inverse map used to spot cluster-shaped subsequences of an input
//! word.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use rustfst::prelude::*;
use rustfst::Label;

#[derive(Debug, Clone, Default)]
pub struct ClusterMaps {
    /// Longest cluster, in tokens.
    pub max_len: usize,
    /// label -> constituent token labels (singletons map to themselves).
    pub clusters: HashMap<Label, Vec<Label>>,
    /// constituent token labels -> cluster label.
    pub inv_clusters: HashMap<Vec<Label>, Label>,
}

pub fn load_clusters(syms: &SymbolTable) -> Result<ClusterMaps> {
    let tie = syms
        .get_symbol(1)
        .ok_or_else(|| anyhow!("symbol table lacks the cluster separator at slot 1"))?
        .to_string();

    let mut maps = ClusterMaps {
        max_len: 1,
        ..Default::default()
    };
    for label in 2..syms.len() as Label {
        let sym = syms
            .get_symbol(label)
            .ok_or_else(|| anyhow!("symbol table lies about its size at {}", label))?;
        let cluster = if sym.contains(&tie) {
            sym.split(&tie)
                .map(|token| {
                    syms.get_label(token).ok_or_else(|| {
                        anyhow!("token '{}' of cluster '{}' missing from the table", token, sym)
                    })
                })
                .collect::<Result<Vec<Label>>>()?
        } else {
            vec![label]
        };
        maps.max_len = maps.max_len.max(cluster.len());
        maps.clusters.insert(label, cluster.clone());
        maps.inv_clusters.insert(cluster, label);
    }
    Ok(maps)
}
