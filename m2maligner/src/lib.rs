//! Many-to-many alignment of grapheme and phoneme sequences.
//!
//! Reads pairs of sequences and transforms each into a WFSA over the Log
//! semiring that encodes every legal alignment between subsequences of the
//! two, subject to user-specified subsequence length bounds and deletion
//! policies. Expectation-maximization over the whole set of lattices then
//! learns a joint distribution over alignment operations, and the winning
//! alignments are emitted as a text corpus (or an N-best lattice archive)
//! for downstream joint N-gram model training.

pub mod aligner;
pub mod corpus;
pub mod dict;
pub mod lattice;
pub mod model;
pub mod penalty;
pub mod pruner;

pub use aligner::{Aligner, AlignerConfig};
pub use penalty::{LabelPenalty, PenaltyTable};
pub use pruner::Pruner;
