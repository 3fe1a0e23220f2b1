//! Joint N-gram decoding: word in, ranked pronunciations out.
//!
//! The decoder loads a joint N-gram model compiled to WFST form, whose
//! input and output symbol tables share a multigram alphabet: multi-token
//! cluster labels are recognized by the separator inside the symbol string.
//! A query word is compiled into an FSA carrying the matching cluster arcs,
//! composed with the model (with epsilon or failure-arc back-off), and the
//! n best filter-distinct pronunciations are read off the composed lattice.

pub mod clusters;
pub mod decoder;
pub mod encode;
pub mod matcher;
pub mod model;
pub mod tokenize;
pub mod wordfsa;

pub use clusters::ClusterMaps;
pub use decoder::{DecodeOpts, Decoder};
pub use model::{DecodeMode, JointModel};
