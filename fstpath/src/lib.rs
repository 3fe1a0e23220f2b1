//! Shared path-extraction machinery for WFST lattices.
//!
//! This crate hosts the pieces used by both the alignment trainer and the
//! joint decoder: the `PathData` result record, the path filters that define
//! when two lattice paths count as the same hypothesis, the filtered
//! n-shortest-path routine built on top of them, and value-wise mapping
//! between the Log and Tropical semirings.

pub mod filter;
pub mod nshortest;
pub mod path;
pub mod semiring;

pub use filter::{IdentityFilter, MultigramFilter, PathFilter, PathSet};
pub use nshortest::{shortest_path_filtered, NbestConfig};
pub use path::PathData;
pub use semiring::{log_to_tropical, plus_log, tropical_to_log};
