//! Heuristics module for VSPTW.
//!
//! This module exports the construction heuristic and the improvement strategies built on it.

pub mod construction;
pub mod local_search;
pub mod fix_and_refill;
pub mod repair;

pub use construction::*;
pub use local_search::*;
pub use fix_and_refill::*;
pub use repair::*;
