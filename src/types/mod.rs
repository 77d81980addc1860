//! Core types for the association library.
//!
//! This module contains the primitive identifiers shared by all algorithms and
//! the cortical area, the population of cells that associations are learned
//! between.

mod area;
mod primitives;

pub use area::CorticalArea;
pub use primitives::*;
