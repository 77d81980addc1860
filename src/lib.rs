//! # NAA - Neural Association Algorithm in Rust
//!
//! An implementation of the Neural Association Algorithm: a Hebbian-style
//! learner that links the active cells of one cortical area with the active
//! cells of another by growing and strengthening synapses on apical dendritic
//! segments.
//!
//! ## Overview
//!
//! - **Cortical areas**: Named populations of cells with a sparse active set
//! - **Connections**: The segment/synapse graph grown on an area's cells
//! - **Association Memory**: Classifies segments and adapts them each cycle
//!
//! Repeatedly presenting the same pair of active populations drives every
//! participating synapse to full permanence, after which every active target
//! cell owns an active apical segment fed by the source population.
//!
//! ## Quick Start
//!
//! ```rust
//! use naa::prelude::*;
//!
//! let mut rng = Random::new(7);
//!
//! let mut x = CorticalArea::new(1, "X", 1024);
//! x.randomize_active_cells(0.02, &mut rng);
//!
//! let mut y = CorticalArea::new(2, "Y", 100);
//! y.randomize_active_cells(0.05, &mut rng);
//!
//! let mut memory = AssociationMemory::new(
//!     AssociationMemoryParams {
//!         activation_threshold: 5,
//!         min_threshold: 3,
//!         max_new_synapse_count: 5,
//!         max_synapses_per_segment: 32,
//!         max_segments_per_cell: 8,
//!         ..Default::default()
//!     },
//!     y,
//! )
//! .unwrap();
//!
//! for _ in 0..10 {
//!     memory.compute(&x, true).unwrap();
//! }
//!
//! assert_eq!(memory.active_apical_segments(None).len(), 5);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]

pub mod algorithms;
pub mod types;
pub mod utils;

/// Re-export of commonly used types for convenience.
pub mod prelude {
    pub use crate::algorithms::{
        AreaCycle, AssociationMemory, AssociationMemoryParams, ComputeCycle, Connections,
        ConnectionsParams, SegmentActivity, SegmentClasses,
    };
    pub use crate::types::{
        AreaId, CellIdx, CellRef, CorticalArea, Permanence, Real, Real32, Real64, Segment,
        SegmentKind, Synapse,
    };
    pub use crate::utils::Random;
    pub use crate::NaaError;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library.
pub mod error {
    use thiserror::Error;

    /// Main error type for association operations.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum NaaError {
        /// Invalid configuration value.
        #[error("Invalid configuration '{name}': {message}")]
        InvalidConfiguration {
            /// Name of the offending parameter.
            name: &'static str,
            /// Description of the error.
            message: String,
        },

        /// The requested area relation has no learning rule.
        #[error("Association of area '{area}' with itself is not supported")]
        UnsupportedRelation {
            /// Name of the area.
            area: String,
        },

        /// Index out of bounds.
        #[error("Index {index} out of bounds (size: {size})")]
        IndexOutOfBounds {
            /// The invalid index.
            index: usize,
            /// The valid size.
            size: usize,
        },

        /// A structural invariant of the segment/synapse graph does not hold.
        #[error("Invariant violation: {0}")]
        InvariantViolation(String),
    }

    /// Result type alias using NaaError.
    pub type Result<T> = std::result::Result<T, NaaError>;
}

pub use error::{NaaError, Result};
