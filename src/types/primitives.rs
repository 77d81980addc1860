//! Primitive type definitions shared by the association algorithms.
//!
//! Segments and synapses are addressed by stable arena identifiers; cells are
//! addressed by their index inside an area, or globally by a [`CellRef`].

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 32-bit floating point number.
pub type Real32 = f32;

/// 64-bit floating point number.
pub type Real64 = f64;

/// Default floating point type.
pub type Real = Real32;

/// Index of a cell inside its cortical area.
pub type CellIdx = u32;

/// Identifier of a cortical area.
pub type AreaId = u32;

/// Unique identifier for a segment in the connections arena.
pub type Segment = u32;

/// Unique identifier for a synapse in the connections arena.
pub type Synapse = u32;

/// Counter type for synapses on a single segment.
pub type SynapseIdx = u16;

/// Synapse permanence value (0.0 to 1.0).
pub type Permanence = Real32;

/// Minimum permanence value.
pub const MIN_PERMANENCE: Permanence = 0.0;

/// Maximum permanence value.
pub const MAX_PERMANENCE: Permanence = 1.0;

/// Permanence floor. Synapses that end an adaptation pass below it are destroyed.
pub const EPSILON: Permanence = 1e-5;

/// Globally unique reference to a cell: the owning area plus the cell index.
///
/// The derived ordering (area first, then index) is the total order used to
/// sort growth candidates before random selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellRef {
    /// Area that owns the cell.
    pub area: AreaId,
    /// Index of the cell inside the area.
    pub index: CellIdx,
}

impl CellRef {
    /// Creates a new cell reference.
    #[inline]
    #[must_use]
    pub const fn new(area: AreaId, index: CellIdx) -> Self {
        Self { area, index }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.area, self.index)
    }
}

/// Dendritic segment type. Fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentKind {
    /// Receives synapses from cells of another area.
    #[default]
    Apical,
    /// Receives synapses from cells of the same area.
    Distal,
}

impl SegmentKind {
    /// Segment kind used when cells of `source` associate with cells of `target`.
    #[inline]
    #[must_use]
    pub fn between(target: AreaId, source: AreaId) -> Self {
        if target == source {
            Self::Distal
        } else {
            Self::Apical
        }
    }

    /// Returns the name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Apical => "apical",
            Self::Distal => "distal",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
