//! Per-cycle bookkeeping: segment classification and cycle results.

use std::fmt;

use crate::types::{AreaId, CellIdx, Real64, Segment, SegmentKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Segments of the active cells of an area, partitioned by state.
///
/// The three segment lists are disjoint. `cells_without_segments` lists active
/// cells that own no segment of the classified kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentClasses {
    /// Connected synapse count >= activation threshold.
    pub active: Vec<Segment>,
    /// Total synapse count >= min threshold, but not active.
    pub matching: Vec<Segment>,
    /// Total synapse count < min threshold, and not active.
    pub inactive: Vec<Segment>,
    /// Active cells with no segment of the classified kind.
    pub cells_without_segments: Vec<CellIdx>,
}

/// Read-only snapshot of an area's segment activity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentActivity {
    /// Iteration the snapshot was taken at.
    pub iteration: u64,
    /// Number of active segments.
    pub active_segments: usize,
    /// Number of matching segments.
    pub matching_segments: usize,
    /// Number of inactive segments.
    pub inactive_segments: usize,
    /// Number of active cells without a segment.
    pub cells_without_segments: usize,
    /// Sum of permanences over all synapses of active segments.
    pub synaptic_energy: Real64,
}

impl fmt::Display for SegmentActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration {}: {} active, {} matching, {} inactive segments, {} cells without segments, energy {:.3}",
            self.iteration,
            self.active_segments,
            self.matching_segments,
            self.inactive_segments,
            self.cells_without_segments,
            self.synaptic_energy
        )
    }
}

/// Outcome of associating the target area with one source area.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AreaCycle {
    /// The source (associating) area.
    pub source: AreaId,
    /// Segment kind the association used.
    pub kind: SegmentKind,
    /// Active segments adapted.
    pub adapted_active: usize,
    /// Matching segments adapted.
    pub adapted_matching: usize,
    /// Inactive segments that received growth attempts.
    pub grown_inactive: usize,
    /// Segments created on cells without segments.
    pub created_segments: usize,
    /// Synapses created.
    pub new_synapses: usize,
    /// Synapses destroyed (adaptation or eviction).
    pub destroyed_synapses: usize,
    /// Segments destroyed (adaptation or eviction).
    pub destroyed_segments: usize,
    /// Activity of the target area after the pass.
    pub activity: SegmentActivity,
}

/// Result of one compute call.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComputeCycle {
    /// Iteration counter after the call.
    pub iteration: u64,
    /// One entry per source area, in input order.
    pub areas: Vec<AreaCycle>,
}

impl ComputeCycle {
    /// Total synapses created across all source areas.
    pub fn new_synapses(&self) -> usize {
        self.areas.iter().map(|a| a.new_synapses).sum()
    }

    /// Total segments created across all source areas.
    pub fn created_segments(&self) -> usize {
        self.areas.iter().map(|a| a.created_segments).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_display() {
        let activity = SegmentActivity {
            iteration: 3,
            active_segments: 5,
            synaptic_energy: 2.5,
            ..Default::default()
        };
        let text = activity.to_string();
        assert!(text.starts_with("iteration 3: 5 active"));
        assert!(text.ends_with("energy 2.500"));
    }

    #[test]
    fn test_cycle_totals() {
        let cycle = ComputeCycle {
            iteration: 2,
            areas: vec![
                AreaCycle {
                    new_synapses: 4,
                    created_segments: 1,
                    ..Default::default()
                },
                AreaCycle {
                    new_synapses: 6,
                    ..Default::default()
                },
            ],
        };
        assert_eq!(cycle.new_synapses(), 10);
        assert_eq!(cycle.created_segments(), 1);
    }
}
