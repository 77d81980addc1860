//! Association Memory implementation.
//!
//! Associates the active cells of one or more source areas with the active
//! cells of a target area by growing and strengthening synapses on apical
//! segments of the target cells. Learning only strengthens: there is no
//! decrement path, so a learned association is never forgotten by
//! adaptation, only by capacity eviction.

use std::fmt;

use ahash::AHashSet;
use tracing::debug;

use crate::algorithms::{AreaCycle, ComputeCycle, SegmentActivity, SegmentClasses};
use crate::error::{NaaError, Result};
use crate::types::{
    CellIdx, CellRef, CorticalArea, Permanence, Real64, Segment, SegmentKind, Synapse,
    SynapseIdx, EPSILON,
};
use crate::utils::Random;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for creating an Association Memory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssociationMemoryParams {
    /// Minimum number of connected synapses for a segment to be active.
    pub activation_threshold: usize,

    /// Minimum number of synapses for a non-active segment to be matching.
    pub min_threshold: usize,

    /// Maximum number of synapses grown per adaptation pass.
    /// Must be less than `max_synapses_per_segment`.
    pub max_new_synapse_count: usize,

    /// Maximum number of synapses per segment.
    pub max_synapses_per_segment: usize,

    /// Maximum number of segments of one kind per cell.
    pub max_segments_per_cell: usize,

    /// Initial permanence for new synapses.
    pub initial_permanence: Permanence,

    /// Amount added to the permanence of synapses from active cells.
    pub permanence_increment: Permanence,

    /// Permanence threshold for connected synapses.
    pub connected_permanence: Permanence,

    /// Synapses below this permanence are destroyed during adaptation.
    pub epsilon: Permanence,

    /// Random seed for synapse growth.
    pub seed: u64,
}

impl Default for AssociationMemoryParams {
    fn default() -> Self {
        Self {
            activation_threshold: 13,
            min_threshold: 10,
            max_new_synapse_count: 20,
            max_synapses_per_segment: 255,
            max_segments_per_cell: 255,
            initial_permanence: 0.21,
            permanence_increment: 0.1,
            connected_permanence: 0.5,
            epsilon: EPSILON,
            seed: 42,
        }
    }
}

/// The association algorithm for one target area.
///
/// The memory owns its target area, including every segment and synapse grown
/// on the area's cells. Source areas are only read, so any number of
/// memories can associate with the same source area concurrently.
///
/// # Example
///
/// ```rust
/// use naa::algorithms::{AssociationMemory, AssociationMemoryParams};
/// use naa::types::CorticalArea;
///
/// let mut x = CorticalArea::new(1, "X", 1024);
/// x.set_active_cells(&[10, 20, 30, 40, 50]).unwrap();
///
/// let mut y = CorticalArea::new(2, "Y", 100);
/// y.set_active_cells(&[0, 1, 2]).unwrap();
///
/// let mut memory = AssociationMemory::new(
///     AssociationMemoryParams {
///         activation_threshold: 5,
///         min_threshold: 3,
///         max_new_synapse_count: 5,
///         max_synapses_per_segment: 16,
///         ..Default::default()
///     },
///     y,
/// )
/// .unwrap();
///
/// for _ in 0..10 {
///     memory.compute(&x, true).unwrap();
/// }
///
/// assert_eq!(memory.active_apical_segments(None).len(), 3);
/// assert!(memory.inactive_apical_segments().is_empty());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssociationMemory {
    params: AssociationMemoryParams,

    // Target area with its segment/synapse graph
    area: CorticalArea,

    rng: Random,

    // Advanced once per source area per compute
    iteration: u64,

    last_activity: Option<SegmentActivity>,
}

impl AssociationMemory {
    /// Creates a new Association Memory for `area`, seeded from `params.seed`.
    pub fn new(params: AssociationMemoryParams, area: CorticalArea) -> Result<Self> {
        let rng = Random::new(params.seed);
        Self::with_rng(params, area, rng)
    }

    /// Creates a new Association Memory that grows synapses using `rng`.
    pub fn with_rng(
        params: AssociationMemoryParams,
        mut area: CorticalArea,
        rng: Random,
    ) -> Result<Self> {
        validate_params(&params)?;

        area.connections_mut()
            .set_connected_threshold(params.connected_permanence);

        Ok(Self {
            params,
            area,
            rng,
            iteration: 0,
            last_activity: None,
        })
    }

    /// Associates the active cells of `associated` with the active cells of
    /// the target area.
    pub fn compute(&mut self, associated: &CorticalArea, learn: bool) -> Result<ComputeCycle> {
        self.compute_many(&[associated], learn)
    }

    /// Associates each source area in turn with the target area.
    ///
    /// The whole batch is validated before anything is mutated: on error the
    /// graph and the iteration counter are unchanged. The iteration counter
    /// advances once per source area.
    pub fn compute_many(
        &mut self,
        associated: &[&CorticalArea],
        learn: bool,
    ) -> Result<ComputeCycle> {
        self.validate_cycle(associated)?;

        let mut cycle = ComputeCycle::default();
        for &source in associated {
            let mut area_cycle = self.activate_cells(source, learn);

            self.iteration += 1;

            let activity = self.segment_activity();
            area_cycle.activity = activity;
            self.last_activity = Some(activity);

            debug!(
                target_area = self.area.name(),
                source_area = source.name(),
                iteration = self.iteration,
                adapted_active = area_cycle.adapted_active,
                adapted_matching = area_cycle.adapted_matching,
                grown_inactive = area_cycle.grown_inactive,
                created_segments = area_cycle.created_segments,
                new_synapses = area_cycle.new_synapses,
                destroyed_synapses = area_cycle.destroyed_synapses,
                "association pass"
            );

            cycle.areas.push(area_cycle);
        }

        cycle.iteration = self.iteration;
        Ok(cycle)
    }

    fn validate_cycle(&self, associated: &[&CorticalArea]) -> Result<()> {
        let p = &self.params;

        // Growth must always leave room for a full batch of new synapses.
        if p.max_new_synapse_count >= p.max_synapses_per_segment {
            return Err(NaaError::InvalidConfiguration {
                name: "max_new_synapse_count",
                message: format!(
                    "{} must be less than max_synapses_per_segment ({})",
                    p.max_new_synapse_count, p.max_synapses_per_segment
                ),
            });
        }

        for source in associated {
            if source.same_area(&self.area) {
                return Err(NaaError::UnsupportedRelation {
                    area: source.name().to_string(),
                });
            }

            // Every active source cell must fit on a single segment.
            if source.num_active_cells() > p.max_synapses_per_segment {
                return Err(NaaError::InvalidConfiguration {
                    name: "max_synapses_per_segment",
                    message: format!(
                        "area '{}' has {} active cells, more than max_synapses_per_segment ({})",
                        source.name(),
                        source.num_active_cells(),
                        p.max_synapses_per_segment
                    ),
                });
            }
        }

        Ok(())
    }

    /// One association pass against a single source area.
    fn activate_cells(&mut self, source: &CorticalArea, learn: bool) -> AreaCycle {
        let kind = SegmentKind::between(self.area.id(), source.id());
        let mut result = AreaCycle {
            source: source.id(),
            kind,
            ..Default::default()
        };

        if !learn {
            return result;
        }

        let pruned_synapses = self.area.connections().pruned_synapses();
        let pruned_segments = self.area.connections().pruned_segments();

        let associating = source.active_cells();
        let active_inputs: AHashSet<CellRef> = associating.iter().copied().collect();
        let num_synapses = self
            .params
            .max_new_synapse_count
            .min(self.params.max_synapses_per_segment)
            .min(associating.len());

        self.adapt_active_segments(kind, &associating, &active_inputs, num_synapses, &mut result);
        self.adapt_matching_segments(kind, &associating, &active_inputs, &mut result);
        self.adapt_inactive_segments(kind, &associating, num_synapses, &mut result);

        result.destroyed_synapses = self.area.connections().pruned_synapses() - pruned_synapses;
        result.destroyed_segments = self.area.connections().pruned_segments() - pruned_segments;
        result
    }

    /// Strengthens active segments and tops them up to `num_synapses`.
    fn adapt_active_segments(
        &mut self,
        kind: SegmentKind,
        associating: &[CellRef],
        active_inputs: &AHashSet<CellRef>,
        num_synapses: usize,
        result: &mut AreaCycle,
    ) {
        let active = self.classify(kind, Some(associating)).active;
        result.adapted_active = active.len();

        for segment in active {
            if !self.adapt_segment(segment, active_inputs) {
                continue;
            }

            let current = self.area.connections().num_synapses_on_segment(segment);
            if num_synapses > current {
                result.new_synapses +=
                    self.grow_synapses(segment, associating, num_synapses - current);
            }
        }
    }

    /// Strengthens matching segments and grows them toward `max_new_synapse_count`.
    fn adapt_matching_segments(
        &mut self,
        kind: SegmentKind,
        associating: &[CellRef],
        active_inputs: &AHashSet<CellRef>,
        result: &mut AreaCycle,
    ) {
        let matching = self.classify(kind, Some(associating)).matching;
        result.adapted_matching = matching.len();

        for segment in matching {
            if !self.adapt_segment(segment, active_inputs) {
                continue;
            }

            let current = self.area.connections().num_synapses_on_segment(segment);
            let desired = self.params.max_new_synapse_count.saturating_sub(current);
            if desired > 0 {
                result.new_synapses += self.grow_synapses(segment, associating, desired);
            }
        }
    }

    /// Grows inactive segments toward unconnected associating cells and
    /// creates a segment on every active cell that has none.
    fn adapt_inactive_segments(
        &mut self,
        kind: SegmentKind,
        associating: &[CellRef],
        num_synapses: usize,
        result: &mut AreaCycle,
    ) {
        let inactive = self.classify(kind, None).inactive;
        result.grown_inactive = inactive.len();

        for segment in inactive {
            for &cell in associating {
                if !self.area.connections().are_connected(cell, segment) {
                    result.new_synapses += self.grow_synapses(segment, associating, num_synapses);
                }
            }
        }

        if num_synapses == 0 {
            return;
        }

        let bare_cells = self.classify(kind, None).cells_without_segments;
        for cell in bare_cells {
            let segment = self.create_segment(cell, kind);
            result.created_segments += 1;
            result.new_synapses += self.grow_synapses(segment, associating, num_synapses);
        }
    }

    /// Strengthens the synapses of `segment` whose source cell is in
    /// `associating_active`. Returns `false` if the segment was destroyed.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        associating_active: &AHashSet<CellRef>,
    ) -> bool {
        let iteration = self.iteration;
        self.area.connections_mut().adapt_segment(
            segment,
            associating_active,
            self.params.permanence_increment,
            self.params.epsilon,
            iteration,
        )
    }

    /// Grows up to `n_desired` synapses on `segment` from `candidates`.
    pub fn grow_synapses(
        &mut self,
        segment: Segment,
        candidates: &[CellRef],
        n_desired: usize,
    ) -> usize {
        let iteration = self.iteration;
        let Self {
            params, area, rng, ..
        } = self;
        let connections = area.connections_mut();

        connections.touch_segment(segment, iteration);
        connections.grow_synapses(
            segment,
            candidates,
            params.initial_permanence,
            n_desired,
            Some(params.max_synapses_per_segment),
            rng,
        )
    }

    /// Creates a segment of `kind` on a target cell, evicting the least
    /// recently used segment of that kind if the cell is full.
    pub fn create_segment(&mut self, cell: CellIdx, kind: SegmentKind) -> Segment {
        let iteration = self.iteration;
        let max = self.params.max_segments_per_cell;
        self.area
            .connections_mut()
            .create_segment(cell, kind, iteration, Some(max))
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// Classifies the segments of `kind` on the target's active cells.
    ///
    /// With `associating` set, only active cells owning a segment of `kind`
    /// that receives a synapse from one of those cells are classified.
    /// `cells_without_segments` always covers every active cell.
    pub fn classify(&self, kind: SegmentKind, associating: Option<&[CellRef]>) -> SegmentClasses {
        let connections = self.area.connections();
        let active_cells = self.area.active_cell_indices();

        let candidates: Vec<CellIdx> = match associating {
            Some(cells) => connections.cells_connected_to(active_cells, cells, kind),
            None => active_cells.to_vec(),
        };

        let mut classes = SegmentClasses::default();
        for cell in candidates {
            for &segment in connections.segments_for_cell(cell, kind) {
                let data = connections.data_for_segment(segment);
                if data.num_connected as usize >= self.params.activation_threshold {
                    classes.active.push(segment);
                } else if data.num_synapses() >= self.params.min_threshold {
                    classes.matching.push(segment);
                } else {
                    classes.inactive.push(segment);
                }
            }
        }

        classes.cells_without_segments = active_cells
            .iter()
            .copied()
            .filter(|&c| connections.segments_for_cell(c, kind).is_empty())
            .collect();

        classes
    }

    /// Active apical segments of the target's active cells.
    pub fn active_apical_segments(&self, associating: Option<&[CellRef]>) -> Vec<Segment> {
        self.classify(SegmentKind::Apical, associating).active
    }

    /// Matching apical segments of the target's active cells.
    pub fn matching_apical_segments(&self, associating: Option<&[CellRef]>) -> Vec<Segment> {
        self.classify(SegmentKind::Apical, associating).matching
    }

    /// Inactive apical segments of the target's active cells.
    pub fn inactive_apical_segments(&self) -> Vec<Segment> {
        self.classify(SegmentKind::Apical, None).inactive
    }

    /// Active target cells that own no apical segment.
    pub fn active_cells_without_apical_segments(&self) -> Vec<CellIdx> {
        self.classify(SegmentKind::Apical, None).cells_without_segments
    }

    /// Sum of permanences over all synapses of active apical segments.
    pub fn apical_synaptic_energy(&self) -> Real64 {
        let connections = self.area.connections();
        self.active_apical_segments(None)
            .into_iter()
            .flat_map(|s| connections.synapses_for_segment(s))
            .map(|&syn| Real64::from(connections.data_for_synapse(syn).permanence))
            .sum()
    }

    /// Snapshot of the apical segment activity of the target's active cells.
    pub fn segment_activity(&self) -> SegmentActivity {
        let classes = self.classify(SegmentKind::Apical, None);
        SegmentActivity {
            iteration: self.iteration,
            active_segments: classes.active.len(),
            matching_segments: classes.matching.len(),
            inactive_segments: classes.inactive.len(),
            cells_without_segments: classes.cells_without_segments.len(),
            synaptic_energy: self.apical_synaptic_energy(),
        }
    }

    /// Human readable dump of the target area's current state.
    pub fn trace_state(&self) -> String {
        StateTrace(self).to_string()
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Returns the parameters.
    pub fn params(&self) -> &AssociationMemoryParams {
        &self.params
    }

    /// Returns the target area.
    pub fn area(&self) -> &CorticalArea {
        &self.area
    }

    /// Returns the target area mutably, e.g. to set its active cells.
    pub fn area_mut(&mut self) -> &mut CorticalArea {
        &mut self.area
    }

    /// Returns the current iteration.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Activity snapshot taken after the most recent association pass.
    pub fn last_activity(&self) -> Option<&SegmentActivity> {
        self.last_activity.as_ref()
    }

    /// Synapses on the target area's segments fed by `cell`.
    pub fn receptor_synapses(&self, cell: CellRef) -> &[Synapse] {
        self.area.connections().receptor_synapses(cell)
    }
}

/// Multi-line rendering of an engine's classification and graph.
struct StateTrace<'a>(&'a AssociationMemory);

impl fmt::Display for StateTrace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let memory = self.0;
        let activity = memory.segment_activity();
        let connections = memory.area.connections();

        writeln!(f, "Iteration {}", memory.iteration)?;
        writeln!(
            f,
            "Active apical segments in area {}: {}",
            memory.area.name(),
            activity.active_segments
        )?;
        writeln!(f, "Matching apical segments: {}", activity.matching_segments)?;
        writeln!(f, "Inactive apical segments: {}", activity.inactive_segments)?;
        writeln!(
            f,
            "Active cells without apical segments: {}",
            activity.cells_without_segments
        )?;
        writeln!(f, "Synaptic energy = {:.4}", activity.synaptic_energy)?;

        for &cell in memory.area.active_cell_indices() {
            let data = connections.data_for_cell(cell);
            writeln!(
                f,
                "Cell {}: {} apical, {} distal segments",
                cell,
                data.apical.len(),
                data.distal.len()
            )?;
            for &segment in data.apical.iter().chain(data.distal.iter()) {
                let seg = connections.data_for_segment(segment);
                write!(
                    f,
                    "  {} segment {} (last used {}):",
                    seg.kind, segment, seg.last_used_iteration
                )?;
                for &synapse in &seg.synapses {
                    let syn = connections.data_for_synapse(synapse);
                    write!(f, " {}@{:.2}", syn.presynaptic_cell, syn.permanence)?;
                }
                writeln!(f)?;
            }
        }

        Ok(())
    }
}

fn validate_params(params: &AssociationMemoryParams) -> Result<()> {
    let permanences = [
        ("initial_permanence", params.initial_permanence),
        ("permanence_increment", params.permanence_increment),
        ("connected_permanence", params.connected_permanence),
        ("epsilon", params.epsilon),
    ];
    for (name, value) in permanences {
        if !(0.0..=1.0).contains(&value) {
            return Err(NaaError::InvalidConfiguration {
                name,
                message: format!("{value} is outside [0, 1]"),
            });
        }
    }

    // New synapses must survive their first adaptation pass.
    if params.initial_permanence < params.epsilon {
        return Err(NaaError::InvalidConfiguration {
            name: "initial_permanence",
            message: format!(
                "{} is below epsilon ({})",
                params.initial_permanence, params.epsilon
            ),
        });
    }

    if params.max_segments_per_cell == 0 {
        return Err(NaaError::InvalidConfiguration {
            name: "max_segments_per_cell",
            message: "Must be > 0".to_string(),
        });
    }
    if params.max_synapses_per_segment == 0 {
        return Err(NaaError::InvalidConfiguration {
            name: "max_synapses_per_segment",
            message: "Must be > 0".to_string(),
        });
    }
    // Connected synapses are counted in a SynapseIdx.
    if params.max_synapses_per_segment > SynapseIdx::MAX as usize {
        return Err(NaaError::InvalidConfiguration {
            name: "max_synapses_per_segment",
            message: format!(
                "{} exceeds the per-segment limit ({})",
                params.max_synapses_per_segment,
                SynapseIdx::MAX
            ),
        });
    }

    Ok(())
}
