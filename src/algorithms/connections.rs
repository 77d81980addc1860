//! Connections - the segment and synapse graph of one cortical area.
//!
//! Segments and synapses live in flat arenas addressed by stable identifiers.
//! A segment is the owner of its synapses; the receptor index keyed by the
//! presynaptic [`CellRef`] is a non-owning lookup that is updated in the same
//! call as the owning segment, never separately.

use crate::error::{NaaError, Result};
use crate::types::{
    CellIdx, CellRef, Permanence, Segment, SegmentKind, Synapse, SynapseIdx, MAX_PERMANENCE,
    MIN_PERMANENCE,
};
use crate::utils::Random;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Marker stored in the permanence of a destroyed synapse slot.
const DESTROYED: Permanence = -1.0;

/// Data associated with a synapse.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseData {
    /// The presynaptic (source) cell.
    pub presynaptic_cell: CellRef,

    /// The permanence strength of this synapse.
    pub permanence: Permanence,

    /// The segment this synapse belongs to.
    pub segment: Segment,
}

/// Data associated with a segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentData {
    /// The synapses on this segment, in insertion order.
    pub synapses: SmallVec<[Synapse; 32]>,

    /// The cell this segment belongs to.
    pub cell: CellIdx,

    /// Apical or distal. Never changes after creation.
    pub kind: SegmentKind,

    /// Iteration at which the segment was created or last adapted.
    pub last_used_iteration: u64,

    /// Number of connected synapses (permanence >= threshold).
    pub num_connected: SynapseIdx,

    /// Creation order, used to break LRU ties.
    ordinal: u64,
}

impl SegmentData {
    fn new(cell: CellIdx, kind: SegmentKind, iteration: u64, ordinal: u64) -> Self {
        Self {
            synapses: SmallVec::new(),
            cell,
            kind,
            last_used_iteration: iteration,
            num_connected: 0,
            ordinal,
        }
    }

    /// Total number of synapses on the segment.
    #[inline]
    pub fn num_synapses(&self) -> usize {
        self.synapses.len()
    }
}

/// Data associated with a cell.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellData {
    /// Apical segments, in creation order.
    pub apical: SmallVec<[Segment; 8]>,

    /// Distal segments, in creation order.
    pub distal: SmallVec<[Segment; 8]>,
}

impl CellData {
    /// Segments of the given kind.
    #[inline]
    pub fn segments(&self, kind: SegmentKind) -> &[Segment] {
        match kind {
            SegmentKind::Apical => &self.apical,
            SegmentKind::Distal => &self.distal,
        }
    }

    fn segments_mut(&mut self, kind: SegmentKind) -> &mut SmallVec<[Segment; 8]> {
        match kind {
            SegmentKind::Apical => &mut self.apical,
            SegmentKind::Distal => &mut self.distal,
        }
    }
}

/// Parameters for creating a Connections instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectionsParams {
    /// Number of cells in the area.
    pub num_cells: CellIdx,

    /// Permanence threshold for a synapse to be considered connected.
    pub connected_threshold: Permanence,
}

impl Default for ConnectionsParams {
    fn default() -> Self {
        Self {
            num_cells: 0,
            connected_threshold: 0.5,
        }
    }
}

/// The segment/synapse graph rooted at the cells of one area.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Connections {
    /// All cells of the area.
    cells: Vec<CellData>,

    /// All segments (indexed by Segment).
    segments: Vec<SegmentData>,

    /// Destroyed segment indices (available for reuse).
    destroyed_segments: Vec<Segment>,

    /// All synapses (indexed by Synapse).
    synapses: Vec<SynapseData>,

    /// Destroyed synapse indices (available for reuse).
    destroyed_synapses: Vec<Synapse>,

    /// Permanence threshold for connected synapses.
    connected_threshold: Permanence,

    /// Presynaptic cell -> synapses it feeds on segments of this area.
    receptor_synapses: AHashMap<CellRef, Vec<Synapse>>,

    /// Next segment creation ordinal.
    next_ordinal: u64,

    /// Statistics: number of destroyed synapses.
    pruned_synapses: usize,

    /// Statistics: number of destroyed segments.
    pruned_segments: usize,
}

impl Connections {
    /// Creates a new Connections instance with the given parameters.
    pub fn new(params: ConnectionsParams) -> Self {
        Self {
            cells: vec![CellData::default(); params.num_cells as usize],
            segments: Vec::new(),
            destroyed_segments: Vec::new(),
            synapses: Vec::new(),
            destroyed_synapses: Vec::new(),
            connected_threshold: params.connected_threshold,
            receptor_synapses: AHashMap::new(),
            next_ordinal: 0,
            pruned_synapses: 0,
            pruned_segments: 0,
        }
    }

    /// Creates a Connections instance with the default connected threshold.
    pub fn with_cells(num_cells: CellIdx) -> Self {
        Self::new(ConnectionsParams {
            num_cells,
            ..Default::default()
        })
    }

    /// Returns the number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the connected threshold.
    #[inline]
    pub fn connected_threshold(&self) -> Permanence {
        self.connected_threshold
    }

    /// Changes the connected threshold and recounts connected synapses.
    pub fn set_connected_threshold(&mut self, threshold: Permanence) {
        self.connected_threshold = threshold;

        let live: Vec<Segment> = self
            .cells
            .iter()
            .flat_map(|c| c.apical.iter().chain(c.distal.iter()).copied())
            .collect();
        for segment in live {
            let connected = self.segments[segment as usize]
                .synapses
                .iter()
                .filter(|&&s| self.synapses[s as usize].permanence >= threshold)
                .count();
            self.segments[segment as usize].num_connected = connected as SynapseIdx;
        }
    }

    /// Returns the number of live segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len() - self.destroyed_segments.len()
    }

    /// Returns the number of segments of one kind on a cell.
    pub fn num_segments_on_cell(&self, cell: CellIdx, kind: SegmentKind) -> usize {
        self.cells[cell as usize].segments(kind).len()
    }

    /// Returns the number of live synapses.
    pub fn num_synapses(&self) -> usize {
        self.synapses.len() - self.destroyed_synapses.len()
    }

    /// Returns the number of synapses on a specific segment.
    pub fn num_synapses_on_segment(&self, segment: Segment) -> usize {
        self.segments[segment as usize].synapses.len()
    }

    /// Total number of synapses destroyed so far.
    #[inline]
    pub fn pruned_synapses(&self) -> usize {
        self.pruned_synapses
    }

    /// Total number of segments destroyed so far.
    #[inline]
    pub fn pruned_segments(&self) -> usize {
        self.pruned_segments
    }

    // ========================================================================
    // Segment operations
    // ========================================================================

    /// Creates a new segment of `kind` on `cell`.
    ///
    /// If the cell already holds `max_segments_per_cell` segments of that
    /// kind, least recently used ones are destroyed first.
    ///
    /// # Arguments
    ///
    /// * `cell` - The cell to create the segment on
    /// * `kind` - Apical or distal
    /// * `iteration` - Current iteration, stored as the last-used iteration
    /// * `max_segments_per_cell` - Optional limit on segments of this kind per cell
    pub fn create_segment(
        &mut self,
        cell: CellIdx,
        kind: SegmentKind,
        iteration: u64,
        max_segments_per_cell: Option<usize>,
    ) -> Segment {
        if let Some(max) = max_segments_per_cell {
            while self.cells[cell as usize].segments(kind).len() >= max {
                let Some(lru) = self.least_recently_used_segment(cell, kind) else {
                    break;
                };
                trace!(
                    cell,
                    segment = lru,
                    %kind,
                    last_used = self.segments[lru as usize].last_used_iteration,
                    "evicting least recently used segment"
                );
                self.destroy_segment(lru);
            }
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let data = SegmentData::new(cell, kind, iteration, ordinal);

        let segment = if let Some(reuse) = self.destroyed_segments.pop() {
            self.segments[reuse as usize] = data;
            reuse
        } else {
            let segment = self.segments.len() as Segment;
            self.segments.push(data);
            segment
        };

        self.cells[cell as usize].segments_mut(kind).push(segment);
        segment
    }

    /// Destroys a segment and all its synapses.
    pub fn destroy_segment(&mut self, segment: Segment) {
        let synapses = self.segments[segment as usize].synapses.clone();
        for synapse in synapses {
            self.destroy_synapse(synapse);
        }

        let SegmentData { cell, kind, .. } = self.segments[segment as usize];
        let cell_segments = self.cells[cell as usize].segments_mut(kind);
        if let Some(pos) = cell_segments.iter().position(|&s| s == segment) {
            cell_segments.remove(pos);
        }

        self.destroyed_segments.push(segment);
        self.pruned_segments += 1;
    }

    /// Returns the segment of `kind` on `cell` with the smallest last-used
    /// iteration. Ties go to the earliest created segment.
    pub fn least_recently_used_segment(&self, cell: CellIdx, kind: SegmentKind) -> Option<Segment> {
        self.cells[cell as usize]
            .segments(kind)
            .iter()
            .copied()
            .min_by_key(|&s| {
                let data = &self.segments[s as usize];
                (data.last_used_iteration, data.ordinal)
            })
    }

    /// Marks the segment as used in `iteration`.
    #[inline]
    pub fn touch_segment(&mut self, segment: Segment, iteration: u64) {
        self.segments[segment as usize].last_used_iteration = iteration;
    }

    /// Gets the segments of one kind on a cell.
    #[inline]
    pub fn segments_for_cell(&self, cell: CellIdx, kind: SegmentKind) -> &[Segment] {
        self.cells[cell as usize].segments(kind)
    }

    /// Gets the cell data.
    #[inline]
    pub fn data_for_cell(&self, cell: CellIdx) -> &CellData {
        &self.cells[cell as usize]
    }

    /// Gets the cell that owns a segment.
    #[inline]
    pub fn cell_for_segment(&self, segment: Segment) -> CellIdx {
        self.segments[segment as usize].cell
    }

    /// Gets the segment data.
    #[inline]
    pub fn data_for_segment(&self, segment: Segment) -> &SegmentData {
        &self.segments[segment as usize]
    }

    // ========================================================================
    // Synapse operations
    // ========================================================================

    /// Creates a new synapse on a segment.
    ///
    /// A segment never holds two synapses from the same presynaptic cell: if
    /// one exists it is returned instead, its permanence raised if the new
    /// value is higher. When `max_synapses_per_segment` is given and the
    /// segment is full, minimum-permanence synapses are destroyed first.
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        presynaptic_cell: CellRef,
        permanence: Permanence,
        max_synapses_per_segment: Option<usize>,
    ) -> Synapse {
        let existing = self.segments[segment as usize]
            .synapses
            .iter()
            .find(|&&s| self.synapses[s as usize].presynaptic_cell == presynaptic_cell)
            .copied();

        if let Some(existing_synapse) = existing {
            let current_perm = self.synapses[existing_synapse as usize].permanence;
            if permanence > current_perm {
                self.update_synapse_permanence(existing_synapse, permanence);
            }
            return existing_synapse;
        }

        if let Some(max) = max_synapses_per_segment {
            while self.segments[segment as usize].synapses.len() >= max {
                let Some(weakest) = self.min_permanence_synapse(segment) else {
                    break;
                };
                trace!(
                    segment,
                    synapse = weakest,
                    permanence = self.synapses[weakest as usize].permanence,
                    "evicting minimum permanence synapse"
                );
                self.destroy_synapse(weakest);
            }
        }

        let permanence = permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE);
        let data = SynapseData {
            presynaptic_cell,
            permanence,
            segment,
        };

        let synapse = if let Some(reuse) = self.destroyed_synapses.pop() {
            self.synapses[reuse as usize] = data;
            reuse
        } else {
            let synapse = self.synapses.len() as Synapse;
            self.synapses.push(data);
            synapse
        };

        let segment_data = &mut self.segments[segment as usize];
        segment_data.synapses.push(synapse);
        if permanence >= self.connected_threshold {
            segment_data.num_connected += 1;
        }

        self.receptor_synapses
            .entry(presynaptic_cell)
            .or_default()
            .push(synapse);

        synapse
    }

    /// Destroys a synapse, detaching it from its segment and from the
    /// receptor index of its presynaptic cell.
    pub fn destroy_synapse(&mut self, synapse: Synapse) {
        let SynapseData {
            presynaptic_cell,
            permanence,
            segment,
        } = self.synapses[synapse as usize];
        let was_connected = permanence >= self.connected_threshold;

        let segment_data = &mut self.segments[segment as usize];
        if let Some(pos) = segment_data.synapses.iter().position(|&s| s == synapse) {
            segment_data.synapses.remove(pos);
        }
        if was_connected {
            segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
        }

        if let Some(receptors) = self.receptor_synapses.get_mut(&presynaptic_cell) {
            if let Some(pos) = receptors.iter().position(|&s| s == synapse) {
                receptors.swap_remove(pos);
            }
            if receptors.is_empty() {
                self.receptor_synapses.remove(&presynaptic_cell);
            }
        }

        self.synapses[synapse as usize].permanence = DESTROYED;
        self.destroyed_synapses.push(synapse);
        self.pruned_synapses += 1;
    }

    /// Updates a synapse's permanence value (clamped to [0, 1]).
    pub fn update_synapse_permanence(&mut self, synapse: Synapse, permanence: Permanence) {
        let permanence = permanence.clamp(MIN_PERMANENCE, MAX_PERMANENCE);
        let synapse_data = &mut self.synapses[synapse as usize];
        let was_connected = synapse_data.permanence >= self.connected_threshold;
        let is_connected = permanence >= self.connected_threshold;
        synapse_data.permanence = permanence;

        let segment = &mut self.segments[synapse_data.segment as usize];
        if is_connected && !was_connected {
            segment.num_connected += 1;
        } else if was_connected && !is_connected {
            segment.num_connected = segment.num_connected.saturating_sub(1);
        }
    }

    /// Returns the synapse with the lowest permanence on the segment.
    /// Ties go to the earliest inserted synapse.
    pub fn min_permanence_synapse(&self, segment: Segment) -> Option<Synapse> {
        self.segments[segment as usize]
            .synapses
            .iter()
            .copied()
            .min_by(|&a, &b| {
                self.synapses[a as usize]
                    .permanence
                    .total_cmp(&self.synapses[b as usize].permanence)
            })
    }

    /// Gets the synapses on a segment.
    #[inline]
    pub fn synapses_for_segment(&self, segment: Segment) -> &[Synapse] {
        &self.segments[segment as usize].synapses
    }

    /// Gets the segment that owns a synapse.
    #[inline]
    pub fn segment_for_synapse(&self, synapse: Synapse) -> Segment {
        self.synapses[synapse as usize].segment
    }

    /// Gets the synapse data.
    #[inline]
    pub fn data_for_synapse(&self, synapse: Synapse) -> &SynapseData {
        &self.synapses[synapse as usize]
    }

    /// Gets the presynaptic cells for a segment.
    pub fn presynaptic_cells_for_segment(&self, segment: Segment) -> Vec<CellRef> {
        self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| self.synapses[s as usize].presynaptic_cell)
            .collect()
    }

    /// Synapses fed by `cell` on segments of this area.
    pub fn receptor_synapses(&self, cell: CellRef) -> &[Synapse] {
        self.receptor_synapses
            .get(&cell)
            .map_or(&[], Vec::as_slice)
    }

    /// True if `presynaptic_cell` already feeds a synapse on `segment`.
    pub fn are_connected(&self, presynaptic_cell: CellRef, segment: Segment) -> bool {
        self.receptor_synapses(presynaptic_cell)
            .iter()
            .any(|&s| self.synapses[s as usize].segment == segment)
    }

    /// Filters `cells` down to those owning a segment of `kind` that receives
    /// a synapse from any of `presynaptic_cells`. Input order is preserved.
    pub fn cells_connected_to(
        &self,
        cells: &[CellIdx],
        presynaptic_cells: &[CellRef],
        kind: SegmentKind,
    ) -> Vec<CellIdx> {
        let owners: AHashSet<CellIdx> = presynaptic_cells
            .iter()
            .flat_map(|&c| self.receptor_synapses(c))
            .map(|&s| &self.segments[self.synapses[s as usize].segment as usize])
            .filter(|seg| seg.kind == kind)
            .map(|seg| seg.cell)
            .collect();

        cells
            .iter()
            .copied()
            .filter(|c| owners.contains(c))
            .collect()
    }

    // ========================================================================
    // Learning operations
    // ========================================================================

    /// Strengthens the synapses of a segment whose presynaptic cell is active.
    ///
    /// Synapses from inactive cells are left unchanged. Synapses that end
    /// below `epsilon` are destroyed, and an empty segment is destroyed too.
    ///
    /// Returns `false` if the segment no longer exists afterwards.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        active_inputs: &AHashSet<CellRef>,
        increment: Permanence,
        epsilon: Permanence,
        iteration: u64,
    ) -> bool {
        self.touch_segment(segment, iteration);

        let synapses = self.segments[segment as usize].synapses.clone();
        let mut synapses_to_destroy = Vec::new();

        for synapse in synapses {
            let synapse_data = &self.synapses[synapse as usize];
            let old_perm = synapse_data.permanence;

            let mut new_perm = old_perm;
            if active_inputs.contains(&synapse_data.presynaptic_cell) {
                new_perm += increment;
            }
            let new_perm = new_perm.clamp(MIN_PERMANENCE, MAX_PERMANENCE);

            if new_perm < epsilon {
                synapses_to_destroy.push(synapse);
            } else if new_perm != old_perm {
                self.update_synapse_permanence(synapse, new_perm);
            }
        }

        for synapse in synapses_to_destroy {
            self.destroy_synapse(synapse);
        }

        if self.segments[segment as usize].synapses.is_empty() {
            self.destroy_segment(segment);
            return false;
        }
        true
    }

    /// Grows up to `n_desired` synapses on `segment` from randomly chosen
    /// `candidates` that are not yet connected to it.
    ///
    /// Candidates are de-duplicated and sorted by [`CellRef`] order before the
    /// draw, so the result depends only on the candidate set and the state of
    /// `rng`. Each draw removes the chosen candidate from the pool.
    ///
    /// Returns the number of synapses created.
    pub fn grow_synapses(
        &mut self,
        segment: Segment,
        candidates: &[CellRef],
        initial_permanence: Permanence,
        n_desired: usize,
        max_synapses_per_segment: Option<usize>,
        rng: &mut Random,
    ) -> usize {
        let mut pool: Vec<CellRef> = candidates.to_vec();
        pool.sort_unstable();
        pool.dedup();

        let existing: AHashSet<CellRef> = self
            .presynaptic_cells_for_segment(segment)
            .into_iter()
            .collect();
        pool.retain(|c| !existing.contains(c));

        let num_new = n_desired.min(pool.len());
        for _ in 0..num_new {
            let idx = rng.get_usize(pool.len());
            let cell = pool.remove(idx);
            self.create_synapse(segment, cell, initial_permanence, max_synapses_per_segment);
        }

        num_new
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Verifies that segments, synapses and the receptor index agree.
    ///
    /// Checked: every listed segment is owned by the listing cell with the
    /// listed kind; every synapse on a segment points back at it and is in the
    /// receptor index of its presynaptic cell; no segment holds two synapses
    /// from one cell; connected counts are accurate; the receptor index holds
    /// nothing else; and the live counts match the arenas.
    pub fn check_consistency(&self) -> Result<()> {
        let violation = |msg: String| Err(NaaError::InvariantViolation(msg));

        let mut live_synapses = 0usize;
        let mut live_segments = 0usize;

        for (cell, data) in self.cells.iter().enumerate() {
            for kind in [SegmentKind::Apical, SegmentKind::Distal] {
                for &segment in data.segments(kind) {
                    live_segments += 1;
                    let seg = &self.segments[segment as usize];
                    if seg.cell as usize != cell || seg.kind != kind {
                        return violation(format!(
                            "segment {segment} listed as {kind} on cell {cell} but owned by cell {} as {}",
                            seg.cell, seg.kind
                        ));
                    }

                    let mut sources = AHashSet::new();
                    let mut connected = 0usize;
                    for &synapse in &seg.synapses {
                        live_synapses += 1;
                        let syn = &self.synapses[synapse as usize];
                        if syn.segment != segment || syn.permanence < MIN_PERMANENCE {
                            return violation(format!(
                                "synapse {synapse} on segment {segment} is stale or owned elsewhere"
                            ));
                        }
                        if !sources.insert(syn.presynaptic_cell) {
                            return violation(format!(
                                "segment {segment} has parallel synapses from {}",
                                syn.presynaptic_cell
                            ));
                        }
                        if !self.receptor_synapses(syn.presynaptic_cell).contains(&synapse) {
                            return violation(format!(
                                "synapse {synapse} missing from receptor index of {}",
                                syn.presynaptic_cell
                            ));
                        }
                        if syn.permanence >= self.connected_threshold {
                            connected += 1;
                        }
                    }
                    if connected != seg.num_connected as usize {
                        return violation(format!(
                            "segment {segment} counts {} connected synapses, found {connected}",
                            seg.num_connected
                        ));
                    }
                }
            }
        }

        let indexed: usize = self.receptor_synapses.values().map(Vec::len).sum();
        if indexed != live_synapses {
            return violation(format!(
                "receptor index holds {indexed} synapses, segments hold {live_synapses}"
            ));
        }
        for (cell, receptors) in &self.receptor_synapses {
            if let Some(&s) = receptors
                .iter()
                .find(|&&s| self.synapses[s as usize].presynaptic_cell != *cell)
            {
                return violation(format!("receptor index of {cell} holds foreign synapse {s}"));
            }
        }

        if live_synapses != self.num_synapses() || live_segments != self.num_segments() {
            return violation(format!(
                "arena counts ({} segments, {} synapses) disagree with graph ({live_segments}, {live_synapses})",
                self.num_segments(),
                self.num_synapses()
            ));
        }

        Ok(())
    }
}

impl PartialEq for Connections {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
            && self.segments == other.segments
            && self.synapses == other.synapses
            && (self.connected_threshold - other.connected_threshold).abs() < 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APICAL: SegmentKind = SegmentKind::Apical;

    fn src(index: CellIdx) -> CellRef {
        CellRef::new(1, index)
    }

    #[test]
    fn test_create_connections() {
        let conn = Connections::with_cells(100);
        assert_eq!(conn.num_cells(), 100);
        assert_eq!(conn.num_segments(), 0);
        assert_eq!(conn.num_synapses(), 0);
    }

    #[test]
    fn test_create_segment() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 3, None);

        assert_eq!(conn.num_segments(), 1);
        assert_eq!(conn.cell_for_segment(seg), 10);
        assert_eq!(conn.segments_for_cell(10, APICAL), &[seg]);
        assert!(conn.segments_for_cell(10, SegmentKind::Distal).is_empty());
        assert_eq!(conn.data_for_segment(seg).last_used_iteration, 3);
        assert_eq!(conn.data_for_segment(seg).kind, APICAL);
    }

    #[test]
    fn test_create_synapse_indexes_receptor() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        let syn = conn.create_synapse(seg, src(50), 0.5, None);

        assert_eq!(conn.num_synapses(), 1);
        assert_eq!(conn.segment_for_synapse(syn), seg);
        assert_eq!(conn.data_for_synapse(syn).presynaptic_cell, src(50));
        assert_eq!(conn.receptor_synapses(src(50)), &[syn]);
        assert!(conn.are_connected(src(50), seg));
        assert!(!conn.are_connected(src(51), seg));
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_connected_count() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        conn.create_synapse(seg, src(50), 0.6, None);
        conn.create_synapse(seg, src(51), 0.4, None);
        conn.create_synapse(seg, src(52), 0.5, None); // At threshold

        assert_eq!(conn.data_for_segment(seg).num_connected, 2);

        conn.set_connected_threshold(0.65);
        assert_eq!(conn.data_for_segment(seg).num_connected, 0);
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_update_permanence() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        let syn = conn.create_synapse(seg, src(50), 0.4, None);

        assert_eq!(conn.data_for_segment(seg).num_connected, 0);

        conn.update_synapse_permanence(syn, 0.6);
        assert_eq!(conn.data_for_segment(seg).num_connected, 1);

        conn.update_synapse_permanence(syn, 1.7);
        assert_eq!(conn.data_for_synapse(syn).permanence, 1.0);
        assert_eq!(conn.data_for_segment(seg).num_connected, 1);
    }

    #[test]
    fn test_destroy_synapse() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        let syn = conn.create_synapse(seg, src(50), 0.5, None);

        conn.destroy_synapse(syn);
        assert_eq!(conn.num_synapses(), 0);
        assert_eq!(conn.num_synapses_on_segment(seg), 0);
        assert!(conn.receptor_synapses(src(50)).is_empty());
        assert_eq!(conn.pruned_synapses(), 1);
    }

    #[test]
    fn test_destroy_segment() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        conn.create_synapse(seg, src(50), 0.5, None);
        conn.create_synapse(seg, src(51), 0.5, None);

        conn.destroy_segment(seg);
        assert_eq!(conn.num_segments(), 0);
        assert_eq!(conn.num_synapses(), 0);
        assert!(conn.segments_for_cell(10, APICAL).is_empty());
        assert!(conn.receptor_synapses(src(50)).is_empty());
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_slot_reuse_keeps_graph_consistent() {
        let mut conn = Connections::with_cells(10);
        let a = conn.create_segment(1, APICAL, 0, None);
        conn.create_synapse(a, src(1), 0.3, None);
        conn.destroy_segment(a);

        let b = conn.create_segment(2, APICAL, 1, None);
        assert_eq!(a, b);
        let syn = conn.create_synapse(b, src(2), 0.3, None);
        assert_eq!(conn.segment_for_synapse(syn), b);
        assert_eq!(conn.cell_for_segment(b), 2);
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_duplicate_synapse_prevention() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);

        let syn1 = conn.create_synapse(seg, src(50), 0.5, None);
        let syn2 = conn.create_synapse(seg, src(50), 0.3, None);

        assert_eq!(syn1, syn2);
        assert_eq!(conn.num_synapses_on_segment(seg), 1);
        assert!((conn.data_for_synapse(syn1).permanence - 0.5).abs() < 1e-6);

        conn.create_synapse(seg, src(50), 0.8, None);
        assert!((conn.data_for_synapse(syn1).permanence - 0.8).abs() < 1e-6);
        assert_eq!(conn.receptor_synapses(src(50)).len(), 1);
    }

    #[test]
    fn test_max_synapses_evicts_min_permanence() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        conn.create_synapse(seg, src(1), 0.4, Some(3));
        let weakest = conn.create_synapse(seg, src(2), 0.2, Some(3));
        conn.create_synapse(seg, src(3), 0.3, Some(3));

        assert_eq!(conn.min_permanence_synapse(seg), Some(weakest));

        conn.create_synapse(seg, src(4), 0.9, Some(3));
        assert_eq!(conn.num_synapses_on_segment(seg), 3);
        assert!(!conn.are_connected(src(2), seg));
        assert!(conn.are_connected(src(4), seg));
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_min_permanence_tie_goes_to_first_inserted() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        let first = conn.create_synapse(seg, src(7), 0.21, None);
        conn.create_synapse(seg, src(3), 0.21, None);
        conn.create_synapse(seg, src(5), 0.21, None);

        assert_eq!(conn.min_permanence_synapse(seg), Some(first));

        conn.create_synapse(seg, src(9), 0.21, Some(3));
        assert!(!conn.are_connected(src(7), seg));
        assert_eq!(
            conn.presynaptic_cells_for_segment(seg),
            vec![src(3), src(5), src(9)]
        );
    }

    #[test]
    fn test_max_segments_evicts_least_recently_used() {
        let mut conn = Connections::with_cells(100);

        let old = conn.create_segment(10, APICAL, 5, Some(2));
        conn.create_synapse(old, src(50), 0.5, None);
        let recent = conn.create_segment(10, APICAL, 1, Some(2));
        conn.create_synapse(recent, src(51), 0.5, None);
        conn.touch_segment(recent, 9);

        let newest = conn.create_segment(10, APICAL, 10, Some(2));

        let segments = conn.segments_for_cell(10, APICAL);
        assert_eq!(segments, &[recent, newest]);
        assert!(conn.receptor_synapses(src(50)).is_empty());
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_lru_tie_goes_to_earliest_created() {
        let mut conn = Connections::with_cells(10);
        let first = conn.create_segment(0, APICAL, 4, None);
        conn.create_segment(0, APICAL, 4, None);
        assert_eq!(conn.least_recently_used_segment(0, APICAL), Some(first));
    }

    #[test]
    fn test_segment_limit_is_per_kind() {
        let mut conn = Connections::with_cells(10);
        let distal = conn.create_segment(0, SegmentKind::Distal, 0, Some(1));
        conn.create_segment(0, APICAL, 1, Some(1));
        conn.create_segment(0, APICAL, 2, Some(1));

        assert_eq!(conn.segments_for_cell(0, SegmentKind::Distal), &[distal]);
        assert_eq!(conn.num_segments_on_cell(0, APICAL), 1);
    }

    #[test]
    fn test_adapt_segment_only_strengthens() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        let syn1 = conn.create_synapse(seg, src(50), 0.5, None);
        let syn2 = conn.create_synapse(seg, src(51), 0.5, None);

        let active: AHashSet<CellRef> = [src(50)].into_iter().collect();
        assert!(conn.adapt_segment(seg, &active, 0.1, 1e-5, 4));

        assert!((conn.data_for_synapse(syn1).permanence - 0.6).abs() < 1e-6);
        assert!((conn.data_for_synapse(syn2).permanence - 0.5).abs() < 1e-6);
        assert_eq!(conn.data_for_segment(seg).last_used_iteration, 4);
    }

    #[test]
    fn test_adapt_segment_clamps_to_one() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        let syn = conn.create_synapse(seg, src(50), 0.95, None);

        let active: AHashSet<CellRef> = [src(50)].into_iter().collect();
        conn.adapt_segment(seg, &active, 0.1, 1e-5, 1);

        assert_eq!(conn.data_for_synapse(syn).permanence, 1.0);
    }

    #[test]
    fn test_adapt_segment_destroys_below_epsilon() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        conn.create_synapse(seg, src(50), 0.0, None);
        let kept = conn.create_synapse(seg, src(51), 0.0, None);

        let active: AHashSet<CellRef> = [src(51)].into_iter().collect();
        assert!(conn.adapt_segment(seg, &active, 0.1, 1e-5, 1));

        assert_eq!(conn.synapses_for_segment(seg), &[kept]);
        assert!(conn.receptor_synapses(src(50)).is_empty());
    }

    #[test]
    fn test_adapt_segment_destroys_empty_segment() {
        let mut conn = Connections::with_cells(100);
        let seg = conn.create_segment(10, APICAL, 0, None);
        conn.create_synapse(seg, src(50), 0.0, None);

        let active = AHashSet::new();
        assert!(!conn.adapt_segment(seg, &active, 0.1, 1e-5, 1));
        assert_eq!(conn.num_segments(), 0);
        assert!(conn.segments_for_cell(10, APICAL).is_empty());
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_grow_synapses() {
        let mut conn = Connections::with_cells(100);
        let mut rng = Random::new(42);

        let seg = conn.create_segment(10, APICAL, 0, None);
        conn.create_synapse(seg, src(50), 0.5, None);

        let candidates = [src(50), src(51), src(52), src(53)];
        let grown = conn.grow_synapses(seg, &candidates, 0.21, 2, None, &mut rng);

        // 50 is excluded because it already has a synapse
        assert_eq!(grown, 2);
        assert_eq!(conn.num_synapses_on_segment(seg), 3);
        conn.check_consistency().unwrap();
    }

    #[test]
    fn test_grow_synapses_limited_by_candidates() {
        let mut conn = Connections::with_cells(100);
        let mut rng = Random::new(1);
        let seg = conn.create_segment(0, APICAL, 0, None);

        let candidates = [src(3), src(1), src(3), src(2)];
        let grown = conn.grow_synapses(seg, &candidates, 0.21, 10, None, &mut rng);

        assert_eq!(grown, 3);
        let mut cells = conn.presynaptic_cells_for_segment(seg);
        cells.sort_unstable();
        assert_eq!(cells, vec![src(1), src(2), src(3)]);
    }

    #[test]
    fn test_grow_synapses_ignores_candidate_order() {
        let forward: Vec<CellRef> = (0..30).map(src).collect();
        let backward: Vec<CellRef> = forward.iter().rev().copied().collect();

        let grow = |candidates: &[CellRef]| {
            let mut conn = Connections::with_cells(4);
            let mut rng = Random::new(99);
            let seg = conn.create_segment(0, APICAL, 0, None);
            conn.grow_synapses(seg, candidates, 0.21, 5, None, &mut rng);
            conn.presynaptic_cells_for_segment(seg)
        };

        assert_eq!(grow(&forward), grow(&backward));
    }

    #[test]
    fn test_cells_connected_to() {
        let mut conn = Connections::with_cells(10);
        let a = conn.create_segment(2, APICAL, 0, None);
        conn.create_synapse(a, src(7), 0.3, None);
        let b = conn.create_segment(5, SegmentKind::Distal, 0, None);
        conn.create_synapse(b, src(7), 0.3, None);
        let c = conn.create_segment(6, APICAL, 0, None);
        conn.create_synapse(c, src(8), 0.3, None);

        let connected = conn.cells_connected_to(&[2, 5, 6, 9], &[src(7)], APICAL);
        assert_eq!(connected, vec![2]);
    }
}
