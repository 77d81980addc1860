//! Cortical areas: named, fixed-size populations of cells.

use crate::algorithms::{Connections, ConnectionsParams};
use crate::error::{NaaError, Result};
use crate::types::{AreaId, CellIdx, CellRef, Real};
use crate::utils::Random;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A named population of cells with a sparse set of currently active cells.
///
/// The area owns the segments and synapses grown on its cells. Only the
/// association engine mutates that graph; drivers set the active cells.
///
/// # Example
///
/// ```rust
/// use naa::types::CorticalArea;
///
/// let mut area = CorticalArea::new(1, "X", 1024);
/// area.set_active_cells(&[40, 3, 17, 3]).unwrap();
///
/// assert_eq!(area.active_cell_indices(), &[3, 17, 40]);
/// assert!(area.set_active_cells(&[2048]).is_err());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorticalArea {
    id: AreaId,
    name: String,
    /// Sorted, de-duplicated indices of active cells.
    active_cells: Vec<CellIdx>,
    connections: Connections,
}

impl CorticalArea {
    /// Creates an area with `num_cells` cells and no active cells.
    pub fn new(id: AreaId, name: impl Into<String>, num_cells: CellIdx) -> Self {
        Self {
            id,
            name: name.into(),
            active_cells: Vec::new(),
            connections: Connections::new(ConnectionsParams {
                num_cells,
                ..Default::default()
            }),
        }
    }

    /// Area identifier.
    #[inline]
    pub fn id(&self) -> AreaId {
        self.id
    }

    /// Area name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total cell capacity.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.connections.num_cells()
    }

    /// True if both areas share an identity.
    #[inline]
    pub fn same_area(&self, other: &CorticalArea) -> bool {
        self.id == other.id
    }

    /// Global reference to one of this area's cells.
    #[inline]
    pub fn cell_ref(&self, index: CellIdx) -> CellRef {
        CellRef::new(self.id, index)
    }

    /// Indices of the currently active cells, ascending.
    #[inline]
    pub fn active_cell_indices(&self) -> &[CellIdx] {
        &self.active_cells
    }

    /// Number of currently active cells.
    #[inline]
    pub fn num_active_cells(&self) -> usize {
        self.active_cells.len()
    }

    /// Currently active cells as global references, ascending.
    pub fn active_cells(&self) -> Vec<CellRef> {
        self.active_cells.iter().map(|&i| self.cell_ref(i)).collect()
    }

    /// True if the cell is currently active.
    pub fn is_active(&self, index: CellIdx) -> bool {
        self.active_cells.binary_search(&index).is_ok()
    }

    /// Replaces the active cell set.
    ///
    /// Indices are sorted and de-duplicated. On error the previous set is kept.
    pub fn set_active_cells(&mut self, indices: &[CellIdx]) -> Result<()> {
        let size = self.num_cells();
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= size) {
            return Err(NaaError::IndexOutOfBounds {
                index: bad as usize,
                size,
            });
        }

        let mut active = indices.to_vec();
        active.sort_unstable();
        active.dedup();
        self.active_cells = active;
        Ok(())
    }

    /// Activates `round(num_cells * sparsity)` distinct random cells.
    pub fn randomize_active_cells(&mut self, sparsity: Real, rng: &mut Random) {
        let size = self.num_cells();
        let num_active = ((size as Real) * sparsity.clamp(0.0, 1.0)).round() as usize;

        let mut active = rng.sample((0..size as CellIdx).collect(), num_active);
        active.sort_unstable();
        self.active_cells = active;
    }

    /// Segment/synapse graph of this area's cells.
    #[inline]
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    #[inline]
    pub(crate) fn connections_mut(&mut self) -> &mut Connections {
        &mut self.connections
    }
}
