//! Association algorithms implementation.
//!
//! - **Connections**: The segment/synapse graph of an area
//! - **Association Memory**: Learns links between the active cells of two areas
//! - **Activity**: Segment classification and per-cycle results

mod activity;
mod association;
mod connections;

pub use activity::{AreaCycle, ComputeCycle, SegmentActivity, SegmentClasses};
pub use association::{AssociationMemory, AssociationMemoryParams};
pub use connections::{CellData, Connections, ConnectionsParams, SegmentData, SynapseData};
