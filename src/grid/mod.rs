// SPDX-License-Identifier: Apache-2.0
//! The grid: cell records, the shared-state header, accumulation
//! buffers, the spatial level-of-detail quad-tree, and the canonical
//! double-buffered state container (§3).

pub mod accum;
pub mod cell;
pub mod header;
pub mod quadtree;
pub mod state;

pub use accum::{AccumulationBuffers, CellAccumulator};
pub use cell::{Cell, ConductivityTensor, InterventionState, LodLevel, SOIL_LAYERS};
pub use header::{FieldOffsets, SharedStateHeader, HEADER_SIZE, MAGIC, SCHEMA_VERSION};
pub use quadtree::{LodState, QuadNode, QuadTree};
pub use state::{CanonicalState, CellStorage, StateBuffer};
