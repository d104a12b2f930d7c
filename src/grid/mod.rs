// SPDX-License-Identifier: AGPL-3.0-only

//! Grid geometry and the rank mesh.
//!
//! A run decomposes the global rectangle over a 2-D Cartesian grid of ranks.
//! Each rank owns one tile: an inner box it is authoritative for, plus a halo
//! ring replicating neighbour data so the evolution stencil can be evaluated
//! near tile edges.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `lattice` | Global geometry, axis partition, tile boxes, neighbour map |
//! | `comm` | Halo channels and collective reductions between ranks |
//! | `mesh` | Channel wiring and the thread-per-rank launcher |

/// Halo channels and collective reductions between ranks.
pub mod comm;
/// Global geometry, axis partition, tile boxes, neighbour map.
pub mod lattice;
/// Channel wiring and the thread-per-rank launcher.
pub mod mesh;
