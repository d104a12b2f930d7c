// SPDX-License-Identifier: AGPL-3.0-only

//! Thread-per-rank launcher.
//!
//! A mesh run spawns one worker thread per rank of the Cartesian grid, wires
//! every (neighbour, direction) halo channel up front, and hands each worker
//! its [`RankContext`]. Workers build their own [`Lattice`] from the shared
//! [`GridConfig`] plus their topology, so no geometry crosses a channel.
//!
//! Worker results come back ordered by rank. A worker panic is fatal and
//! resurfaces on the launcher thread; a worker error aborts the run with the
//! first error in rank order.

use std::sync::mpsc;
use std::thread;

use crate::error::TidepoolError;
use crate::grid::comm::{Collective, HaloLinks};
use crate::grid::lattice::{CartTopology, Direction, GridConfig};

/// Everything a rank needs to communicate: its place in the grid, its halo
/// endpoints, and the group collectives.
pub struct RankContext {
    /// This rank's coordinates in the Cartesian grid.
    pub topology: CartTopology,
    /// Halo channels toward each present neighbour.
    pub links: HaloLinks,
    /// Blocking collectives shared by the whole mesh.
    pub collective: Collective,
}

/// Wire the halo channels for every rank of a `ranks_x x ranks_y` grid.
///
/// For each rank and each direction with a neighbour, a channel is created
/// whose sender sits in the rank's `send` slot and whose receiver sits in the
/// neighbour's *opposite* `recv` slot. Self-wrap on periodic axes falls out
/// of the same wiring (the neighbour may be the rank itself).
#[must_use]
pub fn wire_links(config: &GridConfig, ranks_x: usize, ranks_y: usize) -> Vec<HaloLinks> {
    let n = ranks_x * ranks_y;
    let mut links: Vec<HaloLinks> = (0..n).map(|_| HaloLinks::isolated()).collect();
    for rank in 0..n {
        let topo = CartTopology::from_rank(ranks_x, ranks_y, rank);
        for dir in Direction::ALL {
            if let Some(peer) = topo.neighbor(dir, config.periodic_x, config.periodic_y) {
                let (tx, rx) = mpsc::channel();
                links[rank].send[dir.index()] = Some(tx);
                links[peer].recv[dir.opposite().index()] = Some(rx);
            }
        }
    }
    links
}

/// Context for running single-rank code without spawning a mesh.
#[must_use]
pub fn solo_context(config: &GridConfig) -> RankContext {
    let mut links = wire_links(config, 1, 1);
    RankContext {
        topology: CartTopology::single(),
        links: links.remove(0),
        collective: Collective::solo(),
    }
}

/// Run `worker` once per rank of a `ranks_x x ranks_y` mesh and collect the
/// results in rank order.
///
/// # Errors
///
/// The first worker error in rank order; a worker panic propagates.
pub fn run<T, F>(
    config: &GridConfig,
    ranks_x: usize,
    ranks_y: usize,
    worker: F,
) -> Result<Vec<T>, TidepoolError>
where
    T: Send,
    F: Fn(RankContext) -> Result<T, TidepoolError> + Sync,
{
    let n = ranks_x * ranks_y;
    let all_links = wire_links(config, ranks_x, ranks_y);
    let collectives = Collective::group(n);

    let worker = &worker;
    let outcomes: Vec<Result<T, TidepoolError>> = thread::scope(|scope| {
        let handles: Vec<_> = all_links
            .into_iter()
            .zip(collectives)
            .enumerate()
            .map(|(rank, (links, collective))| {
                let ctx = RankContext {
                    topology: CartTopology::from_rank(ranks_x, ranks_y, rank),
                    links,
                    collective,
                };
                scope.spawn(move || worker(ctx))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(outcome) => outcome,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    });

    outcomes.into_iter().collect()
}
