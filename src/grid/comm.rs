// SPDX-License-Identifier: AGPL-3.0-only

//! Rank-to-rank communication: halo channels and collective reductions.
//!
//! Halo traffic uses one dedicated `mpsc` channel per (neighbour, direction)
//! pair, wired once at mesh construction. A send is non-blocking (the channel
//! buffers), so `start_halo_exchange` can post every band and return; the
//! matching receives happen in `wait_for_completion`, which is the only
//! blocking point of an iteration. On a periodic axis with a single rank the
//! channels loop back to the rank itself, so the same code path performs the
//! local opposite-band copy.
//!
//! Collectives go through a shared slot table guarded by a barrier: every
//! rank deposits its partial values, waits, and reads the reduction. All
//! ranks therefore observe the same reduced result — including a NaN, which
//! is how the mesh halts together on numerical blow-up.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

use crate::error::TidepoolError;
use crate::grid::lattice::Direction;

/// One halo band in flight: the sending component plus both quadratures.
#[derive(Debug)]
pub struct HaloMsg {
    /// Component index the band belongs to.
    pub which: usize,
    /// Real part, row-major over the band.
    pub re: Vec<f64>,
    /// Imaginary part.
    pub im: Vec<f64>,
}

/// Per-rank halo endpoints, indexed by [`Direction::index`].
///
/// A slot is `Some` exactly when the lattice has a neighbour in that
/// direction; the kernel never checks geometry twice.
#[derive(Debug, Default)]
pub struct HaloLinks {
    /// Outbound band channels.
    pub send: [Option<Sender<HaloMsg>>; 8],
    /// Inbound band channels.
    pub recv: [Option<Receiver<HaloMsg>>; 8],
}

impl HaloLinks {
    /// Endpoints for a rank with no neighbours at all.
    #[must_use]
    pub fn isolated() -> Self {
        Self::default()
    }

    /// Whether a neighbour is wired in `dir`.
    #[must_use]
    pub fn present(&self, dir: Direction) -> bool {
        self.send[dir.index()].is_some()
    }
}

struct CollectiveShared {
    barrier: Barrier,
    slots: Mutex<Vec<Vec<f64>>>,
}

/// Handle to the blocking collectives of one rank group.
///
/// Cloneable; every clone refers to the same group. All ranks of a group
/// must call the same collectives in the same order or the barrier
/// deadlocks; the solver guarantees this by construction, since reductions
/// are the only blocking points besides the halo wait.
#[derive(Clone)]
pub struct Collective {
    rank: usize,
    shared: Arc<CollectiveShared>,
}

impl Collective {
    /// Create the collectives for an `n_ranks` group, one handle per rank.
    #[must_use]
    pub fn group(n_ranks: usize) -> Vec<Self> {
        let shared = Arc::new(CollectiveShared {
            barrier: Barrier::new(n_ranks),
            slots: Mutex::new(vec![Vec::new(); n_ranks]),
        });
        (0..n_ranks)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Collective handle for a single-rank run.
    #[must_use]
    pub fn solo() -> Self {
        let mut group = Self::group(1);
        group.remove(0)
    }

    /// This rank's index within the group.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the group.
    #[must_use]
    pub fn n_ranks(&self) -> usize {
        self.shared.slots.lock().map_or(1, |s| s.len())
    }

    /// Element-wise sum of `local` across all ranks; every rank receives
    /// the same totals. Panics in another rank poison the mutex and
    /// propagate as a panic here, which is the intended fatal path.
    #[must_use]
    pub fn all_sum(&self, local: &[f64]) -> Vec<f64> {
        let gathered = self.all_gather(local.to_vec());
        let mut total = vec![0.0; local.len()];
        for slot in &gathered {
            for (t, v) in total.iter_mut().zip(slot) {
                *t += v;
            }
        }
        total
    }

    /// [`Self::all_sum`] plus the blow-up invariant: a non-finite total is
    /// returned as an error on every rank simultaneously.
    ///
    /// # Errors
    ///
    /// [`TidepoolError::NumericalBlowup`] when any reduced value is not
    /// finite.
    pub fn checked_all_sum(&self, local: &[f64]) -> Result<Vec<f64>, TidepoolError> {
        let total = self.all_sum(local);
        if total.iter().all(|v| v.is_finite()) {
            Ok(total)
        } else {
            Err(TidepoolError::NumericalBlowup(
                "collective reduction produced a non-finite value".into(),
            ))
        }
    }

    /// Gather every rank's vector; the result is indexed by rank and
    /// identical on all ranks.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // mutex poisoning is the fatal path
    pub fn all_gather(&self, local: Vec<f64>) -> Vec<Vec<f64>> {
        {
            let mut slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots[self.rank] = local;
        }
        self.shared.barrier.wait();
        let gathered = {
            let slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.clone()
        };
        // Second barrier: nobody overwrites a slot before everyone has read.
        self.shared.barrier.wait();
        gathered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn solo_all_sum_is_identity() {
        let coll = Collective::solo();
        assert_eq!(coll.all_sum(&[1.5, -2.0]), vec![1.5, -2.0]);
    }

    #[test]
    fn group_all_sum_totals_every_rank() {
        let group = Collective::group(4);
        let handles: Vec<_> = group
            .into_iter()
            .map(|coll| {
                thread::spawn(move || {
                    let r = coll.rank() as f64;
                    coll.all_sum(&[r, 1.0])
                })
            })
            .collect();
        for h in handles {
            let total = h.join().expect("rank thread");
            assert_eq!(total, vec![6.0, 4.0]);
        }
    }

    #[test]
    fn checked_all_sum_flags_nan_on_all_ranks() {
        let group = Collective::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|coll| {
                thread::spawn(move || {
                    let local = if coll.rank() == 0 { f64::NAN } else { 1.0 };
                    coll.checked_all_sum(&[local]).is_err()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().expect("rank thread"), "every rank sees the NaN");
        }
    }

    #[test]
    fn all_gather_orders_by_rank() {
        let group = Collective::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|coll| {
                thread::spawn(move || {
                    let r = coll.rank() as f64;
                    coll.all_gather(vec![r])
                })
            })
            .collect();
        for h in handles {
            let gathered = h.join().expect("rank thread");
            assert_eq!(gathered, vec![vec![0.0], vec![1.0], vec![2.0]]);
        }
    }
}
