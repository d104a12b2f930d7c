// SPDX-License-Identifier: AGPL-3.0-only

//! Lattice geometry: global rectangle, axis partition, tile boxes.
//!
//! The global inner domain has `dim_x x dim_y` points (`dim_y = 1` for 1-D
//! runs). Each axis is partitioned over the rank grid into contiguous chunks
//! as evenly as possible, remainder to the leading chunks. A tile adds a halo
//! of nominal width on each side that has a neighbour (another rank, or the
//! wrap-around image on a periodic axis); edges without a neighbour carry no
//! halo and evolve under Dirichlet-zero boundary conditions.
//!
//! Invariants maintained by [`Lattice::build`]:
//!   - tile width = inner width + left halo + right halo (per axis)
//!   - inner boxes are pairwise disjoint and cover the global domain
//!   - a halo side is present exactly when a neighbour exists on that side

use crate::error::TidepoolError;

/// Default halo width: the second-order splitting runs four kinetic passes
/// per axis per iteration, each consuming one halo cell of validity.
pub const DEFAULT_HALO: usize = 4;

/// Halo width under rotation: the shear passes double the per-axis count.
pub const ROTATION_HALO: usize = 8;

/// The eight Cartesian neighbour directions (four in 1-D: West/East).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Toward lower x.
    West,
    /// Toward higher x.
    East,
    /// Toward lower y.
    North,
    /// Toward higher y.
    South,
    /// Corner: lower x, lower y.
    NorthWest,
    /// Corner: higher x, lower y.
    NorthEast,
    /// Corner: lower x, higher y.
    SouthWest,
    /// Corner: higher x, higher y.
    SouthEast,
}

impl Direction {
    /// All directions, in the fixed channel-wiring order.
    pub const ALL: [Self; 8] = [
        Self::West,
        Self::East,
        Self::North,
        Self::South,
        Self::NorthWest,
        Self::NorthEast,
        Self::SouthWest,
        Self::SouthEast,
    ];

    /// Slot index into per-direction arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::West => 0,
            Self::East => 1,
            Self::North => 2,
            Self::South => 3,
            Self::NorthWest => 4,
            Self::NorthEast => 5,
            Self::SouthWest => 6,
            Self::SouthEast => 7,
        }
    }

    /// The direction a message sent this way arrives from.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::West => Self::East,
            Self::East => Self::West,
            Self::North => Self::South,
            Self::South => Self::North,
            Self::NorthWest => Self::SouthEast,
            Self::NorthEast => Self::SouthWest,
            Self::SouthWest => Self::NorthEast,
            Self::SouthEast => Self::NorthWest,
        }
    }

    /// Coordinate step `(dx, dy)` on the rank grid.
    #[must_use]
    pub const fn step(self) -> (i64, i64) {
        match self {
            Self::West => (-1, 0),
            Self::East => (1, 0),
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::NorthWest => (-1, -1),
            Self::NorthEast => (1, -1),
            Self::SouthWest => (-1, 1),
            Self::SouthEast => (1, 1),
        }
    }
}

/// Position of one rank in the 2-D Cartesian rank grid.
#[derive(Clone, Copy, Debug)]
pub struct CartTopology {
    /// Ranks along x.
    pub ranks_x: usize,
    /// Ranks along y.
    pub ranks_y: usize,
    /// This rank's x coordinate.
    pub coord_x: usize,
    /// This rank's y coordinate.
    pub coord_y: usize,
}

impl CartTopology {
    /// The trivial single-rank topology.
    #[must_use]
    pub const fn single() -> Self {
        Self {
            ranks_x: 1,
            ranks_y: 1,
            coord_x: 0,
            coord_y: 0,
        }
    }

    /// Topology for linear `rank` in a `ranks_x x ranks_y` grid
    /// (row-major: rank = `coord_y * ranks_x + coord_x`).
    #[must_use]
    pub const fn from_rank(ranks_x: usize, ranks_y: usize, rank: usize) -> Self {
        Self {
            ranks_x,
            ranks_y,
            coord_x: rank % ranks_x,
            coord_y: rank / ranks_x,
        }
    }

    /// Total rank count.
    #[must_use]
    pub const fn n_ranks(&self) -> usize {
        self.ranks_x * self.ranks_y
    }

    /// This rank's linear index.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.coord_y * self.ranks_x + self.coord_x
    }

    /// Rank of the neighbour in `dir`, honouring per-axis periodicity.
    /// `None` when the step leaves a non-periodic axis.
    #[must_use]
    pub fn neighbor(&self, dir: Direction, periodic_x: bool, periodic_y: bool) -> Option<usize> {
        let (sx, sy) = dir.step();
        let nx = wrap_coord(self.coord_x, sx, self.ranks_x, periodic_x)?;
        let ny = wrap_coord(self.coord_y, sy, self.ranks_y, periodic_y)?;
        Some(ny * self.ranks_x + nx)
    }
}

fn wrap_coord(coord: usize, step: i64, ranks: usize, periodic: bool) -> Option<usize> {
    let target = coord as i64 + step;
    if target >= 0 && target < ranks as i64 {
        Some(target as usize)
    } else if periodic {
        Some(target.rem_euclid(ranks as i64) as usize)
    } else {
        None
    }
}

/// Global grid description, shared by every rank of a run.
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct GridConfig {
    /// Global points along x.
    pub dim_x: usize,
    /// Global points along y (1 for 1-D runs).
    pub dim_y: usize,
    /// Physical edge length along x.
    pub length_x: f64,
    /// Physical edge length along y.
    pub length_y: f64,
    /// Periodic boundary along x (Dirichlet-zero otherwise).
    pub periodic_x: bool,
    /// Periodic boundary along y.
    pub periodic_y: bool,
    /// Nominal halo width per axis side.
    pub halo: usize,
}

impl GridConfig {
    /// 1-D grid of `dim` points over physical length `length`.
    pub const fn line(dim: usize, length: f64, periodic: bool) -> Self {
        Self {
            dim_x: dim,
            dim_y: 1,
            length_x: length,
            length_y: 1.0,
            periodic_x: periodic,
            periodic_y: false,
            halo: DEFAULT_HALO,
        }
    }

    /// 2-D grid of `dim_x x dim_y` points over `length_x x length_y`.
    pub const fn plane(
        dim_x: usize,
        dim_y: usize,
        length_x: f64,
        length_y: f64,
        periodic_x: bool,
        periodic_y: bool,
    ) -> Self {
        Self {
            dim_x,
            dim_y,
            length_x,
            length_y,
            periodic_x,
            periodic_y,
            halo: DEFAULT_HALO,
        }
    }

    /// Override the nominal halo width (rotation needs [`ROTATION_HALO`]).
    pub const fn with_halo(mut self, halo: usize) -> Self {
        self.halo = halo;
        self
    }

    /// Grid spacing along x.
    #[must_use]
    pub fn delta_x(&self) -> f64 {
        self.length_x / self.dim_x as f64
    }

    /// Grid spacing along y.
    #[must_use]
    pub fn delta_y(&self) -> f64 {
        self.length_y / self.dim_y as f64
    }
}

/// Geometry of one rank's tile within the global grid. Immutable after
/// construction.
#[derive(Clone, Debug)]
pub struct Lattice {
    /// 1 or 2.
    pub ndim: usize,
    /// Global points along x.
    pub global_dim_x: usize,
    /// Global points along y.
    pub global_dim_y: usize,
    /// Grid spacing along x.
    pub delta_x: f64,
    /// Grid spacing along y.
    pub delta_y: f64,
    /// Periodic boundary along x.
    pub periodic_x: bool,
    /// Periodic boundary along y.
    pub periodic_y: bool,
    /// Nominal halo width.
    pub halo: usize,
    /// This rank's place in the Cartesian grid.
    pub topology: CartTopology,
    /// Inner box start along x (global index, inclusive).
    pub inner_start_x: usize,
    /// Inner box end along x (global index, exclusive).
    pub inner_end_x: usize,
    /// Inner box start along y.
    pub inner_start_y: usize,
    /// Inner box end along y.
    pub inner_end_y: usize,
    /// Halo width actually present on the low-x side.
    pub halo_left: usize,
    /// Halo width on the high-x side.
    pub halo_right: usize,
    /// Halo width on the low-y side.
    pub halo_top: usize,
    /// Halo width on the high-y side.
    pub halo_bottom: usize,
}

/// Partition `n` points over `ranks` chunks; chunk `c` gets `(start, len)`.
/// Remainder points go to the leading chunks.
#[must_use]
pub fn axis_chunk(n: usize, ranks: usize, c: usize) -> (usize, usize) {
    let base = n / ranks;
    let rem = n % ranks;
    let len = base + usize::from(c < rem);
    let start = c * base + c.min(rem);
    (start, len)
}

impl Lattice {
    /// Build the tile geometry for `topology`'s rank under `config`.
    ///
    /// # Errors
    ///
    /// Configuration errors: zero dimensions or spacing, more ranks than
    /// points along an axis, a chunk narrower than the halo it must send.
    pub fn build(config: &GridConfig, topology: CartTopology) -> Result<Self, TidepoolError> {
        if config.dim_x == 0 || config.dim_y == 0 {
            return Err(TidepoolError::InvalidParameter(
                "grid dimensions must be positive".into(),
            ));
        }
        if !(config.delta_x() > 0.0) || !(config.delta_y() > 0.0) {
            return Err(TidepoolError::InvalidParameter(
                "grid spacing must be positive and finite".into(),
            ));
        }
        if config.halo == 0 {
            return Err(TidepoolError::InvalidParameter(
                "halo width must be positive".into(),
            ));
        }
        let ndim = if config.dim_y == 1 { 1 } else { 2 };
        if ndim == 1 && (config.periodic_y || topology.ranks_y != 1) {
            return Err(TidepoolError::InvalidParameter(
                "1-D grids must keep the y axis trivial".into(),
            ));
        }
        if topology.ranks_x > config.dim_x {
            return Err(TidepoolError::GridPartition {
                points: config.dim_x,
                ranks: topology.ranks_x,
            });
        }
        if topology.ranks_y > config.dim_y {
            return Err(TidepoolError::GridPartition {
                points: config.dim_y,
                ranks: topology.ranks_y,
            });
        }

        let (inner_start_x, inner_w) = axis_chunk(config.dim_x, topology.ranks_x, topology.coord_x);
        let (inner_start_y, inner_h) = axis_chunk(config.dim_y, topology.ranks_y, topology.coord_y);

        let halo_left = halo_if(
            topology
                .neighbor(Direction::West, config.periodic_x, config.periodic_y)
                .is_some(),
            config.halo,
        );
        let halo_right = halo_if(
            topology
                .neighbor(Direction::East, config.periodic_x, config.periodic_y)
                .is_some(),
            config.halo,
        );
        let halo_top = halo_if(
            topology
                .neighbor(Direction::North, config.periodic_x, config.periodic_y)
                .is_some(),
            config.halo,
        );
        let halo_bottom = halo_if(
            topology
                .neighbor(Direction::South, config.periodic_x, config.periodic_y)
                .is_some(),
            config.halo,
        );

        // A chunk must be at least as wide as the band it replicates to a
        // neighbour, or two tiles would alias the same halo source.
        if (halo_left > 0 || halo_right > 0) && inner_w < config.halo {
            return Err(TidepoolError::InvalidParameter(format!(
                "x chunk of {inner_w} points cannot source a halo of {}",
                config.halo
            )));
        }
        if (halo_top > 0 || halo_bottom > 0) && inner_h < config.halo {
            return Err(TidepoolError::InvalidParameter(format!(
                "y chunk of {inner_h} points cannot source a halo of {}",
                config.halo
            )));
        }

        Ok(Self {
            ndim,
            global_dim_x: config.dim_x,
            global_dim_y: config.dim_y,
            delta_x: config.delta_x(),
            delta_y: config.delta_y(),
            periodic_x: config.periodic_x,
            periodic_y: config.periodic_y,
            halo: config.halo,
            topology,
            inner_start_x,
            inner_end_x: inner_start_x + inner_w,
            inner_start_y,
            inner_end_y: inner_start_y + inner_h,
            halo_left,
            halo_right,
            halo_top,
            halo_bottom,
        })
    }

    /// Single-rank lattice for `config`.
    ///
    /// # Errors
    ///
    /// Same configuration errors as [`Lattice::build`].
    pub fn solo(config: &GridConfig) -> Result<Self, TidepoolError> {
        Self::build(config, CartTopology::single())
    }

    /// Tile width including halo.
    #[must_use]
    pub const fn dim_x(&self) -> usize {
        self.inner_end_x - self.inner_start_x + self.halo_left + self.halo_right
    }

    /// Tile height including halo.
    #[must_use]
    pub const fn dim_y(&self) -> usize {
        self.inner_end_y - self.inner_start_y + self.halo_top + self.halo_bottom
    }

    /// Inner box width.
    #[must_use]
    pub const fn inner_w(&self) -> usize {
        self.inner_end_x - self.inner_start_x
    }

    /// Inner box height.
    #[must_use]
    pub const fn inner_h(&self) -> usize {
        self.inner_end_y - self.inner_start_y
    }

    /// Total tile cells.
    #[must_use]
    pub const fn tile_len(&self) -> usize {
        self.dim_x() * self.dim_y()
    }

    /// Global x index of tile column 0 (negative when the halo wraps).
    #[must_use]
    pub const fn start_x(&self) -> i64 {
        self.inner_start_x as i64 - self.halo_left as i64
    }

    /// Global y index of tile row 0.
    #[must_use]
    pub const fn start_y(&self) -> i64 {
        self.inner_start_y as i64 - self.halo_top as i64
    }

    /// Map a tile column to the (wrapped) global x index.
    #[must_use]
    pub fn global_x(&self, tile_x: usize) -> usize {
        (self.start_x() + tile_x as i64).rem_euclid(self.global_dim_x as i64) as usize
    }

    /// Map a tile row to the (wrapped) global y index.
    #[must_use]
    pub fn global_y(&self, tile_y: usize) -> usize {
        (self.start_y() + tile_y as i64).rem_euclid(self.global_dim_y as i64) as usize
    }

    /// Physical x coordinate of global index `i`, centred on the box middle.
    #[must_use]
    pub fn x_at(&self, i: usize) -> f64 {
        (i as f64 - self.global_dim_x as f64 / 2.0) * self.delta_x
    }

    /// Physical y coordinate of global index `j`.
    #[must_use]
    pub fn y_at(&self, j: usize) -> f64 {
        (j as f64 - self.global_dim_y as f64 / 2.0) * self.delta_y
    }

    /// Cell volume element: `dx` in 1-D, `dx*dy` in 2-D.
    #[must_use]
    pub fn cell_volume(&self) -> f64 {
        if self.ndim == 1 {
            self.delta_x
        } else {
            self.delta_x * self.delta_y
        }
    }

    /// Rank of the neighbour in `dir`, if one exists.
    #[must_use]
    pub fn neighbor(&self, dir: Direction) -> Option<usize> {
        self.topology.neighbor(dir, self.periodic_x, self.periodic_y)
    }
}

const fn halo_if(present: bool, halo: usize) -> usize {
    if present {
        halo
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_chunks_tile_without_gaps() {
        for (n, p) in [(17, 4), (300, 7), (8, 8), (256, 1)] {
            let mut covered = 0;
            for c in 0..p {
                let (start, len) = axis_chunk(n, p, c);
                assert_eq!(start, covered, "chunk {c} of {n}/{p} starts at cover edge");
                covered += len;
            }
            assert_eq!(covered, n, "chunks of {n}/{p} cover the axis");
        }
    }

    #[test]
    fn remainder_goes_to_leading_chunks() {
        let (_, len0) = axis_chunk(10, 3, 0);
        let (_, len2) = axis_chunk(10, 3, 2);
        assert_eq!(len0, 4);
        assert_eq!(len2, 3);
    }

    #[test]
    fn tile_width_identity() {
        let config = GridConfig::plane(64, 48, 1.0, 1.0, true, false);
        for rank in 0..4 {
            let lat = Lattice::build(&config, CartTopology::from_rank(2, 2, rank)).unwrap();
            assert_eq!(
                lat.dim_x(),
                lat.inner_w() + lat.halo_left + lat.halo_right,
                "outer = inner + halos"
            );
            assert_eq!(lat.dim_y(), lat.inner_h() + lat.halo_top + lat.halo_bottom);
        }
    }

    #[test]
    fn dirichlet_edges_carry_no_halo() {
        let config = GridConfig::plane(64, 64, 1.0, 1.0, false, false);
        let lat = Lattice::build(&config, CartTopology::from_rank(2, 2, 0)).unwrap();
        assert_eq!(lat.halo_left, 0, "domain edge");
        assert_eq!(lat.halo_top, 0, "domain edge");
        assert_eq!(lat.halo_right, DEFAULT_HALO, "shared edge");
        assert_eq!(lat.halo_bottom, DEFAULT_HALO, "shared edge");
    }

    #[test]
    fn periodic_single_rank_wraps_to_self() {
        let config = GridConfig::line(32, 1.0, true);
        let lat = Lattice::solo(&config).unwrap();
        assert_eq!(lat.neighbor(Direction::West), Some(0));
        assert_eq!(lat.neighbor(Direction::East), Some(0));
        assert_eq!(lat.neighbor(Direction::North), None);
        assert_eq!(lat.halo_left, DEFAULT_HALO);
    }

    #[test]
    fn halo_columns_wrap_global_index() {
        let config = GridConfig::line(32, 1.0, true);
        let lat = Lattice::solo(&config).unwrap();
        assert_eq!(lat.global_x(0), 32 - DEFAULT_HALO);
        assert_eq!(lat.global_x(DEFAULT_HALO), 0);
    }

    #[test]
    fn rejects_more_ranks_than_points() {
        let config = GridConfig::line(4, 1.0, false);
        let err = Lattice::build(&config, CartTopology::from_rank(8, 1, 0));
        assert!(matches!(err, Err(TidepoolError::GridPartition { .. })));
    }

    #[test]
    fn rejects_chunk_narrower_than_halo() {
        let config = GridConfig::line(12, 1.0, true);
        // 12 points over 4 ranks: 3-point chunks cannot source a 4-cell band.
        let err = Lattice::build(&config, CartTopology::from_rank(4, 1, 0));
        assert!(matches!(err, Err(TidepoolError::InvalidParameter(_))));
    }

    #[test]
    fn inner_boxes_are_disjoint_and_cover() {
        let config = GridConfig::plane(30, 22, 1.0, 1.0, true, true);
        let mut seen = vec![false; 30 * 22];
        for rank in 0..6 {
            let lat = Lattice::build(&config, CartTopology::from_rank(3, 2, rank)).unwrap();
            for j in lat.inner_start_y..lat.inner_end_y {
                for i in lat.inner_start_x..lat.inner_end_x {
                    assert!(!seen[j * 30 + i], "cell ({i},{j}) owned twice");
                    seen[j * 30 + i] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s), "every global cell owned once");
    }
}
