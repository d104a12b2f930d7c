// SPDX-License-Identifier: AGPL-3.0-only

//! Snapshot emission: global scalar fields stamped to flat files.
//!
//! Every rank contributes its inner box; the gather reassembles the global
//! field in Cartesian order from the deterministic axis partition, and only
//! rank 0 writes. Files are ASCII, one row of space-separated doubles per
//! grid row, printed with 17 significant digits so a read-back reproduces
//! every f64 bit-for-bit. The file name is `<tag>_<iteration>` inside the
//! run directory; if the directory cannot be created the writer degrades to
//! the current directory.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::TidepoolError;
use crate::grid::comm::Collective;
use crate::grid::lattice::{axis_chunk, Lattice};

/// Create the run directory, falling back to `.` with a warning when the
/// filesystem refuses (degraded I/O is not fatal).
#[must_use]
pub fn ensure_run_dir(dir: &str) -> PathBuf {
    let path = PathBuf::from(dir);
    match fs::create_dir_all(&path) {
        Ok(()) => path,
        Err(e) => {
            println!("  warning: cannot create {dir}: {e}; writing to current directory");
            PathBuf::from(".")
        }
    }
}

/// Gather `inner_field` (this rank's inner box, row-major) and write the
/// global field as `<tag>_<iteration>` in `run_dir`. Only rank 0 touches
/// the filesystem; every rank must call (the gather is collective).
///
/// # Errors
///
/// [`TidepoolError::SnapshotIo`] when rank 0 cannot write the file.
pub fn write_field(
    lattice: &Lattice,
    collective: &Collective,
    inner_field: Vec<f64>,
    run_dir: &Path,
    tag: &str,
    iteration: usize,
) -> Result<(), TidepoolError> {
    let gathered = collective.all_gather(inner_field);
    if collective.rank() != 0 {
        return Ok(());
    }

    let (nx, ny) = (lattice.global_dim_x, lattice.global_dim_y);
    let topo = lattice.topology;
    let mut global = vec![0.0; nx * ny];
    for (rank, field) in gathered.iter().enumerate() {
        let cx = rank % topo.ranks_x;
        let cy = rank / topo.ranks_x;
        let (x0, w) = axis_chunk(nx, topo.ranks_x, cx);
        let (y0, h) = axis_chunk(ny, topo.ranks_y, cy);
        for r in 0..h {
            global[(y0 + r) * nx + x0..(y0 + r) * nx + x0 + w]
                .copy_from_slice(&field[r * w..(r + 1) * w]);
        }
    }

    let path = run_dir.join(format!("{tag}_{iteration}"));
    let mut out = String::with_capacity(nx * ny * 26);
    for row in global.chunks(nx) {
        for (i, v) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&format!("{v:.17e}"));
        }
        out.push('\n');
    }
    let mut file = fs::File::create(&path)
        .map_err(|e| TidepoolError::SnapshotIo(format!("{}: {e}", path.display())))?;
    file.write_all(out.as_bytes())
        .map_err(|e| TidepoolError::SnapshotIo(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Read a field written by [`write_field`] back into a flat row-major
/// vector.
///
/// # Errors
///
/// [`TidepoolError::SnapshotIo`] on missing file or a malformed value.
pub fn read_field(path: &Path) -> Result<Vec<f64>, TidepoolError> {
    let text = fs::read_to_string(path)
        .map_err(|e| TidepoolError::SnapshotIo(format!("{}: {e}", path.display())))?;
    let mut values = Vec::new();
    for token in text.split_whitespace() {
        let v: f64 = token
            .parse()
            .map_err(|e| TidepoolError::SnapshotIo(format!("{}: {e}", path.display())))?;
        values.push(v);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::lattice::GridConfig;

    #[test]
    fn seventeen_digits_round_trip_exactly() {
        let values = [std::f64::consts::PI, 1.0 / 3.0, 6.626_070_15e-34, -0.0];
        for v in values {
            let s = format!("{v:.17e}");
            let back: f64 = s.parse().expect("parse");
            assert_eq!(v.to_bits(), back.to_bits(), "{v} via {s}");
        }
    }

    #[test]
    fn solo_write_read_round_trip() {
        let config = GridConfig::line(32, 4.0, false);
        let lat = Lattice::solo(&config).expect("lattice");
        let coll = Collective::solo();
        let field: Vec<f64> = (0..32).map(|i| (i as f64).sin() / 3.0).collect();
        let dir = std::env::temp_dir().join("tidepool_snapshot_test");
        let dir = ensure_run_dir(dir.to_str().expect("utf8 path"));
        write_field(&lat, &coll, field.clone(), &dir, "density", 7).expect("write");
        let back = read_field(&dir.join("density_7")).expect("read");
        assert_eq!(back, field, "bit-for-bit round trip");
    }
}
