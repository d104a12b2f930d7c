// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for tidepool configuration, I/O, and runtime invariants.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (unknown back end, impossible grid
//! partition, numerical blow-up) rather than parsing opaque strings.
//!
//! Policy (matching the solver's distributed contract): configuration and
//! runtime-invariant failures are fatal — a binary reports the message and
//! exits on every rank. Snapshot I/O failures degrade instead: the writer
//! falls back to the current directory.

use std::fmt;

/// Errors arising from solver configuration, snapshot I/O, or evolution.
#[derive(Debug)]
pub enum TidepoolError {
    /// Back-end name not recognised by the kernel registry.
    UnknownKernel(String),

    /// The requested back end cannot run this configuration
    /// (two-component state or nonzero angular velocity off-CPU).
    UnsupportedBackend(String),

    /// A physical or grid parameter is out of range (non-positive mass,
    /// zero spacing, halo wider than a tile).
    InvalidParameter(String),

    /// An axis cannot be partitioned over the requested process grid.
    GridPartition {
        /// Global points along the offending axis.
        points: usize,
        /// Ranks requested along that axis.
        ranks: usize,
    },

    /// Snapshot file could not be written or read (path, underlying error).
    SnapshotIo(String),

    /// A halo channel closed mid-exchange: the neighbouring rank terminated.
    HaloExchange(String),

    /// A collective reduction produced a non-finite value; every rank
    /// observes the same reduced result, so the mesh halts together.
    NumericalBlowup(String),
}

impl fmt::Display for TidepoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKernel(name) => write!(f, "Unknown kernel back end: {name}"),
            Self::UnsupportedBackend(msg) => write!(f, "Unsupported back end: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            Self::GridPartition { points, ranks } => {
                write!(
                    f,
                    "Cannot partition {points} grid points over {ranks} ranks"
                )
            }
            Self::SnapshotIo(msg) => write!(f, "Snapshot I/O failed: {msg}"),
            Self::HaloExchange(msg) => write!(f, "Halo exchange failed: {msg}"),
            Self::NumericalBlowup(msg) => write!(f, "Numerical blow-up: {msg}"),
        }
    }
}

impl std::error::Error for TidepoolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_kernel() {
        let err = TidepoolError::UnknownKernel("fpga".into());
        assert_eq!(err.to_string(), "Unknown kernel back end: fpga");
    }

    #[test]
    fn display_grid_partition() {
        let err = TidepoolError::GridPartition {
            points: 5,
            ranks: 8,
        };
        assert_eq!(err.to_string(), "Cannot partition 5 grid points over 8 ranks");
    }

    #[test]
    fn display_blowup() {
        let err = TidepoolError::NumericalBlowup("norm reduction returned NaN".into());
        assert_eq!(
            err.to_string(),
            "Numerical blow-up: norm reduction returned NaN"
        );
    }
}
