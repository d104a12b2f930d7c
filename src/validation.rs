// SPDX-License-Identifier: AGPL-3.0-only

//! Scenario reports for the validation binaries.
//!
//! Each binary drives one physical scenario (free particle, harmonic trap,
//! Rabi cycle, rotating frame) and asserts a handful of observables against
//! the thresholds in [`crate::tolerances`]. A [`ScenarioReport`] collects
//! those assertions as observed-value/requirement pairs, prints a verdict
//! table, and exits 0 only when every requirement held, so the binaries
//! compose with shell pipelines the same way the unit tests do. A JSON copy
//! of the table is saved alongside for machine consumption.

use serde::Serialize;
use std::fmt;
use std::process;

/// What a recorded observable was required to satisfy.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum Requirement {
    /// `|observed - expected| <= tolerance`
    CloseTo {
        /// Analytical value the observable must land on.
        expected: f64,
        /// Absolute band around it.
        tolerance: f64,
    },
    /// `|observed / expected - 1| <= tolerance` (falls back to the absolute
    /// band when `expected` is zero).
    CloseToRel {
        /// Analytical value the observable must land on.
        expected: f64,
        /// Relative band around it.
        tolerance: f64,
    },
    /// `observed < bound` (error measures, drifts).
    Below {
        /// Exclusive upper bound.
        bound: f64,
    },
    /// `observed > bound` (quantities that must stay alive).
    Above {
        /// Exclusive lower bound.
        bound: f64,
    },
    /// A plain predicate, recorded as 1 (held) or 0 (violated).
    Holds,
}

impl Requirement {
    fn satisfied_by(self, observed: f64) -> bool {
        match self {
            Self::CloseTo {
                expected,
                tolerance,
            } => (observed - expected).abs() <= tolerance,
            Self::CloseToRel {
                expected,
                tolerance,
            } => {
                if expected == 0.0 {
                    observed.abs() <= tolerance
                } else {
                    (observed / expected - 1.0).abs() <= tolerance
                }
            }
            Self::Below { bound } => observed < bound,
            Self::Above { bound } => observed > bound,
            Self::Holds => observed != 0.0,
        }
    }

    /// How much room the observable left before the requirement breaks;
    /// negative on failure. Diagnostic only.
    fn slack(self, observed: f64) -> f64 {
        match self {
            Self::CloseTo {
                expected,
                tolerance,
            } => tolerance - (observed - expected).abs(),
            Self::CloseToRel {
                expected,
                tolerance,
            } => {
                if expected == 0.0 {
                    tolerance - observed.abs()
                } else {
                    tolerance - (observed / expected - 1.0).abs()
                }
            }
            Self::Below { bound } => bound - observed,
            Self::Above { bound } => observed - bound,
            Self::Holds => {
                if observed == 0.0 {
                    -1.0
                } else {
                    1.0
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseTo {
                expected,
                tolerance,
            } => write!(f, "within {tolerance:.1e} of {expected:.6e}"),
            Self::CloseToRel {
                expected,
                tolerance,
            } => write!(f, "within {tolerance:.1e} rel of {expected:.6e}"),
            Self::Below { bound } => write!(f, "below {bound:.1e}"),
            Self::Above { bound } => write!(f, "above {bound:.1e}"),
            Self::Holds => write!(f, "holds"),
        }
    }
}

/// One observable pinned against its requirement.
#[derive(Debug, Clone, Serialize)]
pub struct Assertion {
    /// What was measured.
    pub label: String,
    /// The measured value.
    pub observed: f64,
    /// What it had to satisfy.
    pub requirement: Requirement,
    /// Room left before the requirement breaks (negative on failure).
    pub slack: f64,
    /// Whether the requirement held.
    pub held: bool,
}

/// Verdict accumulator for one validation scenario.
#[derive(Debug, Serialize)]
#[must_use = "a scenario report decides the exit code via conclude()"]
pub struct ScenarioReport {
    /// Scenario name, printed in the verdict header.
    pub scenario: String,
    /// Every assertion made, in measurement order.
    pub assertions: Vec<Assertion>,
}

impl ScenarioReport {
    /// Start an empty report for `scenario`.
    pub fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            assertions: Vec::new(),
        }
    }

    fn record(&mut self, label: &str, observed: f64, requirement: Requirement) {
        self.assertions.push(Assertion {
            label: label.to_string(),
            observed,
            requirement,
            slack: requirement.slack(observed),
            held: requirement.satisfied_by(observed),
        });
    }

    /// Pin `observed` to an analytical value with an absolute band.
    pub fn require_close(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        self.record(
            label,
            observed,
            Requirement::CloseTo {
                expected,
                tolerance,
            },
        );
    }

    /// Pin `observed` to an analytical value with a relative band.
    pub fn require_close_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        self.record(
            label,
            observed,
            Requirement::CloseToRel {
                expected,
                tolerance,
            },
        );
    }

    /// Require an error measure to stay under `bound`.
    pub fn require_below(&mut self, label: &str, observed: f64, bound: f64) {
        self.record(label, observed, Requirement::Below { bound });
    }

    /// Require a quantity to stay over `bound`.
    pub fn require_above(&mut self, label: &str, observed: f64, bound: f64) {
        self.record(label, observed, Requirement::Above { bound });
    }

    /// Record a plain predicate.
    pub fn require(&mut self, label: &str, held: bool) {
        self.record(label, f64::from(u8::from(held)), Requirement::Holds);
    }

    /// Whether every requirement held so far.
    #[must_use]
    pub fn all_held(&self) -> bool {
        self.assertions.iter().all(|a| a.held)
    }

    /// Labels of the violated requirements, in measurement order.
    #[must_use]
    pub fn violations(&self) -> Vec<&str> {
        self.assertions
            .iter()
            .filter(|a| !a.held)
            .map(|a| a.label.as_str())
            .collect()
    }

    /// Save the report as JSON; on I/O failure print a warning and keep
    /// going (the verdict, not the file, is the result).
    pub fn save_json(&self, path: &str) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    println!("  warning: could not save {path}: {e}");
                }
            }
            Err(e) => println!("  warning: could not serialize report: {e}"),
        }
    }

    /// Print the verdict table and exit: 0 when every requirement held,
    /// 1 otherwise.
    pub fn conclude(&self) -> ! {
        let held = self.assertions.iter().filter(|a| a.held).count();
        println!();
        println!(
            "scenario {}: {held}/{} requirements held",
            self.scenario,
            self.assertions.len()
        );
        for a in &self.assertions {
            let mark = if a.held { " ok " } else { "FAIL" };
            println!(
                "  [{mark}] {:<44} observed {:+.6e}, required {}  (slack {:+.2e})",
                a.label, a.observed, a.requirement, a.slack
            );
        }
        if self.all_held() {
            println!("verdict: PASS");
            process::exit(0);
        }
        println!("verdict: FAIL ({})", self.violations().join(", "));
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_requirement_accepts_inside_the_band() {
        let mut report = ScenarioReport::new("test");
        report.require_close("pi", 3.14159, std::f64::consts::PI, 1e-4);
        assert!(report.all_held());
        assert!(report.assertions[0].slack > 0.0);
    }

    #[test]
    fn relative_requirement_rejects_ten_percent_off() {
        let mut report = ScenarioReport::new("test");
        report.require_close_rel("energy", 1.1, 1.0, 0.05);
        assert!(!report.all_held());
        assert_eq!(report.violations(), vec!["energy"]);
        assert!(report.assertions[0].slack < 0.0);
    }

    #[test]
    fn relative_requirement_near_zero_falls_back_to_absolute() {
        let mut report = ScenarioReport::new("test");
        report.require_close_rel("mean momentum", 1e-12, 0.0, 1e-9);
        assert!(report.all_held());
    }

    #[test]
    fn bounds_and_predicates() {
        let mut report = ScenarioReport::new("test");
        report.require_below("norm drift", 1e-12, 1e-10);
        report.require_above("radius", 0.99, 0.5);
        report.require("converged", true);
        report.require("diverged", false);
        assert_eq!(report.violations(), vec!["diverged"]);
        assert!(!report.all_held());
    }
}
