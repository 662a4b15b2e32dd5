//! Flow conservation checks over a finished [`FlowTable`].
//!
//! Violations are diagnostics, not failures: they usually point at visits
//! straddling the window edges or at suspicious input, and the caller gets
//! them alongside the results.

use std::fmt;

use serde::Serialize;

use crate::accumulator::FlowTable;
use crate::category::CategorySet;
use crate::grid::BinIndex;
use crate::types::EdgeBins;

/// Default relative tolerance for balance comparisons.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Which balance identity was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// `level[b] != level[b-1] + arrivals[b] - departures[b]`.
    BinBalance,
    /// Window arrivals minus departures differ from the change in level.
    WindowBalance,
    /// Table arrivals differ from entries observed inside the window.
    ArrivalTotal,
    /// Table departures differ from exits observed inside the window.
    DepartureTotal,
    /// Table occupancy-minutes differ from observed minutes of presence.
    OccupancyMinutes,
}

impl ViolationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BinBalance => "bin balance",
            Self::WindowBalance => "window balance",
            Self::ArrivalTotal => "arrival total",
            Self::DepartureTotal => "departure total",
            Self::OccupancyMinutes => "occupancy minutes",
        }
    }
}

/// A broken balance identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConservationViolation {
    pub kind: ViolationKind,
    /// Offending bin for per-bin checks.
    pub bin: Option<BinIndex>,
    pub category: String,
    pub expected: f64,
    pub actual: f64,
}

impl fmt::Display for ConservationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violated for {}", self.kind.as_str(), self.category)?;
        if let Some(bin) = self.bin {
            write!(f, " at bin {bin}")?;
        }
        write!(f, ": expected {:.6}, found {:.6}", self.expected, self.actual)
    }
}

/// Validates flow balance for every category and the Total series.
#[derive(Debug, Clone, Copy)]
pub struct ConservationChecker {
    tolerance: f64,
    edge_bins: EdgeBins,
    bin_size_minutes: u32,
}

impl ConservationChecker {
    pub const fn new(tolerance: f64, edge_bins: EdgeBins, bin_size_minutes: u32) -> Self {
        Self {
            tolerance,
            edge_bins,
            bin_size_minutes,
        }
    }

    fn agrees(&self, expected: f64, actual: f64) -> bool {
        (expected - actual).abs() <= self.tolerance * expected.abs().max(1.0)
    }

    /// Runs every check and returns the violations found, in slot then bin order.
    pub fn check(&self, table: &FlowTable, categories: &CategorySet) -> Vec<ConservationViolation> {
        let mut violations = Vec::new();

        for slot in 0..table.slots() {
            let category = categories.label(slot);
            let series = table.series(slot);
            let ledger = table.ledger(slot);
            let mut push = |kind, bin, expected, actual| {
                if !self.agrees(expected, actual) {
                    violations.push(ConservationViolation {
                        kind,
                        bin,
                        category: category.to_string(),
                        expected,
                        actual,
                    });
                }
            };

            let mut previous = ledger.open_at_start;
            for (bin, cell) in series.iter().enumerate() {
                let expected = previous + cell.arrivals - cell.departures;
                push(ViolationKind::BinBalance, Some(bin), expected, cell.level);
                previous = cell.level;
            }

            let arrivals: f64 = series.iter().map(|c| c.arrivals).sum();
            let departures: f64 = series.iter().map(|c| c.departures).sum();
            let closing = series.last().map_or(ledger.open_at_start, |c| c.level);
            push(
                ViolationKind::WindowBalance,
                None,
                departures + closing - ledger.open_at_start,
                arrivals,
            );
            push(ViolationKind::ArrivalTotal, None, ledger.arrivals, arrivals);
            push(ViolationKind::DepartureTotal, None, ledger.departures, departures);

            // Whole edge bins overstate occupancy on purpose.
            if self.edge_bins == EdgeBins::Fractional {
                let occupancy: f64 = series.iter().map(|c| c.occupancy).sum();
                push(
                    ViolationKind::OccupancyMinutes,
                    None,
                    ledger.occupancy_minutes,
                    occupancy * f64::from(self.bin_size_minutes),
                );
            }
        }

        for violation in &violations {
            tracing::warn!(
                kind = violation.kind.as_str(),
                category = %violation.category,
                bin = ?violation.bin,
                expected = violation.expected,
                actual = violation.actual,
                "conservation of flow violated"
            );
        }
        violations
    }
}
