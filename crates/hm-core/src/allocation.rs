//! Per-visit flow allocation.
//!
//! Turns one visit into O(1) contributions against the bin grid:
//!
//! 1. Validate the interval and impute a missing exit per the censored policy
//! 2. Clip it to the grid and classify its relation to the window
//! 3. Credit the arrival and departure bins directly (fractional or whole)
//! 4. Emit a `+w`/`-w` pair bounding the run of fully covered interior bins,
//!    resolved later by a single prefix sum in the accumulator
//!
//! Total cost is O(visits + bins) regardless of stay length.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::category::{CategorySet, CategorySlot};
use crate::error::InvalidIntervalError;
use crate::grid::{BinGrid, BinIndex, BinPosition};
use crate::types::{CensoredPolicy, EdgeBins, Stop};

/// How a visit overlaps the analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopRelation {
    /// Entry and exit both inside the window.
    Inner,
    /// Entered before the window, left inside it.
    Left,
    /// Entered inside the window, left after it (or never).
    Right,
    /// Present for the whole window.
    Outer,
    /// No overlap with the window.
    Outside,
}

/// A validated interval with its exit imputed if needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StayInterval {
    pub entry: NaiveDateTime,
    pub exit: NaiveDateTime,
    /// The exit was missing and imputed as the grid end.
    pub open: bool,
    pub weight: f64,
}

impl StayInterval {
    /// Validates `stop` under `censored`, imputing open exits as `grid.end()`.
    pub fn from_stop<S: Stop>(
        stop: &S,
        grid: &BinGrid,
        censored: CensoredPolicy,
        use_weights: bool,
    ) -> Result<Self, InvalidIntervalError> {
        let entry = stop.entry();
        let weight = if use_weights { stop.weight() } else { 1.0 };
        if !weight.is_finite() || weight <= 0.0 {
            return Err(InvalidIntervalError::InvalidWeight {
                id: stop.id().to_string(),
                weight,
            });
        }

        let (exit, open) = match (stop.exit(), censored) {
            (Some(exit), _) => (exit, false),
            (None, CensoredPolicy::Open) => (grid.end().max(entry), true),
            (None, CensoredPolicy::Reject) => {
                return Err(InvalidIntervalError::MissingExit {
                    id: stop.id().to_string(),
                });
            }
        };
        if exit < entry {
            return Err(InvalidIntervalError::ExitBeforeEntry {
                id: stop.id().to_string(),
                entry,
                exit,
            });
        }

        Ok(Self {
            entry,
            exit,
            open,
            weight,
        })
    }

    /// Full length of stay, unclipped.
    pub fn duration(&self) -> Duration {
        self.exit - self.entry
    }

    /// Classifies the interval against the grid's `[start, end)` span.
    pub fn relation(&self, grid: &BinGrid) -> StopRelation {
        let start = grid.start();
        let end = grid.end();
        if self.exit < start || self.entry >= end {
            return StopRelation::Outside;
        }
        let entered_inside = self.entry >= start;
        let left_inside = !self.open && self.exit < end;
        match (entered_inside, left_inside) {
            (true, true) => StopRelation::Inner,
            (false, true) => StopRelation::Left,
            (true, false) => StopRelation::Right,
            (false, false) => StopRelation::Outer,
        }
    }
}

/// The O(1) footprint of one visit on the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub slot: CategorySlot,
    pub relation: StopRelation,
    pub weight: f64,
    /// Bin credited with an arrival, when the entry lies inside the window.
    pub arrival: Option<BinIndex>,
    /// Bin credited with a departure, when the exit lies inside the window.
    pub departure: Option<BinIndex>,
    /// First bin occupied (the arrival bin after clipping).
    pub first_bin: BinIndex,
    /// Last bin occupied (the departure bin after clipping).
    pub last_bin: BinIndex,
    /// Weighted occupancy credited directly to `first_bin`.
    pub first_share: f64,
    /// Weighted occupancy credited directly to `last_bin`; zero when
    /// `first_bin == last_bin`.
    pub last_share: f64,
    /// Weighted minutes of presence inside the window, from raw timestamps.
    pub occupancy_minutes: f64,
}

impl Allocation {
    /// Signed interior-run events: `+w` at the first interior bin and `-w` at
    /// `last_bin`. `None` when there is no strictly interior bin.
    pub fn interior_deltas(&self) -> Option<[(BinIndex, f64); 2]> {
        (self.last_bin > self.first_bin + 1).then_some([
            (self.first_bin + 1, self.weight),
            (self.last_bin, -self.weight),
        ])
    }

    /// Whether the visit was already present when the window opened.
    pub const fn open_at_start(&self) -> bool {
        matches!(self.relation, StopRelation::Left | StopRelation::Outer)
    }

    /// Whether the entry timestamp lies inside the window.
    pub const fn entered_inside(&self) -> bool {
        matches!(self.relation, StopRelation::Inner | StopRelation::Right)
    }

    /// Whether the exit timestamp lies inside the window.
    pub const fn left_inside(&self) -> bool {
        matches!(self.relation, StopRelation::Inner | StopRelation::Left)
    }
}

/// Result of placing a visit.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Allocated(Allocation),
    /// The visit does not overlap the window.
    Outside,
    /// The visit's category is excluded from the analysis.
    Excluded,
}

/// Computes allocations for visits against a fixed grid and policy.
#[derive(Debug, Clone, Copy)]
pub struct FlowAllocator<'a> {
    grid: &'a BinGrid,
    categories: &'a CategorySet,
    edge_bins: EdgeBins,
    censored: CensoredPolicy,
    use_weights: bool,
}

impl<'a> FlowAllocator<'a> {
    pub const fn new(
        grid: &'a BinGrid,
        categories: &'a CategorySet,
        edge_bins: EdgeBins,
        censored: CensoredPolicy,
        use_weights: bool,
    ) -> Self {
        Self {
            grid,
            categories,
            edge_bins,
            censored,
            use_weights,
        }
    }

    /// Places a single visit.
    ///
    /// Invalid intervals are returned as errors so the caller can record the
    /// rejection and carry on with the batch.
    pub fn place<S: Stop>(&self, stop: &S) -> Result<Placement, InvalidIntervalError> {
        let interval = StayInterval::from_stop(stop, self.grid, self.censored, self.use_weights)?;
        let relation = interval.relation(self.grid);
        if relation == StopRelation::Outside {
            return Ok(Placement::Outside);
        }
        let Some(slot) = self.categories.resolve(stop.category()) else {
            return Ok(Placement::Excluded);
        };
        Ok(Placement::Allocated(self.allocate(slot, relation, &interval)))
    }

    #[allow(clippy::cast_precision_loss)]
    fn allocate(&self, slot: CategorySlot, relation: StopRelation, interval: &StayInterval) -> Allocation {
        let grid = self.grid;
        let w = interval.weight;
        let last_index = grid.len() - 1;

        // Clip to [start, end]; clipped edges earn no arrival/departure.
        let entry = interval.entry.max(grid.start());
        let exit = interval.exit.min(grid.end());

        let arrival = match grid.locate(interval.entry) {
            BinPosition::Within(bin) => Some(bin),
            BinPosition::Before | BinPosition::After => None,
        };
        let departure = if interval.open {
            None
        } else {
            match grid.locate(interval.exit) {
                BinPosition::Within(bin) => Some(bin),
                BinPosition::Before | BinPosition::After => None,
            }
        };

        let first_bin = arrival.unwrap_or(0);
        let last_bin = departure.unwrap_or(last_index);

        let bin_ms = grid.bin_millis() as f64;
        let millis = |from: NaiveDateTime, to: NaiveDateTime| (to - from).num_milliseconds() as f64;

        let (first_share, last_share) = match self.edge_bins {
            EdgeBins::Fractional if first_bin == last_bin => (w * millis(entry, exit) / bin_ms, 0.0),
            EdgeBins::Fractional => (
                w * millis(entry, grid.bin_start(first_bin + 1)) / bin_ms,
                w * millis(grid.bin_start(last_bin), exit) / bin_ms,
            ),
            EdgeBins::Whole if first_bin == last_bin => (w, 0.0),
            EdgeBins::Whole => (w, w),
        };

        Allocation {
            slot,
            relation,
            weight: w,
            arrival,
            departure,
            first_bin,
            last_bin,
            first_share,
            last_share,
            occupancy_minutes: w * millis(entry, exit) / 60_000.0,
        }
    }
}
