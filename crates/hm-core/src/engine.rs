//! End-to-end computation over a batch of visits.
//!
//! # Pipeline
//!
//! 1. Validate the configuration and build the bin grid
//! 2. Discover categories from the visits that are valid and overlap the window
//! 3. Allocate fixed-size chunks of visits in parallel, one accumulator each
//! 4. Merge the chunk accumulators in chunk order and resolve the table
//! 5. Check conservation, then summarise flows and lengths of stay
//!
//! Chunk boundaries do not depend on the thread count and partial results are
//! merged in input order, so repeated runs produce bit-identical tables.

use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use serde::Serialize;

use crate::accumulator::{FlowAccumulator, FlowCell, FlowTable};
use crate::allocation::{FlowAllocator, Placement, StayInterval, StopRelation};
use crate::category::CategorySet;
use crate::conservation::{ConservationChecker, ConservationViolation, DEFAULT_TOLERANCE};
use crate::error::{ConfigurationError, InvalidIntervalError};
use crate::grid::{AnalysisWindow, Bin, BinGrid};
use crate::los::{LengthOfStaySummarizer, LosCell};
use crate::stats::Percentiles;
use crate::summary::{StationaryCell, StatsAggregator, SummaryCell};
use crate::types::{CensoredPolicy, EdgeBins, LosUnits, Stop};

/// Visits allocated per parallel work item.
const CHUNK_SIZE: usize = 4096;

/// Gap between the window and the data that triggers a range warning.
const RANGE_WARNING_HOURS: i64 = 48;

/// Everything that controls a computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub window: AnalysisWindow,
    pub edge_bins: EdgeBins,
    pub censored: CensoredPolicy,
    /// Produce one series per category label in addition to Total.
    pub use_categories: bool,
    /// Use each visit's weight instead of counting it as one.
    pub use_weights: bool,
    pub excluded_categories: Vec<String>,
    pub percentiles: Percentiles,
    pub los_units: LosUnits,
    /// Relative tolerance for conservation checks.
    pub tolerance: f64,
    /// Compute the time-of-week summary.
    pub nonstationary_stats: bool,
    /// Compute the whole-window summary.
    pub stationary_stats: bool,
}

impl AnalysisConfig {
    /// A configuration with default policies for `window`.
    pub fn new(window: AnalysisWindow) -> Self {
        Self {
            window,
            edge_bins: EdgeBins::default(),
            censored: CensoredPolicy::default(),
            use_categories: true,
            use_weights: false,
            excluded_categories: Vec::new(),
            percentiles: Percentiles::default(),
            los_units: LosUnits::default(),
            tolerance: DEFAULT_TOLERANCE,
            nonstationary_stats: true,
            stationary_stats: true,
        }
    }

    /// Checks the settings not already validated by their types.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigurationError::InvalidTolerance {
                value: self.tolerance,
            });
        }
        Ok(())
    }
}

/// How the input records were disposed of.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordReport {
    pub inner: usize,
    pub left: usize,
    pub right: usize,
    pub outer: usize,
    pub outside: usize,
    /// Skipped because their category is excluded.
    pub excluded: usize,
    /// Invalid records, in input order.
    pub rejected: Vec<InvalidIntervalError>,
}

impl RecordReport {
    fn count(&mut self, relation: StopRelation) {
        match relation {
            StopRelation::Inner => self.inner += 1,
            StopRelation::Left => self.left += 1,
            StopRelation::Right => self.right += 1,
            StopRelation::Outer => self.outer += 1,
            StopRelation::Outside => self.outside += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.inner += other.inner;
        self.left += other.left;
        self.right += other.right;
        self.outer += other.outer;
        self.outside += other.outside;
        self.excluded += other.excluded;
        self.rejected.extend(other.rejected);
    }

    /// Records that contributed to the flow table.
    pub const fn allocated(&self) -> usize {
        self.inner + self.left + self.right + self.outer
    }

    /// Every record seen.
    pub fn total(&self) -> usize {
        self.allocated() + self.outside + self.excluded + self.rejected.len()
    }
}

/// One labelled row of the flow table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRow {
    pub category: String,
    pub bin: Bin,
    #[serde(flatten)]
    pub cell: FlowCell,
}

/// All outputs of one computation.
#[derive(Debug, Clone, Serialize)]
pub struct HillResults {
    pub window: AnalysisWindow,
    #[serde(skip)]
    pub grid: BinGrid,
    pub categories: CategorySet,
    #[serde(skip)]
    pub flows: FlowTable,
    pub report: RecordReport,
    pub violations: Vec<ConservationViolation>,
    /// Time-of-week summary, empty when disabled.
    pub summary: Vec<SummaryCell>,
    /// Whole-window summary, empty when disabled.
    pub stationary: Vec<StationaryCell>,
    pub los: Vec<LosCell>,
}

impl HillResults {
    /// The flow table as labelled rows, category-major.
    pub fn flow_rows(&self) -> Vec<FlowRow> {
        (0..self.flows.slots())
            .flat_map(|slot| {
                self.flows
                    .series(slot)
                    .iter()
                    .enumerate()
                    .map(move |(index, cell)| FlowRow {
                        category: self.categories.label(slot).to_string(),
                        bin: self.grid.bin(index),
                        cell: *cell,
                    })
            })
            .collect()
    }
}

/// Computes flows, conservation diagnostics and summaries for `stops`.
///
/// Only configuration problems fail the call; invalid records are skipped
/// and listed in [`HillResults::report`].
pub fn compute<S: Stop + Sync>(
    stops: &[S],
    config: &AnalysisConfig,
) -> Result<HillResults, ConfigurationError> {
    config.validate()?;
    let window = AnalysisWindow::new(
        config.window.start(),
        config.window.end(),
        config.window.bin_size_minutes(),
    )?;
    let grid = BinGrid::new(window);

    let categories = if config.use_categories {
        CategorySet::from_labels(
            admitted_labels(stops, &grid, config),
            &config.excluded_categories,
        )
    } else {
        CategorySet::total_excluding(&config.excluded_categories)
    };
    tracing::info!(
        visits = stops.len(),
        bins = grid.len(),
        bin_size_minutes = grid.bin_size_minutes(),
        categories = categories.slots() - 1,
        edge_bins = %config.edge_bins,
        censored = %config.censored,
        "starting computation"
    );
    log_date_range(stops, &grid);

    let allocator = FlowAllocator::new(
        &grid,
        &categories,
        config.edge_bins,
        config.censored,
        config.use_weights,
    );
    let (accumulator, report) = accumulate(stops, &allocator, &grid, &categories);
    tracing::info!(
        allocated = report.allocated(),
        outside = report.outside,
        excluded = report.excluded,
        rejected = report.rejected.len(),
        "allocated visits"
    );

    let flows = accumulator.finish(categories.total_slot());
    let violations = ConservationChecker::new(
        config.tolerance,
        config.edge_bins,
        grid.bin_size_minutes(),
    )
    .check(&flows, &categories);

    let aggregator = StatsAggregator::new(&grid, &categories, &config.percentiles);
    let summary = if config.nonstationary_stats {
        aggregator.by_time_of_week(&flows)
    } else {
        Vec::new()
    };
    let stationary = if config.stationary_stats {
        aggregator.stationary(&flows)
    } else {
        Vec::new()
    };
    let los = LengthOfStaySummarizer::new(
        &grid,
        &categories,
        config.censored,
        config.use_weights,
        config.los_units,
        &config.percentiles,
    )
    .summarize(stops);

    Ok(HillResults {
        window,
        grid,
        categories,
        flows,
        report,
        violations,
        summary,
        stationary,
        los,
    })
}

/// Labels of the visits that pass validation and overlap `grid`.
fn admitted_labels<'a, S: Stop>(
    stops: &'a [S],
    grid: &BinGrid,
    config: &AnalysisConfig,
) -> impl Iterator<Item = Option<&'a str>> {
    stops
        .iter()
        .filter(move |stop| {
            StayInterval::from_stop(*stop, grid, config.censored, config.use_weights)
                .is_ok_and(|interval| interval.relation(grid) != StopRelation::Outside)
        })
        .map(|stop| stop.category())
}

/// Allocates chunks in parallel, one batch of chunks per round, and merges
/// partial accumulators in chunk order.
fn accumulate<S: Stop + Sync>(
    stops: &[S],
    allocator: &FlowAllocator<'_>,
    grid: &BinGrid,
    categories: &CategorySet,
) -> (FlowAccumulator, RecordReport) {
    let mut accumulator = FlowAccumulator::new(grid.len(), categories.slots());
    let mut report = RecordReport::default();

    let chunks: Vec<&[S]> = stops.chunks(CHUNK_SIZE).collect();
    // Bounds the number of partial tables alive at once.
    let round = rayon::current_num_threads().max(1);
    for batch in chunks.chunks(round) {
        let partials: Vec<(FlowAccumulator, RecordReport)> = batch
            .par_iter()
            .map(|chunk| allocate_chunk(chunk, allocator, grid, categories))
            .collect();
        for (partial, partial_report) in partials {
            accumulator.merge(&partial);
            report.merge(partial_report);
        }
    }
    (accumulator, report)
}

fn allocate_chunk<S: Stop>(
    chunk: &[S],
    allocator: &FlowAllocator<'_>,
    grid: &BinGrid,
    categories: &CategorySet,
) -> (FlowAccumulator, RecordReport) {
    let mut accumulator = FlowAccumulator::new(grid.len(), categories.slots());
    let mut report = RecordReport::default();
    for stop in chunk {
        match allocator.place(stop) {
            Ok(Placement::Allocated(allocation)) => {
                report.count(allocation.relation);
                accumulator.add(&allocation);
            }
            Ok(Placement::Outside) => report.count(StopRelation::Outside),
            Ok(Placement::Excluded) => report.excluded += 1,
            Err(err) => {
                tracing::warn!(visit = err.visit_id(), error = %err, "skipping invalid visit");
                report.rejected.push(err);
            }
        }
    }
    (accumulator, report)
}

/// Logs the data's timestamp range and warns when the window sits far from it.
fn log_date_range<S: Stop>(stops: &[S], grid: &BinGrid) {
    let min_entry = stops.iter().map(Stop::entry).min();
    let max_entry = stops.iter().map(Stop::entry).max();
    let min_exit = stops.iter().filter_map(Stop::exit).min();
    let max_exit = stops.iter().filter_map(Stop::exit).max();
    tracing::info!(
        min_entry = ?min_entry,
        max_entry = ?max_entry,
        min_exit = ?min_exit,
        max_exit = ?max_exit,
        "input timestamp range"
    );

    for warning in range_warnings(grid.start(), grid.end(), min_entry, max_exit) {
        tracing::warn!("{warning}");
    }
}

/// Messages for a window that starts well before the first arrival or ends
/// well after the last departure.
fn range_warnings(
    start: NaiveDateTime,
    end: NaiveDateTime,
    first_entry: Option<NaiveDateTime>,
    last_exit: Option<NaiveDateTime>,
) -> Vec<String> {
    let gap = Duration::hours(RANGE_WARNING_HOURS);
    let mut warnings = Vec::new();
    if let Some(first) = first_entry {
        if first - start > gap {
            warnings.push(format!(
                "analysis start {start} is more than {RANGE_WARNING_HOURS} hours before the first arrival {first}"
            ));
        }
    }
    if let Some(last) = last_exit {
        if end - last > gap {
            warnings.push(format!(
                "analysis end {end} is more than {RANGE_WARNING_HOURS} hours after the last departure {last}"
            ));
        }
    }
    warnings
}
