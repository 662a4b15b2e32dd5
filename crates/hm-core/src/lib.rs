//! Core engine for occupancy analysis.
//!
//! This crate turns entry/exit records into per-bin flow tables and their
//! time-of-week statistics:
//! - Grid: the analysis window divided into fixed-size bins
//! - Allocation: each visit's O(1) footprint on the grid
//! - Accumulation: flow tables resolved by a single prefix-sum pass
//! - Conservation: balance checks over the finished tables
//! - Summaries: time-of-week, whole-window and length-of-stay statistics

mod accumulator;
mod allocation;
pub mod category;
mod conservation;
mod engine;
mod error;
pub mod grid;
mod los;
pub mod stats;
mod summary;
mod types;

pub use accumulator::{FlowAccumulator, FlowCell, FlowLedger, FlowTable};
pub use allocation::{Allocation, FlowAllocator, Placement, StopRelation};
pub use category::{CategorySet, TOTAL, UNCATEGORIZED};
pub use conservation::{
    ConservationChecker, ConservationViolation, DEFAULT_TOLERANCE, ViolationKind,
};
pub use engine::{AnalysisConfig, FlowRow, HillResults, RecordReport, compute};
pub use error::{ConfigurationError, InvalidIntervalError};
pub use grid::{AnalysisWindow, Bin, BinGrid, BinIndex};
pub use los::{LengthOfStaySummarizer, LosCell};
pub use stats::{PercentileValue, Percentiles, SummaryStats};
pub use summary::{StationaryCell, StatsAggregator, SummaryCell};
pub use types::{CensoredPolicy, EdgeBins, LosUnits, Metric, Stop, Visit};
