//! Error types for the engine.
//!
//! Configuration problems are fatal and surface before any allocation work.
//! Interval problems are per record: the offending visit is skipped and the
//! error is kept in the [`RecordReport`](crate::RecordReport).

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

/// Problems with the analysis configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Bin size was zero.
    #[error("bin size must be a positive number of minutes")]
    ZeroBinSize,

    /// Bin size does not split a day into equal bins.
    #[error("bin size of {minutes} minutes does not divide 1440 evenly")]
    BinSizeNotDivisor { minutes: u32 },

    /// Window end is not after window start.
    #[error("analysis end {end} must be after analysis start {start}")]
    EmptyWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// Window start does not fall on a bin boundary of its day.
    #[error("analysis start {start} is not aligned to a {bin_minutes} minute bin boundary")]
    MisalignedStart {
        start: NaiveDateTime,
        bin_minutes: u32,
    },

    /// A percentile outside `[0, 100]`.
    #[error("percentile {value} must be between 0 and 100")]
    PercentileOutOfRange { value: f64 },

    /// Percentiles were not strictly ascending.
    #[error("percentiles must be strictly ascending, got {previous} then {value}")]
    PercentilesNotAscending { previous: f64, value: f64 },

    /// Conservation tolerance was negative or not finite.
    #[error("tolerance must be a finite non-negative number, got {value}")]
    InvalidTolerance { value: f64 },
}

/// A visit that cannot be allocated.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidIntervalError {
    /// Exit timestamp precedes entry timestamp.
    #[error("visit {id}: exit {exit} is before entry {entry}")]
    ExitBeforeEntry {
        id: String,
        entry: NaiveDateTime,
        exit: NaiveDateTime,
    },

    /// No exit timestamp and the censored policy rejects open visits.
    #[error("visit {id}: missing exit timestamp")]
    MissingExit { id: String },

    /// Occupancy weight was not a positive finite number.
    #[error("visit {id}: weight must be positive and finite, got {weight}")]
    InvalidWeight { id: String, weight: f64 },
}

impl InvalidIntervalError {
    /// Identifier of the rejected visit.
    pub fn visit_id(&self) -> &str {
        match self {
            Self::ExitBeforeEntry { id, .. }
            | Self::MissingExit { id }
            | Self::InvalidWeight { id, .. } => id,
        }
    }
}
