//! Input records and policy selectors.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A stop record suitable for occupancy analysis.
///
/// This trait allows the engine to work with different visit representations
/// (e.g., rows decoded by an ingestion layer, or test fixtures).
pub trait Stop {
    /// Opaque identifier used in rejection reports.
    fn id(&self) -> &str;

    /// When the entity entered the system.
    fn entry(&self) -> NaiveDateTime;

    /// When the entity left, or `None` if still present when data was collected.
    fn exit(&self) -> Option<NaiveDateTime>;

    /// Category label, if the record carries one.
    fn category(&self) -> Option<&str> {
        None
    }

    /// Occupancy weight. Defaults to one entity.
    fn weight(&self) -> f64 {
        1.0
    }
}

/// A single visit: one entity entering, staying and leaving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: String,
    pub entry: NaiveDateTime,
    #[serde(default)]
    pub exit: Option<NaiveDateTime>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

const fn default_weight() -> f64 {
    1.0
}

impl Visit {
    /// Creates a closed visit with unit weight and no category.
    pub fn new(id: impl Into<String>, entry: NaiveDateTime, exit: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            entry,
            exit: Some(exit),
            category: None,
            weight: 1.0,
        }
    }

    /// Creates a visit with no recorded exit.
    pub fn open(id: impl Into<String>, entry: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            entry,
            exit: None,
            category: None,
            weight: 1.0,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Stop for Visit {
    fn id(&self) -> &str {
        &self.id
    }

    fn entry(&self) -> NaiveDateTime {
        self.entry
    }

    fn exit(&self) -> Option<NaiveDateTime> {
        self.exit
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

/// How the arrival and departure bins of a visit are credited with occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeBins {
    /// Credit the fraction of the bin the visit actually covers.
    #[default]
    Fractional,
    /// Credit the whole bin.
    Whole,
}

impl EdgeBins {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fractional => "fractional",
            Self::Whole => "whole",
        }
    }
}

impl fmt::Display for EdgeBins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do with visits that have no exit timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CensoredPolicy {
    /// Reject the visit with [`InvalidIntervalError::MissingExit`](crate::InvalidIntervalError::MissingExit).
    #[default]
    Reject,
    /// Treat the visit as present through the end of the window.
    Open,
}

impl CensoredPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for CensoredPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit for length-of-stay statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LosUnits {
    Minutes,
    #[default]
    Hours,
    Days,
}

impl LosUnits {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }

    const fn millis(self) -> f64 {
        match self {
            Self::Minutes => 60_000.0,
            Self::Hours => 3_600_000.0,
            Self::Days => 86_400_000.0,
        }
    }

    /// Expresses a duration in this unit.
    #[allow(clippy::cast_precision_loss)]
    pub fn convert(self, duration: Duration) -> f64 {
        duration.num_milliseconds() as f64 / self.millis()
    }
}

impl fmt::Display for LosUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the three flow measures tracked per bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Arrivals,
    Departures,
    Occupancy,
}

impl Metric {
    pub const ALL: [Self; 3] = [Self::Arrivals, Self::Departures, Self::Occupancy];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Arrivals => "arrivals",
            Self::Departures => "departures",
            Self::Occupancy => "occupancy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
