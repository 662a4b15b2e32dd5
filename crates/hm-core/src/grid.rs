//! The analysis window and the grid of time bins covering it.
//!
//! Bins are half-open `[start_ts, end_ts)` and aligned to midnight so that a
//! given time-of-day offset names the same clock interval on every day. The
//! bin count is the ceiling of `(end - start) / bin_size`, so the grid may run
//! past the requested end by less than one bin; [`BinGrid::end`] is the
//! effective end used for every inside/outside test.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Ordinal index of a bin within the analysis window.
pub type BinIndex = usize;

/// The validated time span being analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
    bin_size_minutes: u32,
}

impl AnalysisWindow {
    /// Validates and creates a window.
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        bin_size_minutes: u32,
    ) -> Result<Self, ConfigurationError> {
        if bin_size_minutes == 0 {
            return Err(ConfigurationError::ZeroBinSize);
        }
        if MINUTES_PER_DAY % bin_size_minutes != 0 {
            return Err(ConfigurationError::BinSizeNotDivisor {
                minutes: bin_size_minutes,
            });
        }
        if end <= start {
            return Err(ConfigurationError::EmptyWindow { start, end });
        }
        let minute_of_day = start.hour() * 60 + start.minute();
        if start.second() != 0
            || start.nanosecond() != 0
            || minute_of_day % bin_size_minutes != 0
        {
            return Err(ConfigurationError::MisalignedStart {
                start,
                bin_minutes: bin_size_minutes,
            });
        }
        Ok(Self {
            start,
            end,
            bin_size_minutes,
        })
    }

    pub const fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub const fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub const fn bin_size_minutes(&self) -> u32 {
        self.bin_size_minutes
    }
}

/// Where a timestamp falls relative to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinPosition {
    Before,
    Within(BinIndex),
    After,
}

/// Descriptor of a single bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bin {
    pub index: BinIndex,
    pub start_ts: NaiveDateTime,
    pub end_ts: NaiveDateTime,
    /// Position of the bin within its day, `0..bins_per_day`.
    pub time_of_day_offset: u32,
    pub day_of_week: Weekday,
}

/// Ordered, gap-free bins covering an [`AnalysisWindow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinGrid {
    window: AnalysisWindow,
    len: usize,
}

impl BinGrid {
    pub fn new(window: AnalysisWindow) -> Self {
        let span_ms = (window.end - window.start).num_milliseconds();
        let bin_ms = i64::from(window.bin_size_minutes) * 60_000;
        // Ceiling; span is positive by construction.
        let len = usize::try_from((span_ms + bin_ms - 1) / bin_ms).unwrap_or(usize::MAX);
        Self { window, len }
    }

    pub const fn window(&self) -> &AnalysisWindow {
        &self.window
    }

    /// Number of bins.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn bin_size_minutes(&self) -> u32 {
        self.window.bin_size_minutes
    }

    pub fn bin_size(&self) -> Duration {
        Duration::minutes(i64::from(self.window.bin_size_minutes))
    }

    pub(crate) fn bin_millis(&self) -> i64 {
        i64::from(self.window.bin_size_minutes) * 60_000
    }

    pub const fn bins_per_day(&self) -> u32 {
        MINUTES_PER_DAY / self.window.bin_size_minutes
    }

    pub const fn start(&self) -> NaiveDateTime {
        self.window.start
    }

    /// Effective end of the grid: the end of the last bin.
    pub fn end(&self) -> NaiveDateTime {
        self.bin_start(self.len)
    }

    /// Start timestamp of bin `index` (or of the position just past the grid).
    pub fn bin_start(&self, index: BinIndex) -> NaiveDateTime {
        let offset = i64::try_from(index).unwrap_or(i64::MAX / self.bin_millis());
        self.window.start + Duration::milliseconds(offset * self.bin_millis())
    }

    /// Milliseconds between the grid start and `ts`.
    pub(crate) fn offset_millis(&self, ts: NaiveDateTime) -> i64 {
        (ts - self.window.start).num_milliseconds()
    }

    /// Locates the bin containing `ts`.
    pub fn locate(&self, ts: NaiveDateTime) -> BinPosition {
        let offset = self.offset_millis(ts);
        if offset < 0 {
            return BinPosition::Before;
        }
        match usize::try_from(offset / self.bin_millis()) {
            Ok(index) if index < self.len => BinPosition::Within(index),
            _ => BinPosition::After,
        }
    }

    /// Describes bin `index`.
    pub fn bin(&self, index: BinIndex) -> Bin {
        let start_ts = self.bin_start(index);
        Bin {
            index,
            start_ts,
            end_ts: self.bin_start(index + 1),
            time_of_day_offset: self.time_of_day_offset(start_ts),
            day_of_week: start_ts.weekday(),
        }
    }

    /// Iterates over every bin in order.
    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        (0..self.len).map(|index| self.bin(index))
    }

    fn time_of_day_offset(&self, ts: NaiveDateTime) -> u32 {
        (ts.hour() * 60 + ts.minute()) / self.window.bin_size_minutes
    }

    /// Position of bin `index` within its week, Monday 00:00 being 0.
    pub fn bin_of_week(&self, index: BinIndex) -> u32 {
        let bin = self.bin(index);
        bin.day_of_week.num_days_from_monday() * self.bins_per_day() + bin.time_of_day_offset
    }

    /// Clock label (`HH:MM`) for a time-of-day offset.
    pub fn time_of_day_label(&self, offset: u32) -> String {
        let minutes = offset * self.window.bin_size_minutes;
        format!("{:02}:{:02}", minutes / 60, minutes % 60)
    }
}
