//! Aggregation of the flow table into time-of-week summaries.
//!
//! Each (day of week, time of day) pair occurs once per week in the window;
//! every occurrence is one sample. Groups are summarised in parallel.

use chrono::Weekday;
use rayon::prelude::*;
use serde::Serialize;

use crate::accumulator::{FlowCell, FlowTable};
use crate::category::{CategorySet, CategorySlot};
use crate::grid::{BinGrid, BinIndex};
use crate::stats::{Percentiles, SummaryStats};
use crate::types::Metric;

/// Statistics for one (category, metric, day of week, time of day) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCell {
    pub category: String,
    pub metric: Metric,
    pub day_of_week: Weekday,
    pub time_of_day_offset: u32,
    /// Clock time at the start of the bin, `HH:MM`.
    pub time_of_day: String,
    pub bin_of_week: u32,
    pub stats: SummaryStats,
}

/// Statistics for one (category, metric) pair over every bin in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationaryCell {
    pub category: String,
    pub metric: Metric,
    pub stats: SummaryStats,
}

fn metric_value(cell: &FlowCell, metric: Metric) -> f64 {
    match metric {
        Metric::Arrivals => cell.arrivals,
        Metric::Departures => cell.departures,
        Metric::Occupancy => cell.occupancy,
    }
}

/// Computes summary tables from a checked [`FlowTable`].
#[derive(Debug, Clone, Copy)]
pub struct StatsAggregator<'a> {
    grid: &'a BinGrid,
    categories: &'a CategorySet,
    percentiles: &'a Percentiles,
}

impl<'a> StatsAggregator<'a> {
    pub const fn new(
        grid: &'a BinGrid,
        categories: &'a CategorySet,
        percentiles: &'a Percentiles,
    ) -> Self {
        Self {
            grid,
            categories,
            percentiles,
        }
    }

    /// Slots to report: each category, then Total.
    fn slots(&self) -> Vec<CategorySlot> {
        self.categories
            .category_slots()
            .chain(std::iter::once(self.categories.total_slot()))
            .collect()
    }

    /// Bins grouped by their position in the week.
    fn week_groups(&self) -> Vec<Vec<BinIndex>> {
        let per_week = self.grid.bins_per_day() as usize * 7;
        let mut groups = vec![Vec::new(); per_week];
        for index in 0..self.grid.len() {
            groups[self.grid.bin_of_week(index) as usize].push(index);
        }
        groups
    }

    /// Summaries by category, metric, day of week and time of day.
    pub fn by_time_of_week(&self, table: &FlowTable) -> Vec<SummaryCell> {
        let groups = self.week_groups();
        let bins_per_day = self.grid.bins_per_day();

        let tasks: Vec<(CategorySlot, Metric, u32)> = self
            .slots()
            .into_iter()
            .flat_map(|slot| Metric::ALL.into_iter().map(move |metric| (slot, metric)))
            .flat_map(|(slot, metric)| {
                groups
                    .iter()
                    .enumerate()
                    .filter(|(_, bins)| !bins.is_empty())
                    .filter_map(move |(week_bin, _)| {
                        u32::try_from(week_bin).ok().map(|w| (slot, metric, w))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let cells: Vec<SummaryCell> = tasks
            .into_par_iter()
            .filter_map(|(slot, metric, week_bin)| {
                let bins = &groups[week_bin as usize];
                let sample: Vec<f64> = bins
                    .iter()
                    .map(|&bin| metric_value(table.cell(slot, bin), metric))
                    .collect();
                let stats = SummaryStats::from_sample(&sample, self.percentiles)?;
                let bin = self.grid.bin(bins[0]);
                Some(SummaryCell {
                    category: self.categories.label(slot).to_string(),
                    metric,
                    day_of_week: bin.day_of_week,
                    time_of_day_offset: bin.time_of_day_offset,
                    time_of_day: self.grid.time_of_day_label(bin.time_of_day_offset),
                    bin_of_week: week_bin,
                    stats,
                })
            })
            .collect();

        tracing::info!(
            cells = cells.len(),
            bins_per_day,
            "computed time-of-week summaries"
        );
        cells
    }

    /// Summaries by category and metric, ignoring time of day.
    pub fn stationary(&self, table: &FlowTable) -> Vec<StationaryCell> {
        let cells: Vec<StationaryCell> = self
            .slots()
            .into_iter()
            .flat_map(|slot| Metric::ALL.into_iter().map(move |metric| (slot, metric)))
            .collect::<Vec<_>>()
            .into_par_iter()
            .filter_map(|(slot, metric)| {
                let sample: Vec<f64> = table
                    .series(slot)
                    .iter()
                    .map(|cell| metric_value(cell, metric))
                    .collect();
                SummaryStats::from_sample(&sample, self.percentiles).map(|stats| StationaryCell {
                    category: self.categories.label(slot).to_string(),
                    metric,
                    stats,
                })
            })
            .collect();

        tracing::info!(cells = cells.len(), "computed stationary summaries");
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::FlowAccumulator;
    use crate::allocation::{FlowAllocator, Placement};
    use crate::category::TOTAL;
    use crate::grid::AnalysisWindow;
    use crate::types::{CensoredPolicy, EdgeBins, Visit};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn dt(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    /// Three weeks of hourly bins starting Monday 2024-01-01.
    fn grid() -> BinGrid {
        BinGrid::new(AnalysisWindow::new(dt(1, 0, 0), dt(22, 0, 0), 60).unwrap())
    }

    fn table(grid: &BinGrid, visits: &[Visit], cats: &CategorySet) -> FlowTable {
        let allocator =
            FlowAllocator::new(grid, cats, EdgeBins::Fractional, CensoredPolicy::Reject, false);
        let mut acc = FlowAccumulator::new(grid.len(), cats.slots());
        for visit in visits {
            if let Ok(Placement::Allocated(a)) = allocator.place(visit) {
                acc.add(&a);
            }
        }
        acc.finish(cats.total_slot())
    }

    fn find<'c>(
        cells: &'c [SummaryCell],
        category: &str,
        metric: Metric,
        dow: Weekday,
        offset: u32,
    ) -> &'c SummaryCell {
        cells
            .iter()
            .find(|c| {
                c.category == category
                    && c.metric == metric
                    && c.day_of_week == dow
                    && c.time_of_day_offset == offset
            })
            .expect("summary cell should exist")
    }

    #[test]
    fn test_groups_weeks_into_samples() {
        let grid = grid();
        // Monday 09:00-10:30 in weeks one and three only.
        let visits = vec![
            Visit::new("a", dt(1, 9, 0), dt(1, 10, 30)),
            Visit::new("b", dt(15, 9, 0), dt(15, 10, 30)),
        ];
        let cats = CategorySet::total_only();
        let table = table(&grid, &visits, &cats);
        let percentiles = Percentiles::new(vec![50.0]).unwrap();
        let cells = StatsAggregator::new(&grid, &cats, &percentiles).by_time_of_week(&table);

        // 3 metrics x 168 week bins, Total only.
        assert_eq!(cells.len(), 3 * 168);

        let nine = find(&cells, TOTAL, Metric::Occupancy, Weekday::Mon, 9);
        assert_eq!(nine.stats.count, 3);
        assert!((nine.stats.mean - 2.0 / 3.0).abs() < 1e-12);
        assert!((nine.stats.max - 1.0).abs() < 1e-12);
        assert!((nine.stats.percentile(50.0).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(nine.time_of_day, "09:00");
        assert_eq!(nine.bin_of_week, 9);

        let ten = find(&cells, TOTAL, Metric::Occupancy, Weekday::Mon, 10);
        assert!((ten.stats.mean - 1.0 / 3.0).abs() < 1e-12);

        let arrivals = find(&cells, TOTAL, Metric::Arrivals, Weekday::Mon, 9);
        assert!((arrivals.stats.mean - 2.0 / 3.0).abs() < 1e-12);

        let quiet = find(&cells, TOTAL, Metric::Occupancy, Weekday::Tue, 9);
        assert!(quiet.stats.mean.abs() < 1e-12);
        assert_eq!(quiet.stats.cv, None);
    }

    #[test]
    fn test_categories_and_total_reported() {
        let grid = grid();
        let visits = vec![
            Visit::new("a", dt(2, 9, 0), dt(2, 12, 0)).with_category("ART"),
            Visit::new("b", dt(2, 9, 0), dt(2, 12, 0)).with_category("IVT"),
            Visit::new("c", dt(9, 9, 0), dt(9, 12, 0)).with_category("IVT"),
        ];
        let cats = CategorySet::discover(&visits, &[]);
        let table = table(&grid, &visits, &cats);
        let percentiles = Percentiles::default();
        let cells = StatsAggregator::new(&grid, &cats, &percentiles).by_time_of_week(&table);

        assert_eq!(cells.len(), 3 * 3 * 168);
        let total = find(&cells, TOTAL, Metric::Occupancy, Weekday::Tue, 10);
        let ivt = find(&cells, "IVT", Metric::Occupancy, Weekday::Tue, 10);
        let art = find(&cells, "ART", Metric::Occupancy, Weekday::Tue, 10);
        assert!((total.stats.mean - 1.0).abs() < 1e-12);
        assert!((ivt.stats.mean - 2.0 / 3.0).abs() < 1e-12);
        assert!((art.stats.mean - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(cells[0].category, "ART");
        assert_eq!(cells.last().map(|c| c.category.as_str()), Some(TOTAL));
    }

    #[test]
    fn test_partial_week_only_reports_observed_bins() {
        let grid = BinGrid::new(AnalysisWindow::new(dt(1, 0, 0), dt(3, 0, 0), 30).unwrap());
        let cats = CategorySet::total_only();
        let table = table(&grid, &[], &cats);
        let percentiles = Percentiles::default();
        let cells = StatsAggregator::new(&grid, &cats, &percentiles).by_time_of_week(&table);
        assert_eq!(cells.len(), 3 * 96);
        assert!(cells.iter().all(|c| c.stats.count == 1));
    }

    #[test]
    fn test_stationary_summary() {
        let grid = grid();
        let start = dt(1, 0, 0);
        let visits = vec![Visit::new("a", start, start + Duration::days(21))];
        let cats = CategorySet::total_only();
        let table = table(&grid, &visits, &cats);
        let percentiles = Percentiles::default();
        let cells = StatsAggregator::new(&grid, &cats, &percentiles).stationary(&table);

        assert_eq!(cells.len(), 3);
        let occupancy = cells.iter().find(|c| c.metric == Metric::Occupancy).unwrap();
        assert_eq!(occupancy.stats.count, grid.len());
        assert!((occupancy.stats.mean - 1.0).abs() < 1e-12);
        assert!(occupancy.stats.stdev.abs() < 1e-12);
    }
}
