//! Length-of-stay statistics per category.

use serde::Serialize;

use crate::allocation::{StayInterval, StopRelation};
use crate::category::CategorySet;
use crate::grid::BinGrid;
use crate::stats::{Percentiles, SummaryStats};
use crate::types::{CensoredPolicy, LosUnits, Stop};

/// Length-of-stay statistics for one category (or Total).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LosCell {
    pub category: String,
    pub units: LosUnits,
    pub stats: SummaryStats,
}

/// Summarises stay durations of the visits that touch the window.
///
/// Durations are full stays, not clipped to the window. Open visits, when
/// admitted, run to the end of the grid. Visits are validated the same way as
/// for flow allocation, so rejected records never reach a sample.
#[derive(Debug, Clone, Copy)]
pub struct LengthOfStaySummarizer<'a> {
    grid: &'a BinGrid,
    categories: &'a CategorySet,
    censored: CensoredPolicy,
    use_weights: bool,
    units: LosUnits,
    percentiles: &'a Percentiles,
}

impl<'a> LengthOfStaySummarizer<'a> {
    pub const fn new(
        grid: &'a BinGrid,
        categories: &'a CategorySet,
        censored: CensoredPolicy,
        use_weights: bool,
        units: LosUnits,
        percentiles: &'a Percentiles,
    ) -> Self {
        Self {
            grid,
            categories,
            censored,
            use_weights,
            units,
            percentiles,
        }
    }

    /// One cell per category with at least one stay, then Total.
    pub fn summarize<S: Stop>(&self, stops: &[S]) -> Vec<LosCell> {
        let mut samples: Vec<Vec<f64>> = vec![Vec::new(); self.categories.slots()];
        let total = self.categories.total_slot();

        for stop in stops {
            let Ok(interval) =
                StayInterval::from_stop(stop, self.grid, self.censored, self.use_weights)
            else {
                continue;
            };
            let Some(slot) = self.categories.resolve(stop.category()) else {
                continue;
            };
            if interval.relation(self.grid) == StopRelation::Outside {
                continue;
            }
            let los = self.units.convert(interval.duration());
            if slot != total {
                samples[slot].push(los);
            }
            samples[total].push(los);
        }

        let cells: Vec<LosCell> = samples
            .iter()
            .enumerate()
            .filter_map(|(slot, sample)| {
                SummaryStats::from_sample(sample, self.percentiles).map(|stats| LosCell {
                    category: self.categories.label(slot).to_string(),
                    units: self.units,
                    stats,
                })
            })
            .collect();

        tracing::debug!(
            stays = samples[total].len(),
            categories = cells.len(),
            "computed length of stay summaries"
        );
        cells
    }
}
