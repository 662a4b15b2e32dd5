//! Accumulation of allocations into the bin x category flow table.
//!
//! The accumulator keeps dense, slot-major arrays. Edge shares, arrivals and
//! departures are added in place; interior runs and the end-of-bin level are
//! kept as difference arrays and only resolved by one prefix-sum pass in
//! [`FlowAccumulator::finish`]. Two accumulators over the same grid merge by
//! element-wise addition, so visit partitions can be accumulated
//! independently and combined in any grouping.

use serde::Serialize;

use crate::allocation::Allocation;
use crate::category::CategorySlot;
use crate::grid::BinIndex;

/// Flow measures for one (bin, category) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FlowCell {
    /// Weighted entries in the bin.
    pub arrivals: f64,
    /// Weighted exits in the bin.
    pub departures: f64,
    /// Bin-averaged weighted occupancy.
    pub occupancy: f64,
    /// Weighted entities present at the close of the bin.
    pub level: f64,
}

/// Totals computed from raw timestamps during allocation, per category.
///
/// These are independent of the bin arithmetic and are what the
/// conservation checks compare the finished table against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FlowLedger {
    pub arrivals: f64,
    pub departures: f64,
    /// Weighted minutes of presence inside the window.
    pub occupancy_minutes: f64,
    /// Weight of visits already present when the window opened.
    pub open_at_start: f64,
}

impl FlowLedger {
    fn add(&mut self, other: &Self) {
        self.arrivals += other.arrivals;
        self.departures += other.departures;
        self.occupancy_minutes += other.occupancy_minutes;
        self.open_at_start += other.open_at_start;
    }
}

/// Additive accumulator over a fixed number of bins and category slots.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowAccumulator {
    bins: usize,
    slots: usize,
    arrivals: Vec<f64>,
    departures: Vec<f64>,
    edges: Vec<f64>,
    /// `bins + 1` entries per slot so `last_bin` deltas never go out of range.
    interior_deltas: Vec<f64>,
    level_deltas: Vec<f64>,
    ledgers: Vec<FlowLedger>,
    visits: usize,
}

impl FlowAccumulator {
    pub fn new(bins: usize, slots: usize) -> Self {
        Self {
            bins,
            slots,
            arrivals: vec![0.0; bins * slots],
            departures: vec![0.0; bins * slots],
            edges: vec![0.0; bins * slots],
            interior_deltas: vec![0.0; (bins + 1) * slots],
            level_deltas: vec![0.0; (bins + 1) * slots],
            ledgers: vec![FlowLedger::default(); slots],
            visits: 0,
        }
    }

    /// Number of allocations added so far.
    pub const fn visits(&self) -> usize {
        self.visits
    }

    const fn cell(&self, slot: CategorySlot, bin: BinIndex) -> usize {
        slot * self.bins + bin
    }

    const fn delta(&self, slot: CategorySlot, bin: BinIndex) -> usize {
        slot * (self.bins + 1) + bin
    }

    /// Adds one visit's footprint in O(1).
    pub fn add(&mut self, allocation: &Allocation) {
        let slot = allocation.slot;
        let w = allocation.weight;

        if let Some(bin) = allocation.arrival {
            let i = self.cell(slot, bin);
            self.arrivals[i] += w;
        }
        if let Some(bin) = allocation.departure {
            let i = self.cell(slot, bin);
            self.departures[i] += w;
            let d = self.delta(slot, bin);
            self.level_deltas[d] -= w;
        }

        let ledger = &mut self.ledgers[slot];
        if allocation.entered_inside() {
            ledger.arrivals += w;
        }
        if allocation.left_inside() {
            ledger.departures += w;
        }
        ledger.occupancy_minutes += allocation.occupancy_minutes;
        if allocation.open_at_start() {
            ledger.open_at_start += w;
        }

        let first = self.cell(slot, allocation.first_bin);
        self.edges[first] += allocation.first_share;
        if allocation.last_bin != allocation.first_bin {
            let last = self.cell(slot, allocation.last_bin);
            self.edges[last] += allocation.last_share;
        }
        if let Some(deltas) = allocation.interior_deltas() {
            for (bin, amount) in deltas {
                let d = self.delta(slot, bin);
                self.interior_deltas[d] += amount;
            }
        }
        let d = self.delta(slot, allocation.first_bin);
        self.level_deltas[d] += w;

        self.visits += 1;
    }

    /// Folds another accumulator over the same grid into this one.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!((self.bins, self.slots), (other.bins, other.slots));
        add_into(&mut self.arrivals, &other.arrivals);
        add_into(&mut self.departures, &other.departures);
        add_into(&mut self.edges, &other.edges);
        add_into(&mut self.interior_deltas, &other.interior_deltas);
        add_into(&mut self.level_deltas, &other.level_deltas);
        for (ledger, theirs) in self.ledgers.iter_mut().zip(&other.ledgers) {
            ledger.add(theirs);
        }
        self.visits += other.visits;
    }

    /// Resolves the difference arrays and sums categories into `total_slot`.
    pub fn finish(self, total_slot: CategorySlot) -> FlowTable {
        let mut cells = vec![FlowCell::default(); self.bins * self.slots];

        for slot in 0..self.slots {
            let mut interior = 0.0;
            let mut level = 0.0;
            for bin in 0..self.bins {
                let i = self.cell(slot, bin);
                let d = self.delta(slot, bin);
                interior += self.interior_deltas[d];
                level += self.level_deltas[d];
                cells[i] = FlowCell {
                    arrivals: self.arrivals[i],
                    departures: self.departures[i],
                    occupancy: self.edges[i] + interior,
                    level,
                };
            }
        }

        let mut ledgers = self.ledgers;
        for slot in (0..self.slots).filter(|&s| s != total_slot) {
            for bin in 0..self.bins {
                let from = cells[slot * self.bins + bin];
                let total = &mut cells[total_slot * self.bins + bin];
                total.arrivals += from.arrivals;
                total.departures += from.departures;
                total.occupancy += from.occupancy;
                total.level += from.level;
            }
            let from = ledgers[slot];
            ledgers[total_slot].add(&from);
        }

        FlowTable {
            bins: self.bins,
            slots: self.slots,
            cells,
            ledgers,
        }
    }
}

fn add_into(into: &mut [f64], from: &[f64]) {
    for (a, b) in into.iter_mut().zip(from) {
        *a += b;
    }
}

/// Finished flow table, slot-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowTable {
    bins: usize,
    slots: usize,
    cells: Vec<FlowCell>,
    ledgers: Vec<FlowLedger>,
}

impl FlowTable {
    pub const fn bins(&self) -> usize {
        self.bins
    }

    pub const fn slots(&self) -> usize {
        self.slots
    }

    pub fn cell(&self, slot: CategorySlot, bin: BinIndex) -> &FlowCell {
        &self.cells[slot * self.bins + bin]
    }

    /// All bins of one category, in bin order.
    pub fn series(&self, slot: CategorySlot) -> &[FlowCell] {
        &self.cells[slot * self.bins..(slot + 1) * self.bins]
    }

    pub fn ledger(&self, slot: CategorySlot) -> &FlowLedger {
        &self.ledgers[slot]
    }
}
