//! Run command: read visits, compute, and report.
//!
//! This module implements `hm run` with human-readable and JSON output.

use std::fmt::{self, Write};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, ValueEnum};
use serde::Serialize;

use hm_core::{
    CensoredPolicy, EdgeBins, FlowRow, HillResults, LosUnits, Metric, SummaryCell, Visit, compute,
};

use crate::Config;

/// Edge-bin policy as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EdgeBinsArg {
    Fractional,
    Whole,
}

impl From<EdgeBinsArg> for EdgeBins {
    fn from(arg: EdgeBinsArg) -> Self {
        match arg {
            EdgeBinsArg::Fractional => Self::Fractional,
            EdgeBinsArg::Whole => Self::Whole,
        }
    }
}

/// Censored-exit policy as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CensoredArg {
    Reject,
    Open,
}

impl From<CensoredArg> for CensoredPolicy {
    fn from(arg: CensoredArg) -> Self {
        match arg {
            CensoredArg::Reject => Self::Reject,
            CensoredArg::Open => Self::Open,
        }
    }
}

/// Length-of-stay unit as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LosUnitsArg {
    Minutes,
    Hours,
    Days,
}

impl From<LosUnitsArg> for LosUnits {
    fn from(arg: LosUnitsArg) -> Self {
        match arg {
            LosUnitsArg::Minutes => Self::Minutes,
            LosUnitsArg::Hours => Self::Hours,
            LosUnitsArg::Days => Self::Days,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON-lines file of visits (`id`, `entry`, `exit`, `category`, `weight`).
    #[arg(long)]
    pub visits: PathBuf,

    /// Start of the analysis window, e.g. 2024-01-01T00:00:00.
    #[arg(long)]
    pub start: Option<NaiveDateTime>,

    /// End of the analysis window.
    #[arg(long)]
    pub end: Option<NaiveDateTime>,

    /// Bin width in minutes.
    #[arg(long)]
    pub bin_size: Option<u32>,

    /// How arrival and departure bins are credited.
    #[arg(long, value_enum)]
    pub edge_bins: Option<EdgeBinsArg>,

    /// What to do with visits missing an exit.
    #[arg(long, value_enum)]
    pub censored: Option<CensoredArg>,

    /// Ignore category labels and report only the Total series.
    #[arg(long)]
    pub no_categories: bool,

    /// Weight each visit by its `weight` field.
    #[arg(long)]
    pub use_weights: bool,

    /// Skip visits in this category (repeatable).
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Percentiles to report, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub percentiles: Option<Vec<f64>>,

    /// Unit for length-of-stay statistics.
    #[arg(long, value_enum)]
    pub los_units: Option<LosUnitsArg>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(start) = self.start {
            config.start = Some(start);
        }
        if let Some(end) = self.end {
            config.end = Some(end);
        }
        if let Some(bin_size) = self.bin_size {
            config.bin_size_minutes = bin_size;
        }
        if let Some(edge_bins) = self.edge_bins {
            config.edge_bins = edge_bins.into();
        }
        if let Some(censored) = self.censored {
            config.censored = censored.into();
        }
        if self.no_categories {
            config.use_categories = false;
        }
        if self.use_weights {
            config.use_weights = true;
        }
        config.excluded_categories.extend(self.exclude.iter().cloned());
        if let Some(percentiles) = &self.percentiles {
            config.percentiles.clone_from(percentiles);
        }
        if let Some(units) = self.los_units {
            config.los_units = units.into();
        }
    }
}

/// Reads JSON-lines visits. Blank lines are skipped; any malformed line fails
/// the whole read.
pub fn read_visits<R: BufRead>(reader: R) -> Result<Vec<Visit>> {
    let mut visits = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let visit: Visit = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid visit on line {}", idx + 1))?;
        visits.push(visit);
    }
    Ok(visits)
}

fn load_visits(path: &Path) -> Result<Vec<Visit>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_visits(BufReader::new(file)).with_context(|| format!("failed to read {}", path.display()))
}

/// Full results plus the labelled flow table.
#[derive(Serialize)]
struct JsonOutput<'a> {
    #[serde(flatten)]
    results: &'a HillResults,
    flows: Vec<FlowRow>,
}

/// Formats results as JSON.
pub fn format_results_json(results: &HillResults) -> Result<String> {
    let output = JsonOutput {
        results,
        flows: results.flow_rows(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Highest mean occupancy across time-of-week cells, per category.
fn peak_occupancy(summary: &[SummaryCell]) -> Vec<&SummaryCell> {
    let mut peaks: Vec<&SummaryCell> = Vec::new();
    for cell in summary.iter().filter(|c| c.metric == Metric::Occupancy) {
        match peaks.iter_mut().find(|p| p.category == cell.category) {
            Some(peak) if cell.stats.mean > peak.stats.mean => *peak = cell,
            Some(_) => {}
            None => peaks.push(cell),
        }
    }
    peaks
}

/// Formats results as a human-readable summary.
pub fn format_results(results: &HillResults) -> Result<String, fmt::Error> {
    let mut output = String::new();
    let window = &results.window;

    writeln!(
        output,
        "OCCUPANCY ANALYSIS: {} to {} ({} minute bins, {} bins)",
        window.start(),
        results.grid.end(),
        window.bin_size_minutes(),
        results.grid.len()
    )?;

    let report = &results.report;
    writeln!(output)?;
    writeln!(output, "RECORDS")?;
    writeln!(output, "───────")?;
    writeln!(output, "Read:      {}", report.total())?;
    writeln!(output, "Inner:     {}", report.inner)?;
    writeln!(output, "Left:      {}", report.left)?;
    writeln!(output, "Right:     {}", report.right)?;
    writeln!(output, "Outer:     {}", report.outer)?;
    writeln!(output, "Outside:   {}", report.outside)?;
    writeln!(output, "Excluded:  {}", report.excluded)?;
    writeln!(output, "Rejected:  {}", report.rejected.len())?;
    for err in report.rejected.iter().take(10) {
        writeln!(output, "  {err}")?;
    }
    if report.rejected.len() > 10 {
        writeln!(output, "  ... and {} more", report.rejected.len() - 10)?;
    }

    writeln!(output)?;
    writeln!(output, "CONSERVATION")?;
    writeln!(output, "────────────")?;
    if results.violations.is_empty() {
        writeln!(output, "All balance checks passed.")?;
    } else {
        writeln!(output, "{} violations:", results.violations.len())?;
        for violation in results.violations.iter().take(10) {
            writeln!(output, "  {violation}")?;
        }
        if results.violations.len() > 10 {
            writeln!(output, "  ... and {} more", results.violations.len() - 10)?;
        }
    }

    writeln!(output)?;
    writeln!(output, "PEAK MEAN OCCUPANCY")?;
    writeln!(output, "───────────────────")?;
    let peaks = peak_occupancy(&results.summary);
    if peaks.is_empty() {
        writeln!(output, "(time-of-week summary disabled)")?;
    }
    for peak in peaks {
        writeln!(
            output,
            "  {:<20}{:>8.2}  {} {}",
            peak.category, peak.stats.mean, peak.day_of_week, peak.time_of_day
        )?;
    }

    if !results.los.is_empty() {
        writeln!(output)?;
        writeln!(output, "LENGTH OF STAY")?;
        writeln!(output, "──────────────")?;
        for cell in &results.los {
            writeln!(
                output,
                "  {:<20}n={:<6} mean {:.2} max {:.2} ({})",
                cell.category, cell.stats.count, cell.stats.mean, cell.stats.max, cell.units
            )?;
        }
    }

    Ok(output)
}

/// Runs the run command.
pub fn run(args: &RunArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    let analysis = config.analysis()?;
    let visits = load_visits(&args.visits)?;
    tracing::debug!(count = visits.len(), path = ?args.visits, "loaded visits");

    let results = compute(&visits, &analysis).context("computation failed")?;

    if args.json {
        println!("{}", format_results_json(&results)?);
    } else {
        print!("{}", format_results(&results)?);
    }
    Ok(())
}
