//! Distributional summary statistics.
//!
//! Estimators follow the common data-frame conventions: sample variance with
//! an `n - 1` denominator, adjusted Fisher-Pearson skewness (`G1`) and excess
//! kurtosis (`G2`), and percentiles by linear interpolation between order
//! statistics.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Sums of squared deviations at or below this are floating-point noise and
/// the sample is treated as constant.
const ROUNDOFF_CUTOFF: f64 = 1e-14;

/// Validated, strictly ascending percentile list in percent units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Percentiles(Vec<f64>);

impl Percentiles {
    pub fn new(values: Vec<f64>) -> Result<Self, ConfigurationError> {
        let mut previous: Option<f64> = None;
        for &value in &values {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigurationError::PercentileOutOfRange { value });
            }
            if let Some(previous) = previous {
                if value <= previous {
                    return Err(ConfigurationError::PercentilesNotAscending { previous, value });
                }
            }
            previous = Some(value);
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Default for Percentiles {
    fn default() -> Self {
        Self(vec![25.0, 50.0, 75.0, 95.0, 99.0])
    }
}

impl TryFrom<Vec<f64>> for Percentiles {
    type Error = ConfigurationError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentiles> for Vec<f64> {
    fn from(p: Percentiles) -> Self {
        p.0
    }
}

/// One requested percentile and its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileValue {
    /// Column name, e.g. `p95` or `p97.5`.
    pub name: String,
    pub percentile: f64,
    pub value: f64,
}

/// Summary of a sample of real values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub variance: f64,
    pub stdev: f64,
    /// Coefficient of variation; `None` when the mean is zero.
    pub cv: Option<f64>,
    pub sem: f64,
    /// `None` for fewer than three values.
    pub skew: Option<f64>,
    /// Excess kurtosis; `None` for fewer than four values.
    pub kurtosis: Option<f64>,
    pub percentiles: Vec<PercentileValue>,
}

impl SummaryStats {
    /// Summarises `values`. Returns `None` for an empty sample.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_sample(values: &[f64], percentiles: &Percentiles) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
        for v in values {
            let d = v - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }

        let variance = if values.len() > 1 { m2 / (n - 1.0) } else { 0.0 };
        let stdev = variance.sqrt();
        let constant = m2 <= ROUNDOFF_CUTOFF;

        // Population central moments for the shape estimators.
        let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);
        let skew = (values.len() >= 3).then(|| {
            if constant {
                0.0
            } else {
                let g1 = m3 / m2.powf(1.5);
                (n * (n - 1.0)).sqrt() / (n - 2.0) * g1
            }
        });
        let kurtosis = (values.len() >= 4).then(|| {
            if constant {
                0.0
            } else {
                let g2 = m4 / (m2 * m2) - 3.0;
                ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
            }
        });

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let percentiles = percentiles
            .as_slice()
            .iter()
            .map(|&p| PercentileValue {
                name: percentile_name(p),
                percentile: p,
                value: interpolate(&sorted, p),
            })
            .collect();

        Some(Self {
            count: values.len(),
            mean,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            variance,
            stdev,
            cv: (mean != 0.0).then(|| stdev / mean),
            sem: stdev / n.sqrt(),
            skew,
            kurtosis,
            percentiles,
        })
    }

    /// Looks up a computed percentile by its percent value.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|pv| (pv.percentile - p).abs() < 1e-9)
            .map(|pv| pv.value)
    }
}

/// Linear interpolation between order statistics of a sorted, non-empty sample.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p / 100.0;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn percentile_name(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("p{p:.0}")
    } else {
        format!("p{p}")
    }
}
