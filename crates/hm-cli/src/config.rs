//! Configuration loading and management.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hm_core::{
    AnalysisConfig, AnalysisWindow, CensoredPolicy, DEFAULT_TOLERANCE, EdgeBins, LosUnits,
    Percentiles,
};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Start of the analysis window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDateTime>,

    /// End of the analysis window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDateTime>,

    /// Bin width in minutes; must divide a day.
    pub bin_size_minutes: u32,

    pub edge_bins: EdgeBins,
    pub censored: CensoredPolicy,
    pub use_categories: bool,
    pub use_weights: bool,
    pub excluded_categories: Vec<String>,

    /// Percentiles to report, in percent.
    pub percentiles: Vec<f64>,

    pub los_units: LosUnits,

    /// Relative tolerance for conservation checks.
    pub tolerance: f64,

    pub nonstationary_stats: bool,
    pub stationary_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            bin_size_minutes: 60,
            edge_bins: EdgeBins::default(),
            censored: CensoredPolicy::default(),
            use_categories: true,
            use_weights: false,
            excluded_categories: Vec::new(),
            percentiles: Percentiles::default().as_slice().to_vec(),
            los_units: LosUnits::default(),
            tolerance: DEFAULT_TOLERANCE,
            nonstationary_stats: true,
            stationary_stats: true,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (HM_*)
        figment = figment.merge(Env::prefixed("HM_"));

        figment.extract()
    }

    /// Converts into a validated engine configuration.
    pub fn analysis(&self) -> Result<AnalysisConfig> {
        let start = self
            .start
            .context("analysis start is required (--start or `start` in the config file)")?;
        let end = self
            .end
            .context("analysis end is required (--end or `end` in the config file)")?;
        let window = AnalysisWindow::new(start, end, self.bin_size_minutes)
            .context("invalid analysis window")?;
        let percentiles =
            Percentiles::new(self.percentiles.clone()).context("invalid percentiles")?;

        let config = AnalysisConfig {
            window,
            edge_bins: self.edge_bins,
            censored: self.censored,
            use_categories: self.use_categories,
            use_weights: self.use_weights,
            excluded_categories: self.excluded_categories.clone(),
            percentiles,
            los_units: self.los_units,
            tolerance: self.tolerance,
            nonstationary_stats: self.nonstationary_stats,
            stationary_stats: self.stationary_stats,
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Returns the platform-specific config directory for hm.
///
/// On Linux: `~/.config/hm`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hm"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_dirs_config_path_ends_with_hm() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "hm");
    }

    #[test]
    fn test_defaults_survive_figment_round_trip() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .extract()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("hm.toml");
        std::fs::write(
            &path,
            r#"
start = "2024-01-01T00:00:00"
end = "2024-01-08T00:00:00"
bin_size_minutes = 30
edge_bins = "whole"
excluded_categories = ["OBS"]
percentiles = [50.0, 90.0]
"#,
        )
        .unwrap();

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(config.start, Some(dt(1, 0)));
        assert_eq!(config.bin_size_minutes, 30);
        assert_eq!(config.edge_bins, EdgeBins::Whole);
        assert_eq!(config.excluded_categories, vec!["OBS".to_string()]);
        assert_eq!(config.censored, CensoredPolicy::Reject);

        let analysis = config.analysis().unwrap();
        assert_eq!(analysis.window.bin_size_minutes(), 30);
        assert_eq!(analysis.percentiles.as_slice(), &[50.0, 90.0]);
    }

    #[test]
    fn test_analysis_requires_window() {
        let err = Config::default().analysis().unwrap_err();
        assert!(err.to_string().contains("analysis start is required"));
    }

    #[test]
    fn test_analysis_rejects_bad_bin_size() {
        let config = Config {
            start: Some(dt(1, 0)),
            end: Some(dt(8, 0)),
            bin_size_minutes: 13,
            ..Config::default()
        };
        let err = config.analysis().unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "bin size of 13 minutes does not divide 1440 evenly"
        );
    }

    #[test]
    fn test_analysis_rejects_descending_percentiles() {
        let config = Config {
            start: Some(dt(1, 0)),
            end: Some(dt(8, 0)),
            percentiles: vec![90.0, 50.0],
            ..Config::default()
        };
        assert!(config.analysis().is_err());
    }
}
