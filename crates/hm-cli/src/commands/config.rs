//! Config command: print the effective configuration.

use anyhow::Result;

use crate::Config;

/// Formats the configuration as JSON.
pub fn format_config(config: &Config) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// Runs the config command.
pub fn run(config: &Config) -> Result<()> {
    println!("{}", format_config(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_default_config() {
        let output = format_config(&Config::default()).unwrap();
        insta::assert_snapshot!(output, @r#"
        {
          "bin_size_minutes": 60,
          "edge_bins": "fractional",
          "censored": "reject",
          "use_categories": true,
          "use_weights": false,
          "excluded_categories": [],
          "percentiles": [
            25.0,
            50.0,
            75.0,
            95.0,
            99.0
          ],
          "los_units": "hours",
          "tolerance": 1e-6,
          "nonstationary_stats": true,
          "stationary_stats": true
        }
        "#);
    }
}
