// Engine configuration. Scoring weights and risk thresholds are fixed
// contract values by default; deployments can override them through
// environment variables or an optional YAML file, but the weight-sum
// invariant is re-validated on every load.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Relative weight of each impact factor. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub dependency_count: f64,
    pub complexity: f64,
    pub usage_frequency: f64,
    pub file_size: f64,
    pub test_coverage: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            dependency_count: 0.30,
            complexity: 0.25,
            usage_frequency: 0.20,
            file_size: 0.15,
            test_coverage: 0.10,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.dependency_count
            + self.complexity
            + self.usage_frequency
            + self.file_size
            + self.test_coverage
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-9 {
            bail!("impact factor weights must sum to 1.0, got {sum}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool cap for per-file parsing (RIPPLE_MAX_WORKERS).
    pub max_workers: usize,
    /// Hop limit for affected-component traversal (RIPPLE_HOP_LIMIT).
    pub hop_limit: usize,
    /// Default recursion-path bound for cycle detection (RIPPLE_MAX_DEPTH).
    pub max_depth: usize,
    /// Timeout for live schema introspection in seconds
    /// (RIPPLE_SCHEMA_TIMEOUT_SECS).
    pub schema_timeout_secs: u64,
    /// Scores below this are Low risk.
    pub risk_medium_threshold: u32,
    /// Scores at or above this are High risk.
    pub risk_high_threshold: u32,
    /// Test-coverage factor above this raises a test-gap risk.
    pub test_gap_threshold: f64,
    pub weights: FactorWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 12,
            hop_limit: 2,
            max_depth: 20,
            schema_timeout_secs: 5,
            risk_medium_threshold: 50,
            risk_high_threshold: 80,
            test_gap_threshold: 0.7,
            weights: FactorWeights::default(),
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Config::default();
        apply_env_usize("RIPPLE_MAX_WORKERS", &mut config.max_workers);
        apply_env_usize("RIPPLE_HOP_LIMIT", &mut config.hop_limit);
        apply_env_usize("RIPPLE_MAX_DEPTH", &mut config.max_depth);
        if let Ok(val) = env::var("RIPPLE_SCHEMA_TIMEOUT_SECS") {
            match val.parse() {
                Ok(parsed) => config.schema_timeout_secs = parsed,
                Err(_) => tracing::warn!(
                    value = %val,
                    "invalid RIPPLE_SCHEMA_TIMEOUT_SECS, using default {}",
                    config.schema_timeout_secs
                ),
            }
        }
        config
    }

    /// Load from a YAML file, validating the weight sum.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.weights.validate()?;
        Ok(config)
    }

    /// Install an explicit configuration (e.g. from a YAML file) before the
    /// first `get()`. Later calls are ignored; the first config wins.
    pub fn install(config: Config) {
        let _ = CONFIG.set(config);
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn apply_env_usize(name: &str, slot: &mut usize) {
    if let Ok(val) = env::var(name) {
        match val.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(value = %val, "invalid {name}, using default {slot}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        FactorWeights::default().validate().unwrap();
    }

    #[test]
    fn unbalanced_weights_rejected() {
        let weights = FactorWeights {
            dependency_count: 0.5,
            ..FactorWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn default_thresholds() {
        let config = Config::default();
        assert_eq!(config.risk_medium_threshold, 50);
        assert_eq!(config.risk_high_threshold, 80);
        assert_eq!(config.hop_limit, 2);
    }
}
