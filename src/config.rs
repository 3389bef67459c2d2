// src/config.rs

use crate::types::{
    AggregationConfig, BatchConfig, Config, LabelConfig, LoggingConfig, MatchingConfig,
};
use anyhow::{ensure, Result};
use std::collections::BTreeMap;
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.matching.buffer_meters.is_finite() && self.matching.buffer_meters >= 0.0,
            "matching.buffer_meters must be a non-negative number, got {}",
            self.matching.buffer_meters
        );
        ensure!(
            (0.0..=1.0).contains(&self.aggregation.confidence_threshold),
            "aggregation.confidence_threshold must be in [0, 1], got {}",
            self.aggregation.confidence_threshold
        );
        ensure!(
            self.aggregation.min_evidence_count >= 1,
            "aggregation.min_evidence_count must be at least 1"
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            aggregation: AggregationConfig::default(),
            labels: LabelConfig::default(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { buffer_meters: 30.0 }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            min_evidence_count: 1,
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        let mut synonyms = BTreeMap::new();
        synonyms.insert(
            "commercial".to_string(),
            ["c", "com", "comm", "shop", "store", "business", "non residential", "nonresidential"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        synonyms.insert(
            "non_commercial".to_string(),
            ["nc", "non-commercial", "noncommercial", "residential", "res", "r", "house", "home"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        synonyms.insert("mix".to_string(), vec!["mixed".to_string()]);
        Self { synonyms }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: "data/batches".to_string(),
            output_dir: "data/reports".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_constants() {
        let config = Config::default();
        assert_eq!(config.matching.buffer_meters, 30.0);
        assert_eq!(config.aggregation.confidence_threshold, 0.5);
        assert_eq!(config.aggregation.min_evidence_count, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "matching:\n  buffer_meters: 12.5\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.matching.buffer_meters, 12.5);
        assert_eq!(config.aggregation.confidence_threshold, 0.5);
        assert!(config.labels.synonyms.contains_key("commercial"));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.aggregation.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_evidence_floor() {
        let mut config = Config::default();
        config.aggregation.min_evidence_count = 0;
        assert!(config.validate().is_err());
    }
}
