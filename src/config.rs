//! `DetectorConfig`: the one configuration object `Detector::new` validates
//! once at construction. Reading it from a file or environment is a
//! caller-supplied adapter concern — the core itself never touches disk or
//! env vars for its own settings.

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};
use crate::ranker::{Thresholds, Weights};

pub const DEFAULT_BLOOM_SIZE: usize = 8192;
pub const DEFAULT_BLOOM_HASHES: u32 = 5;
pub const DEFAULT_MAX_CANDIDATES: usize = 20;
pub const DEFAULT_CACHE_SIZE: usize = 10_000;
pub const MAX_CANDIDATES_CEILING: usize = 1000;
pub const MAX_CACHE_SIZE_CEILING: usize = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub thresholds: Thresholds,
    pub weights: Weights,
    pub bloom_filter_size: usize,
    pub bloom_hash_count: u32,
    pub max_candidates: usize,
    pub enable_cache: bool,
    pub cache_size: usize,
    /// Opaque identifier used only by callers composing several cores for
    /// cross-repository dispatch; the detector never interprets it.
    pub repo_id: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            weights: Weights::default(),
            bloom_filter_size: DEFAULT_BLOOM_SIZE,
            bloom_hash_count: DEFAULT_BLOOM_HASHES,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            enable_cache: true,
            cache_size: DEFAULT_CACHE_SIZE,
            repo_id: String::new(),
        }
    }
}

impl DetectorConfig {
    /// Validates every field against its documented range and normalizes
    /// weights. Called once by `Detector::new`.
    pub fn validated(mut self) -> Result<Self> {
        self.thresholds = self.thresholds.validated()?;
        self.weights = self.weights.validated()?;
        if !(64..=(1 << 26)).contains(&self.bloom_filter_size) {
            return Err(DetectorError::configuration("bloom_filter_size must be in [64, 2^26]"));
        }
        if self.bloom_hash_count == 0 {
            return Err(DetectorError::configuration("bloom_hash_count must be at least 1"));
        }
        if !(1..=MAX_CANDIDATES_CEILING).contains(&self.max_candidates) {
            return Err(DetectorError::configuration("max_candidates must be in [1, 1000]"));
        }
        if self.enable_cache && !(1..=MAX_CACHE_SIZE_CEILING).contains(&self.cache_size) {
            return Err(DetectorError::configuration("cache_size must be in [1, 100000]"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(DetectorConfig::default().validated().is_ok());
    }

    #[test]
    fn rejects_bloom_size_out_of_range() {
        let cfg = DetectorConfig {
            bloom_filter_size: 32,
            ..DetectorConfig::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn rejects_max_candidates_out_of_range() {
        let low = DetectorConfig {
            max_candidates: 0,
            ..DetectorConfig::default()
        };
        assert!(low.validated().is_err());
        let high = DetectorConfig {
            max_candidates: 1001,
            ..DetectorConfig::default()
        };
        assert!(high.validated().is_err());
    }

    #[test]
    fn rejects_oversized_cache_when_enabled() {
        let cfg = DetectorConfig {
            enable_cache: true,
            cache_size: 200_000,
            ..DetectorConfig::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn normalizes_weights_on_validation() {
        let cfg = DetectorConfig {
            weights: Weights {
                text: 2.0,
                diff: 1.0,
                file: 1.0,
            },
            ..DetectorConfig::default()
        }
        .validated()
        .unwrap();
        let sum = cfg.weights.text + cfg.weights.diff + cfg.weights.file;
        assert!((sum - 1.0).abs() < 1e-3);
    }
}
