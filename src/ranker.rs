//! Pure weighted combination of the three similarity signals, plus the
//! threshold-based decision that turns a score into a result tier.

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub text: f32,
    pub diff: f32,
    pub file: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            text: 0.45,
            diff: 0.35,
            file: 0.20,
        }
    }
}

impl Weights {
    /// Validates (nonnegative, not all zero) and normalizes to sum 1.0.
    pub fn validated(self) -> Result<Self> {
        if self.text < 0.0 || self.diff < 0.0 || self.file < 0.0 {
            return Err(DetectorError::configuration("weights must be nonnegative"));
        }
        let sum = self.text + self.diff + self.file;
        if sum <= 0.0 {
            return Err(DetectorError::configuration("weights must not all be zero"));
        }
        Ok(Self {
            text: self.text / sum,
            diff: self.diff / sum,
            file: self.file / sum,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub duplicate: f32,
    pub possible: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            duplicate: 0.90,
            possible: 0.82,
        }
    }
}

impl Thresholds {
    pub fn validated(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.duplicate) || !(0.0..=1.0).contains(&self.possible) {
            return Err(DetectorError::configuration("thresholds must be in [0,1]"));
        }
        if self.duplicate < self.possible {
            return Err(DetectorError::configuration(
                "duplicate_threshold must be >= possible_threshold",
            ));
        }
        Ok(self)
    }
}

/// Full explainability breakdown for one candidate's score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub text_similarity: f32,
    pub diff_similarity: f32,
    pub file_similarity: f32,
    pub text_contribution: f32,
    pub diff_contribution: f32,
    pub file_contribution: f32,
    pub final_score: f32,
    pub weights: Weights,
}

pub fn score(
    s_text: f32,
    s_diff: f32,
    s_file: f32,
    weights: Weights,
) -> ScoreBreakdown {
    let text_contribution = weights.text * s_text;
    let diff_contribution = weights.diff * s_diff;
    let file_contribution = weights.file * s_file;
    ScoreBreakdown {
        text_similarity: s_text,
        diff_similarity: s_diff,
        file_similarity: s_file,
        text_contribution,
        diff_contribution,
        file_contribution,
        final_score: text_contribution + diff_contribution + file_contribution,
        weights,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    Duplicate,
    Possible,
    Unique,
}

/// Pure function of the ranker score and the current thresholds.
/// Boundary condition: `>=` classifies at the higher tier.
pub fn decide(final_score: f32, thresholds: Thresholds) -> DecisionKind {
    if final_score >= thresholds.duplicate {
        DecisionKind::Duplicate
    } else if final_score >= thresholds.possible {
        DecisionKind::Possible
    } else {
        DecisionKind::Unique
    }
}
