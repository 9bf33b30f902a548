//! Matching weights and confidence thresholds

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub title: f64,
    #[serde(rename = "abstract")]
    pub abstract_text: f64,
    pub creators: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            title: 0.6,
            abstract_text: 0.25,
            creators: 0.15,
        }
    }
}

impl Weights {
    /// Scale to sum 1. Fails when weights are negative, all zero, or the
    /// title carries less than half of the total.
    pub fn normalized(self) -> Result<Self, String> {
        let parts = [self.title, self.abstract_text, self.creators];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("matching weights must be finite and non-negative".into());
        }
        let total: f64 = parts.iter().sum();
        if total <= 0.0 {
            return Err("matching weights must sum to a positive number".into());
        }
        if self.title / total < 0.5 {
            return Err(format!(
                "title weight must be at least half of the total (got {:.2})",
                self.title / total
            ));
        }
        Ok(Self {
            title: self.title / total,
            abstract_text: self.abstract_text / total,
            creators: self.creators / total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub weights: Weights,
    /// Minimum score for `HighConfidence`.
    pub high_confidence: f64,
    /// Minimum score for `Review`.
    pub review: f64,
    /// Keep candidates below `review` as `LowConfidence` instead of dropping them.
    pub keep_low_confidence: bool,
    /// Hits requested from the destination search.
    pub max_results: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            high_confidence: 0.90,
            review: 0.75,
            keep_low_confidence: false,
            max_results: 10,
        }
    }
}

impl MatchingConfig {
    /// Check thresholds and normalize weights.
    pub fn validated(mut self) -> Result<Self, String> {
        self.weights = self.weights.normalized()?;
        if !(0.0..=1.0).contains(&self.review) || !(0.0..=1.0).contains(&self.high_confidence) {
            return Err("matching thresholds must lie in [0, 1]".into());
        }
        if self.review > self.high_confidence {
            return Err(format!(
                "review threshold {} exceeds high-confidence threshold {}",
                self.review, self.high_confidence
            ));
        }
        Ok(self)
    }
}
