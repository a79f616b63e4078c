//! Retrieval decision policy
//!
//! Classifies retrieval quality for one question into a strategy, using
//! only the ranked candidate list. Pure and deterministic: the same
//! candidates and configuration always produce the same decision.

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};
use crate::providers::Candidate;

/// How much the generated answer may rely on sources beyond the
/// retrieved passages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Answer only from the retrieved passages, verbatim
    StrictRetrieval,
    /// Prefer the passages, flagged general-knowledge supplementation allowed
    HybridRetrieval,
    /// Answer from the model's general knowledge
    GenerationOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::StrictRetrieval => "strict_retrieval",
            Strategy::HybridRetrieval => "hybrid_retrieval",
            Strategy::GenerationOnly => "generation_only",
        }
    }
}

/// Classification of retrieval trust for one question
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub strategy: Strategy,
    /// Top similarity score for the retrieval strategies, a fixed
    /// fallback constant for generation-only
    pub confidence: f32,
}

/// Policy thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum top score for strict retrieval
    pub high_threshold: f32,
    /// Minimum top score for hybrid retrieval
    pub low_threshold: f32,
    /// Minimum top-two score gap required to treat a high top score as an
    /// unambiguous match
    pub min_gap: f32,
    /// Confidence reported when no usable retrieval signal exists
    pub fallback_confidence: f32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.90,
            low_threshold: 0.85,
            min_gap: 0.05,
            fallback_confidence: 0.30,
        }
    }
}

impl PolicyConfig {
    /// Validate threshold ordering and ranges. A misconfigured policy must
    /// refuse to start rather than silently misclassify.
    pub fn validate(&self) -> Result<()> {
        if self.low_threshold >= self.high_threshold {
            return Err(RagError::Config(format!(
                "low_threshold ({}) must be below high_threshold ({})",
                self.low_threshold, self.high_threshold
            )));
        }
        for (name, value) in [
            ("high_threshold", self.high_threshold),
            ("low_threshold", self.low_threshold),
            ("min_gap", self.min_gap),
            ("fallback_confidence", self.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::Config(format!(
                    "{} ({}) must be within [0, 1]",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Retrieval decision policy
#[derive(Debug, Clone)]
pub struct RetrievalPolicy {
    config: PolicyConfig,
}

impl RetrievalPolicy {
    /// Create a policy, validating the configuration
    pub fn new(config: PolicyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a policy with default thresholds
    pub fn with_defaults() -> Self {
        Self {
            config: PolicyConfig::default(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Classify a ranked candidate list (descending score) into a strategy.
    ///
    /// A high top score whose gap to the runner-up is below `min_gap` is an
    /// ambiguous match and is downgraded from strict to hybrid. Only the
    /// top two candidates participate in the gap check.
    pub fn decide(&self, candidates: &[Candidate]) -> Decision {
        let top = match candidates.first() {
            Some(candidate) => candidate.score,
            None => {
                return Decision {
                    strategy: Strategy::GenerationOnly,
                    confidence: self.config.fallback_confidence,
                }
            }
        };

        let low_discrimination = candidates
            .get(1)
            .map(|second| top - second.score < self.config.min_gap)
            .unwrap_or(false);

        if top >= self.config.high_threshold && !low_discrimination {
            return Decision {
                strategy: Strategy::StrictRetrieval,
                confidence: top,
            };
        }

        if top >= self.config.low_threshold {
            return Decision {
                strategy: Strategy::HybridRetrieval,
                confidence: top,
            };
        }

        Decision {
            strategy: Strategy::GenerationOnly,
            confidence: self.config.fallback_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn candidates(scores: &[f32]) -> Vec<Candidate> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &score)| Candidate {
                content: format!("passage {}", i + 1),
                score,
            })
            .collect()
    }

    fn policy() -> RetrievalPolicy {
        RetrievalPolicy::with_defaults()
    }

    #[test]
    fn test_empty_candidates_fall_back() {
        let decision = policy().decide(&[]);
        assert_eq!(decision.strategy, Strategy::GenerationOnly);
        assert_eq!(decision.confidence, 0.30);
    }

    #[test]
    fn test_clear_winner_is_strict() {
        // gap 0.35 >= 0.05, top >= 0.90
        let decision = policy().decide(&candidates(&[0.95, 0.6]));
        assert_eq!(decision.strategy, Strategy::StrictRetrieval);
        assert_eq!(decision.confidence, 0.95);
    }

    #[test]
    fn test_single_high_candidate_is_strict() {
        let decision = policy().decide(&candidates(&[0.93]));
        assert_eq!(decision.strategy, Strategy::StrictRetrieval);
        assert_eq!(decision.confidence, 0.93);
    }

    #[test]
    fn test_ambiguous_match_downgrades_to_hybrid() {
        // gap 0.03 < 0.05 despite top >= 0.90
        let decision = policy().decide(&candidates(&[0.92, 0.89]));
        assert_eq!(decision.strategy, Strategy::HybridRetrieval);
        assert_eq!(decision.confidence, 0.92);
    }

    #[test]
    fn test_mid_range_top_is_hybrid() {
        let decision = policy().decide(&candidates(&[0.87, 0.5]));
        assert_eq!(decision.strategy, Strategy::HybridRetrieval);
        assert_eq!(decision.confidence, 0.87);
    }

    #[test]
    fn test_weak_top_is_generation_only() {
        let decision = policy().decide(&candidates(&[0.5]));
        assert_eq!(decision.strategy, Strategy::GenerationOnly);
        assert_eq!(decision.confidence, 0.30);
    }

    #[test]
    fn test_gap_check_ignores_third_candidate() {
        // top two are well separated; a crowded tail must not downgrade
        let decision = policy().decide(&candidates(&[0.95, 0.80, 0.79]));
        assert_eq!(decision.strategy, Strategy::StrictRetrieval);
    }

    #[test]
    fn test_misordered_thresholds_rejected() {
        let config = PolicyConfig {
            high_threshold: 0.8,
            low_threshold: 0.9,
            ..PolicyConfig::default()
        };
        assert!(RetrievalPolicy::new(config).is_err());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let config = PolicyConfig {
            min_gap: 1.5,
            ..PolicyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    fn clamp01(x: f32) -> f32 {
        if x.is_finite() {
            x.abs() % 1.0
        } else {
            0.5
        }
    }

    #[quickcheck]
    fn prop_small_gap_never_strict(top: f32, gap: f32) -> bool {
        let top = clamp01(top);
        let gap = clamp01(gap) * 0.05; // always below min_gap
        let second = (top - gap).max(0.0);
        let decision = policy().decide(&candidates(&[top, second]));
        decision.strategy != Strategy::StrictRetrieval
    }

    #[quickcheck]
    fn prop_confidence_matches_top_for_retrieval(top: f32, second: f32) -> bool {
        let top = clamp01(top);
        let second = clamp01(second).min(top);
        let decision = policy().decide(&candidates(&[top, second]));
        match decision.strategy {
            Strategy::StrictRetrieval | Strategy::HybridRetrieval => decision.confidence == top,
            Strategy::GenerationOnly => decision.confidence == 0.30,
        }
    }

    #[quickcheck]
    fn prop_below_low_threshold_is_generation_only(top: f32) -> bool {
        let top = clamp01(top) * 0.849;
        let decision = policy().decide(&candidates(&[top]));
        decision.strategy == Strategy::GenerationOnly
    }
}
