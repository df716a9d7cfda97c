//! Stability scoring
//!
//! Normalizes raw complexity metrics into `[0, 1]`, combines them with fixed
//! weights and maps the result onto a three-band risk classification.
//!
//! Formula:
//! score = 0.3 * complexity + 0.3 * modification_frequency
//!       + 0.2 * call_sites + 0.2 * lines_of_code
//!
//! Pure functions only: same inputs always yield the same output.

use crate::model::{ComplexityMetrics, RiskLevel, StabilityScore};
use serde::{Deserialize, Serialize};

pub const WEIGHT_COMPLEXITY: f64 = 0.3;
pub const WEIGHT_MODIFICATION_FREQUENCY: f64 = 0.3;
pub const WEIGHT_CALL_SITES: f64 = 0.2;
pub const WEIGHT_LINES_OF_CODE: f64 = 0.2;

/// Scores below this are `Stable`
pub const MODERATE_THRESHOLD: f64 = 0.4;
/// Scores at or above this are `HighRisk`
pub const HIGH_THRESHOLD: f64 = 0.7;

/// Inclusive normalization range for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub const fn new(min: f64, max: f64) -> Self {
        MetricRange { min, max }
    }

    /// `clamp((value - min) / (max - min), 0, 1)`; a degenerate range yields 0
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max <= self.min {
            return 0.0;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// Per-metric normalization ranges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRanges {
    pub complexity: MetricRange,
    pub modification_frequency: MetricRange,
    pub call_sites: MetricRange,
    pub lines_of_code: MetricRange,
}

impl Default for NormalizationRanges {
    fn default() -> Self {
        NormalizationRanges {
            complexity: MetricRange::new(1.0, 50.0),
            modification_frequency: MetricRange::new(0.0, 100.0),
            call_sites: MetricRange::new(0.0, 500.0),
            lines_of_code: MetricRange::new(1.0, 1000.0),
        }
    }
}

/// Normalized components behind a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoreBreakdown {
    pub complexity: f64,
    pub modification_frequency: f64,
    pub call_sites: f64,
    pub lines_of_code: f64,
}

impl ScoreBreakdown {
    pub fn weighted_sum(&self) -> f64 {
        WEIGHT_COMPLEXITY * self.complexity
            + WEIGHT_MODIFICATION_FREQUENCY * self.modification_frequency
            + WEIGHT_CALL_SITES * self.call_sites
            + WEIGHT_LINES_OF_CODE * self.lines_of_code
    }
}

/// Normalize each metric against its range
pub fn breakdown(metrics: &ComplexityMetrics, ranges: &NormalizationRanges) -> ScoreBreakdown {
    ScoreBreakdown {
        complexity: ranges
            .complexity
            .normalize(f64::from(metrics.cyclomatic_complexity)),
        modification_frequency: ranges
            .modification_frequency
            .normalize(f64::from(metrics.modification_frequency)),
        call_sites: ranges
            .call_sites
            .normalize(f64::from(metrics.call_site_count)),
        lines_of_code: ranges
            .lines_of_code
            .normalize(f64::from(metrics.lines_of_code)),
    }
}

/// Assign a risk level; intervals are half-open and exhaustive
pub fn classify(score: StabilityScore) -> RiskLevel {
    let value = score.value();
    if value < MODERATE_THRESHOLD {
        RiskLevel::Stable
    } else if value < HIGH_THRESHOLD {
        RiskLevel::ModerateRisk
    } else {
        RiskLevel::HighRisk
    }
}

/// Score metrics and classify the result
pub fn score(
    metrics: &ComplexityMetrics,
    ranges: &NormalizationRanges,
) -> (StabilityScore, RiskLevel) {
    let stability = StabilityScore::new(breakdown(metrics, ranges).weighted_sum());
    (stability, classify(stability))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn metrics(complexity: u32, modifications: u32, call_sites: u32, loc: u32) -> ComplexityMetrics {
        ComplexityMetrics {
            cyclomatic_complexity: complexity,
            lines_of_code: loc,
            parameter_count: 0,
            modification_frequency: modifications,
            call_site_count: call_sites,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_COMPLEXITY
            + WEIGHT_MODIFICATION_FREQUENCY
            + WEIGHT_CALL_SITES
            + WEIGHT_LINES_OF_CODE;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reference_example_is_stable() {
        let ranges = NormalizationRanges::default();
        let m = metrics(10, 5, 20, 100);

        let parts = breakdown(&m, &ranges);
        assert!((parts.complexity - 9.0 / 49.0).abs() < 1e-9);
        assert!((parts.modification_frequency - 0.05).abs() < 1e-9);
        assert!((parts.call_sites - 0.04).abs() < 1e-9);
        assert!((parts.lines_of_code - 99.0 / 999.0).abs() < 1e-9);

        let (score, level) = score(&m, &ranges);
        assert!((score.value() - 0.0974).abs() < 1e-3);
        assert_eq!(level, RiskLevel::Stable);
    }

    #[test]
    fn test_normalize_clamps_and_handles_degenerate_range() {
        let range = MetricRange::new(1.0, 50.0);
        assert_eq!(range.normalize(0.0), 0.0);
        assert_eq!(range.normalize(500.0), 1.0);
        assert_eq!(MetricRange::new(5.0, 5.0).normalize(10.0), 0.0);
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify(StabilityScore::new(0.0)), RiskLevel::Stable);
        assert_eq!(classify(StabilityScore::new(0.3999)), RiskLevel::Stable);
        assert_eq!(classify(StabilityScore::new(0.4)), RiskLevel::ModerateRisk);
        assert_eq!(classify(StabilityScore::new(0.6999)), RiskLevel::ModerateRisk);
        assert_eq!(classify(StabilityScore::new(0.7)), RiskLevel::HighRisk);
        assert_eq!(classify(StabilityScore::new(1.0)), RiskLevel::HighRisk);
    }

    #[test]
    fn test_saturated_metrics_are_high_risk() {
        let (score, level) = score(&metrics(80, 200, 900, 5000), &NormalizationRanges::default());
        assert!((score.value() - 1.0).abs() < 1e-12);
        assert_eq!(level, RiskLevel::HighRisk);
    }

    proptest! {
        #[test]
        fn prop_score_in_unit_interval(
            c in 1u32..200, m in 0u32..300, s in 0u32..1000, l in 0u32..3000,
        ) {
            let (score, _) = score(&metrics(c, m, s, l), &NormalizationRanges::default());
            prop_assert!((0.0..=1.0).contains(&score.value()));
        }

        #[test]
        fn prop_score_monotonic_in_each_metric(
            c in 1u32..200, m in 0u32..300, s in 0u32..1000, l in 0u32..3000,
            bump in 0u32..100,
        ) {
            let ranges = NormalizationRanges::default();
            let base = score(&metrics(c, m, s, l), &ranges).0.value();
            prop_assert!(score(&metrics(c + bump, m, s, l), &ranges).0.value() >= base);
            prop_assert!(score(&metrics(c, m + bump, s, l), &ranges).0.value() >= base);
            prop_assert!(score(&metrics(c, m, s + bump, l), &ranges).0.value() >= base);
            prop_assert!(score(&metrics(c, m, s, l + bump), &ranges).0.value() >= base);
        }
    }
}
