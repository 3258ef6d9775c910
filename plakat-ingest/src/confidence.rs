//! Consolidated confidence recalculation
//!
//! All confidence arithmetic lives in one function so the two pipeline
//! stages that touch the score (enrichment merge, quality pass) cannot
//! drift apart. Each stage transition calls [`recalculate`] exactly once
//! with the evidence gathered during that stage.

/// Evidence gathered during one pipeline stage
#[derive(Debug, Clone, Default)]
pub struct EvidenceSummary {
    /// Number of scraped page signals merged into the record this stage
    pub merged_signals: usize,
    /// Completeness quality score (k/7) from the quality pass, if it ran
    pub quality: Option<f32>,
}

/// Maximum total bonus from corroborating enrichment signals
const MAX_SIGNAL_BONUS: f32 = 0.2;

/// Bonus contributed by each enrichment signal
const PER_SIGNAL_BONUS: f32 = 0.05;

/// Recompute the record confidence for one stage transition.
///
/// Enrichment evidence adds `min(0.2, 0.05 × merged_signals)`, applied
/// once per enrichment call. A quality score only ever nudges the
/// confidence upward: when it exceeds the current value the result is the
/// average of the two, otherwise the score is left alone. The result is
/// always clamped to [0.0, 1.0].
pub fn recalculate(current: f32, evidence: &EvidenceSummary) -> f32 {
    let mut confidence = current.clamp(0.0, 1.0);

    let bonus = (PER_SIGNAL_BONUS * evidence.merged_signals as f32).min(MAX_SIGNAL_BONUS);
    confidence = (confidence + bonus).min(1.0);

    if let Some(quality) = evidence.quality {
        if quality > confidence {
            confidence = (confidence + quality) / 2.0;
        }
    }

    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_evidence_no_change() {
        let result = recalculate(0.85, &EvidenceSummary::default());
        assert_eq!(result, 0.85);
    }

    #[test]
    fn test_signal_bonus_per_signal() {
        let result = recalculate(
            0.5,
            &EvidenceSummary {
                merged_signals: 2,
                quality: None,
            },
        );
        assert!((result - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_signal_bonus_capped_at_ten_signals() {
        // 10 signals would be 0.5 uncapped; bonus component must stay at 0.2
        let result = recalculate(
            0.3,
            &EvidenceSummary {
                merged_signals: 10,
                quality: None,
            },
        );
        assert!((result - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_result_never_exceeds_one() {
        let result = recalculate(
            0.95,
            &EvidenceSummary {
                merged_signals: 4,
                quality: None,
            },
        );
        assert_eq!(result, 1.0);
    }

    #[test]
    fn test_quality_above_current_averages() {
        let result = recalculate(
            0.4,
            &EvidenceSummary {
                merged_signals: 0,
                quality: Some(0.8),
            },
        );
        assert!((result - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_quality_below_current_ignored() {
        let result = recalculate(
            0.9,
            &EvidenceSummary {
                merged_signals: 0,
                quality: Some(0.3),
            },
        );
        assert_eq!(result, 0.9);
    }

    #[test]
    fn test_repeated_recalculation_stays_in_range() {
        let mut confidence = 0.1;
        for _ in 0..50 {
            confidence = recalculate(
                confidence,
                &EvidenceSummary {
                    merged_signals: 7,
                    quality: Some(0.9),
                },
            );
            assert!((0.0..=1.0).contains(&confidence));
        }
    }

    #[test]
    fn test_out_of_range_input_clamped() {
        assert_eq!(recalculate(1.8, &EvidenceSummary::default()), 1.0);
        assert_eq!(recalculate(-0.4, &EvidenceSummary::default()), 0.0);
    }
}
