//! Descriptor comparison under a caller-supplied threshold.

use crate::types::{Descriptor, MatchResult, SampleMatch};
use thiserror::Error;

/// Scale applied to the sum of squared differences.
///
/// The resulting score is not a Euclidean distance. For L2-normalized
/// descriptors it equals `1 - cosine_similarity`, so the default threshold of
/// 0.6 accepts pairs with cosine similarity of at least 0.4.
pub const DISTANCE_SCALE: f32 = 0.5;

#[derive(Error, Debug, PartialEq)]
pub enum MatcherError {
    #[error("descriptor length mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Strategy for scoring and thresholding descriptor pairs.
///
/// Lower distance means more similar; a pair matches when its distance is at
/// most the threshold.
pub trait Matcher {
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> Result<f32, MatcherError>;

    fn compare(
        &self,
        a: &Descriptor,
        b: &Descriptor,
        threshold: f32,
    ) -> Result<MatchResult, MatcherError> {
        let distance = self.distance(a, b)?;
        Ok(MatchResult {
            matched: distance <= threshold,
            distance,
        })
    }

    fn is_match(&self, a: &Descriptor, b: &Descriptor, threshold: f32) -> Result<bool, MatcherError> {
        Ok(self.compare(a, b, threshold)?.matched)
    }

    /// Closest sample within `threshold`, or `None`.
    ///
    /// Samples that yield no usable distance (length mismatch, NaN) are
    /// skipped. On equal distances the lower index wins.
    fn classify_against_samples(
        &self,
        candidate: &Descriptor,
        samples: &[Descriptor],
        threshold: f32,
    ) -> Option<SampleMatch> {
        let mut best: Option<SampleMatch> = None;
        for (index, sample) in samples.iter().enumerate() {
            let Ok(distance) = self.distance(candidate, sample) else {
                tracing::debug!(index, "sample skipped: incomparable descriptor");
                continue;
            };
            if distance.is_nan() {
                continue;
            }
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(SampleMatch { index, distance });
            }
        }
        best.filter(|b| b.distance <= threshold)
    }
}

/// Half the sum of squared component differences. See [`DISTANCE_SCALE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfSquaredMatcher;

impl Matcher for HalfSquaredMatcher {
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> Result<f32, MatcherError> {
        if a.len() != b.len() {
            return Err(MatcherError::DimensionMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        let sum: f32 = a
            .values()
            .iter()
            .zip(b.values())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        Ok(sum * DISTANCE_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    #[test]
    fn test_distance_identical_is_zero() {
        let a = d(&[0.3, -0.2, 0.9]);
        assert_eq!(HalfSquaredMatcher.distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_scaled_sum_of_squares() {
        let a = d(&[1.0, 0.0]);
        let b = d(&[0.0, 1.0]);
        // (1 + 1) * 0.5
        assert!((HalfSquaredMatcher.distance(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let pairs = [
            (d(&[0.1, 0.7, -0.4]), d(&[0.5, -0.2, 0.3])),
            (d(&[10.0, -3.0, 2.5]), d(&[-1.0, 0.0, 8.0])),
            (d(&[0.0, 0.0, 0.0]), d(&[1.0, 1.0, 1.0])),
        ];
        for (a, b) in &pairs {
            let ab = HalfSquaredMatcher.distance(a, b).unwrap();
            let ba = HalfSquaredMatcher.distance(b, a).unwrap();
            assert_eq!(ab, ba);
            assert!(ab >= 0.0);
        }
    }

    #[test]
    fn test_unit_vectors_match_one_minus_cosine() {
        let a = d(&[1.0, 0.0]);
        let b = d(&[0.6, 0.8]);
        let dist = HalfSquaredMatcher.distance(&a, &b).unwrap();
        assert!((dist - (1.0 - 0.6)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let err = HalfSquaredMatcher.distance(&d(&[1.0]), &d(&[1.0, 2.0])).unwrap_err();
        assert_eq!(err, MatcherError::DimensionMismatch { left: 1, right: 2 });
    }

    #[test]
    fn test_is_match_threshold_inclusive() {
        let a = d(&[1.0, 0.0]);
        let b = d(&[0.0, 1.0]);
        assert!(HalfSquaredMatcher.is_match(&a, &b, 1.0).unwrap());
        assert!(!HalfSquaredMatcher.is_match(&a, &b, 0.999).unwrap());
    }

    #[test]
    fn test_threshold_monotonic() {
        let a = d(&[0.2, 0.4, 0.1]);
        let b = d(&[0.1, 0.6, 0.3]);
        let thresholds = [0.0, 0.01, 0.045, 0.05, 0.1, 0.6, 2.0];
        let mut seen_match = false;
        for t in thresholds {
            let m = HalfSquaredMatcher.is_match(&a, &b, t).unwrap();
            assert!(!seen_match || m, "match lost when raising threshold to {t}");
            seen_match |= m;
        }
        assert!(seen_match);
    }

    #[test]
    fn test_classify_picks_closest_within_threshold() {
        let candidate = d(&[1.0, 0.0, 0.0]);
        let samples = vec![
            d(&[0.0, 1.0, 0.0]),
            d(&[0.9, 0.1, 0.0]),
            d(&[0.8, 0.0, 0.2]),
        ];
        let hit = HalfSquaredMatcher
            .classify_against_samples(&candidate, &samples, 0.6)
            .unwrap();
        assert_eq!(hit.index, 1);
        assert!((hit.distance - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_classify_tie_prefers_lower_index() {
        let candidate = d(&[0.0, 0.0]);
        let samples = vec![d(&[0.1, 0.0]), d(&[0.0, 0.1])];
        let hit = HalfSquaredMatcher
            .classify_against_samples(&candidate, &samples, 1.0)
            .unwrap();
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn test_classify_outside_threshold_is_none() {
        let candidate = d(&[1.0, 0.0]);
        let samples = vec![d(&[-1.0, 0.0])];
        assert!(HalfSquaredMatcher
            .classify_against_samples(&candidate, &samples, 0.6)
            .is_none());
    }

    #[test]
    fn test_classify_skips_unusable_samples() {
        let candidate = d(&[1.0, 0.0]);
        let samples = vec![d(&[1.0]), d(&[f32::NAN, 0.0]), d(&[1.0, 0.1])];
        let hit = HalfSquaredMatcher
            .classify_against_samples(&candidate, &samples, 0.6)
            .unwrap();
        assert_eq!(hit.index, 2);
    }

    #[test]
    fn test_classify_empty_samples() {
        assert!(HalfSquaredMatcher
            .classify_against_samples(&d(&[1.0]), &[], 10.0)
            .is_none());
    }
}
