//! Nearest-neighbor identification over an enrolled gallery.
//!
//! A linear scan with one global distance threshold. This is sized for
//! galleries of tens of identities; there is no index and no per-identity
//! threshold tuning.

use crate::types::{Embedding, EnrollmentRecord, Identity};
use thiserror::Error;

/// Euclidean distance below which a probe is accepted as the nearest identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("probe embedding is empty")]
    EmptyProbe,
    #[error("embedding for {identity} has {actual} dimensions, probe has {expected}")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
}

/// Decision for one probe embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Identified { identity: Identity, distance: f32 },
    /// `nearest` is the smallest distance seen (`None` for an empty gallery).
    NoMatch { nearest: Option<f32> },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Identified { .. })
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            MatchOutcome::Identified { identity, .. } => Some(identity),
            MatchOutcome::NoMatch { .. } => None,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrollmentRecord],
        threshold: f32,
    ) -> Result<MatchOutcome, MatchError>;
}

/// Euclidean nearest-neighbor matcher.
///
/// Ties resolve to the earliest gallery entry: a later entry only wins with a
/// strictly smaller distance. The match is accepted when the minimum distance
/// is strictly below `threshold`.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[EnrollmentRecord],
        threshold: f32,
    ) -> Result<MatchOutcome, MatchError> {
        if probe.values.is_empty() {
            return Err(MatchError::EmptyProbe);
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, record) in gallery.iter().enumerate() {
            if record.embedding.dim() != probe.dim() {
                return Err(MatchError::DimensionMismatch {
                    identity: record.identity.to_string(),
                    expected: probe.dim(),
                    actual: record.embedding.dim(),
                });
            }
            let distance = probe.euclidean_distance(&record.embedding);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        Ok(match best {
            Some((idx, distance)) if distance < threshold => MatchOutcome::Identified {
                identity: gallery[idx].identity.clone(),
                distance,
            },
            _ => MatchOutcome::NoMatch {
                nearest: best.map(|(_, d)| d),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: Vec<f32>) -> EnrollmentRecord {
        EnrollmentRecord {
            identity: Identity::parse(name).unwrap(),
            embedding: Embedding::new(values),
        }
    }

    fn probe(values: Vec<f32>) -> Embedding {
        Embedding::new(values)
    }

    #[test]
    fn test_self_match_has_zero_distance() {
        let v = vec![0.12, -0.4, 0.33, 0.9];
        let gallery = vec![record("alice", v.clone())];

        let result = EuclideanMatcher
            .compare(&probe(v), &gallery, DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert_eq!(
            result,
            MatchOutcome::Identified {
                identity: Identity::parse("alice").unwrap(),
                distance: 0.0,
            }
        );
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let result = EuclideanMatcher
            .compare(&probe(vec![1.0, 0.0]), &[], DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert_eq!(result, MatchOutcome::NoMatch { nearest: None });
        assert!(!result.is_match());
    }

    #[test]
    fn test_threshold_scenario() {
        let gallery = vec![record("alice", vec![0.0, 0.0])];

        let near = EuclideanMatcher
            .compare(&probe(vec![0.55, 0.0]), &gallery, 0.6)
            .unwrap();
        match near {
            MatchOutcome::Identified { identity, distance } => {
                assert_eq!(identity.as_str(), "alice");
                assert!((distance - 0.55).abs() < 1e-6);
            }
            other => panic!("expected a match, got {other:?}"),
        }

        let far = EuclideanMatcher
            .compare(&probe(vec![0.65, 0.0]), &gallery, 0.6)
            .unwrap();
        assert!(!far.is_match());
    }

    #[test]
    fn test_threshold_is_strict() {
        let gallery = vec![record("alice", vec![0.0, 0.0])];
        let result = EuclideanMatcher
            .compare(&probe(vec![0.5, 0.0]), &gallery, 0.5)
            .unwrap();
        assert_eq!(result, MatchOutcome::NoMatch { nearest: Some(0.5) });
    }

    #[test]
    fn test_threshold_overrides_nearest_neighbor() {
        // Closer to A than to B, but still too far from A.
        let gallery = vec![record("a", vec![0.0, 0.0]), record("b", vec![3.0, 0.0])];
        let result = EuclideanMatcher
            .compare(&probe(vec![1.0, 0.0]), &gallery, 0.6)
            .unwrap();
        match result {
            MatchOutcome::NoMatch { nearest } => assert!((nearest.unwrap() - 1.0).abs() < 1e-6),
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[test]
    fn test_picks_nearest_anywhere_in_gallery() {
        let gallery = vec![
            record("decoy1", vec![0.0, 1.0, 0.0]),
            record("decoy2", vec![0.0, 0.0, 1.0]),
            record("match", vec![1.0, 0.0, 0.0]),
        ];
        let result = EuclideanMatcher
            .compare(&probe(vec![0.9, 0.0, 0.0]), &gallery, 0.6)
            .unwrap();
        assert_eq!(result.identity().map(Identity::as_str), Some("match"));
    }

    #[test]
    fn test_tie_resolves_to_first_entry() {
        let gallery = vec![
            record("first", vec![1.0, 0.0]),
            record("second", vec![-1.0, 0.0]),
        ];
        // Equidistant from both.
        let result = EuclideanMatcher
            .compare(&probe(vec![0.0, 0.1]), &gallery, 2.0)
            .unwrap();
        assert_eq!(result.identity().map(Identity::as_str), Some("first"));
    }

    #[test]
    fn test_empty_probe_is_rejected() {
        let gallery = vec![record("alice", vec![0.0, 0.0])];
        let err = EuclideanMatcher.compare(&probe(vec![]), &gallery, 0.6).unwrap_err();
        assert_eq!(err, MatchError::EmptyProbe);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let gallery = vec![record("alice", vec![0.0, 0.0, 0.0])];
        let err = EuclideanMatcher
            .compare(&probe(vec![0.0, 0.0]), &gallery, 0.6)
            .unwrap_err();
        assert_eq!(
            err,
            MatchError::DimensionMismatch {
                identity: "alice".into(),
                expected: 2,
                actual: 3,
            }
        );
    }
}
