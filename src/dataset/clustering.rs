//! Clustering results keyed by individual.

use crate::error::{Result, SiftError};
use std::collections::{BTreeMap, HashMap};

/// Decimal digits a quality score keeps once it leaves the clusterer.
pub const SCORE_PRECISION: i32 = 2;

/// Cluster label per identifier plus the score of the whole assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    ids: Vec<String>,
    labels: Vec<usize>,
    score: f64,
}

impl Clustering {
    /// # Errors
    ///
    /// Returns [`SiftError::UnexpectedState`] if the id and label vectors
    /// differ in length.
    pub fn new(ids: Vec<String>, labels: Vec<usize>, score: f64) -> Result<Self> {
        if ids.len() != labels.len() {
            return Err(SiftError::unexpected(format!(
                "{} identifiers but {} cluster labels",
                ids.len(),
                labels.len()
            )));
        }
        Ok(Self { ids, labels, score })
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifier → label lookup.
    #[must_use]
    pub fn by_id(&self) -> HashMap<&str, usize> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().copied())
            .collect()
    }

    /// Number of distinct labels.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.sizes().len()
    }

    /// Individuals per label, ordered by label.
    #[must_use]
    pub fn sizes(&self) -> BTreeMap<usize, usize> {
        let mut sizes = BTreeMap::new();
        for label in &self.labels {
            *sizes.entry(*label).or_insert(0) += 1;
        }
        sizes
    }

    /// Whether labels are exactly `0..n_clusters()`.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.sizes().keys().copied().eq(0..self.n_clusters())
    }
}

/// Round a score to [`SCORE_PRECISION`] digits.
///
/// Negative zero is folded to zero so it never reaches a file name as `-0.00`.
#[must_use]
pub fn round_score(score: f64) -> f64 {
    let factor = 10f64.powi(SCORE_PRECISION);
    let rounded = (score * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Render a score the way artifact names embed it.
#[must_use]
pub fn format_score(score: f64) -> String {
    format!("{:.*}", SCORE_PRECISION as usize, round_score(score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123_456), 0.12);
        assert_eq!(round_score(0.125_1), 0.13);
        assert_eq!(round_score(-0.004), 0.0);
        assert!(round_score(-0.004).is_sign_positive());
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.5), "0.50");
        assert_eq!(format_score(-0.234), "-0.23");
        assert_eq!(format_score(-0.001), "0.00");
    }

    #[test]
    fn test_dense_labels() {
        let dense = Clustering::new(vec!["a".into(), "b".into()], vec![1, 0], 0.1).unwrap();
        assert!(dense.is_dense());

        let gappy = Clustering::new(vec!["a".into(), "b".into()], vec![0, 2], 0.1).unwrap();
        assert!(!gappy.is_dense());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Clustering::new(vec!["a".into()], vec![0, 1], 0.0).is_err());
    }

    #[test]
    fn test_sizes() {
        let c = Clustering::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![0, 1, 0],
            0.0,
        )
        .unwrap();
        assert_eq!(c.sizes().get(&0), Some(&2));
        assert_eq!(c.n_clusters(), 2);
    }
}
