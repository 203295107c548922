//! In-process information-gain ranking.
//!
//! Numeric attributes are discretised into equal-frequency bins; nominal
//! attributes use their categories directly. Missing values form a bin of
//! their own. Attributes are ordered by gain, ties broken by declaration
//! order.

use super::{FeatureRanker, RankRequest};
use crate::dataset::arff::{self, ArffData, ArffKind};
use crate::error::{Result, SiftError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Default number of equal-frequency bins for numeric attributes.
pub const DEFAULT_BINS: usize = 10;

const MISSING_BIN: usize = usize::MAX;

/// Shannon entropy (bits) of a value distribution.
fn entropy<K: Eq + Hash>(values: impl Iterator<Item = K>) -> f64 {
    let mut counts: HashMap<K, usize> = HashMap::new();
    let mut total = 0usize;
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|c| {
            let p = *c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Information gain of `feature` (already discretised) about `class`.
#[must_use]
pub fn information_gain<C, F>(class: &[C], feature: &[F]) -> f64
where
    C: Eq + Hash,
    F: Eq + Hash,
{
    let n = class.len();
    if n == 0 {
        return 0.0;
    }

    let mut groups: HashMap<&F, Vec<&C>> = HashMap::new();
    for (c, f) in class.iter().zip(feature) {
        groups.entry(f).or_default().push(c);
    }

    let conditional: f64 = groups
        .values()
        .map(|members| {
            let weight = members.len() as f64 / n as f64;
            weight * entropy(members.iter().copied())
        })
        .sum();

    (entropy(class.iter()) - conditional).max(0.0)
}

/// Equal-frequency bin index for every cell; equal values share a bin.
///
/// # Errors
///
/// Returns [`SiftError::DataFormat`] if a present value is not numeric.
pub fn equal_frequency_bins(name: &str, cells: &[Option<&str>], bins: usize) -> Result<Vec<usize>> {
    let parsed = cells
        .iter()
        .map(|cell| {
            cell.map(|v| {
                v.trim().parse::<f64>().map_err(|_| {
                    SiftError::data_format(name, format!("'{v}' is not numeric"))
                })
            })
            .transpose()
        })
        .collect::<Result<Vec<Option<f64>>>>()?;

    let mut sorted: Vec<f64> = parsed.iter().flatten().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let m = sorted.len();
    let bins = bins.max(1);

    Ok(parsed
        .iter()
        .map(|value| match value {
            None => MISSING_BIN,
            Some(v) => {
                let rank = sorted.partition_point(|x| x.total_cmp(v).is_lt());
                (rank * bins / m).min(bins - 1)
            }
        })
        .collect())
}

/// Score every non-class attribute, best first.
///
/// # Errors
///
/// Returns [`SiftError::DataFormat`] if `target` is not a nominal attribute
/// or a numeric cell cannot be parsed.
pub fn rank_attributes(data: &ArffData, target: &str, bins: usize) -> Result<Vec<(String, f64)>> {
    let target_idx = data.attribute_index(target).ok_or_else(|| {
        SiftError::data_format(&data.relation, format!("class attribute '{target}' not found"))
    })?;
    if !matches!(data.attributes[target_idx].kind, ArffKind::Nominal(_)) {
        return Err(SiftError::data_format(
            &data.relation,
            format!("class attribute '{target}' must be nominal"),
        ));
    }

    // Rows without a class value carry no information.
    let rows: Vec<usize> = (0..data.rows.len())
        .filter(|r| data.rows[*r][target_idx].is_some())
        .collect();
    let class: Vec<&str> = rows
        .iter()
        .filter_map(|r| data.rows[*r][target_idx].as_deref())
        .collect();

    let mut scores = Vec::with_capacity(data.attributes.len().saturating_sub(1));
    for (idx, attribute) in data.attributes.iter().enumerate() {
        if idx == target_idx {
            continue;
        }
        let cells: Vec<Option<&str>> = rows.iter().map(|r| data.rows[*r][idx].as_deref()).collect();
        let gain = match attribute.kind {
            ArffKind::Numeric => {
                let binned = equal_frequency_bins(&attribute.name, &cells, bins)?;
                information_gain(&class, &binned)
            }
            ArffKind::Nominal(_) => information_gain(&class, &cells),
        };
        scores.push((attribute.name.clone(), gain));
    }

    // Stable sort keeps declaration order among equal gains.
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scores)
}

/// Information-gain ranker over the labeled ARFF export.
#[derive(Debug, Clone)]
pub struct InfoGainRanker {
    bins: usize,
}

impl Default for InfoGainRanker {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

impl InfoGainRanker {
    #[must_use]
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.max(1) }
    }

    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }
}

#[async_trait]
impl FeatureRanker for InfoGainRanker {
    fn name(&self) -> &str {
        "infoGain"
    }

    async fn rank(&self, request: &RankRequest) -> Result<Vec<String>> {
        let path = request.arff_path.clone();
        let target = request.target.clone();
        let bins = self.bins;
        let keep = request.keep;

        let scores = tokio::task::spawn_blocking(move || {
            let data = arff::read(&path)?;
            rank_attributes(&data, &target, bins)
        })
        .await
        .map_err(|e| SiftError::collaborator("infoGain", format!("task panicked: {e}")))??;

        for (name, gain) in scores.iter().take(keep) {
            debug!("  {:.4} {}", gain, name);
        }
        Ok(scores.into_iter().take(keep).map(|(name, _)| name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
@RELATION DEMO
@ATTRIBUTE NOISE NUMERIC
@ATTRIBUTE SIGNAL NUMERIC
@ATTRIBUTE GROUP {a,b}
@ATTRIBUTE cluster_id {0,1}
@DATA
5,1.0,a,0
1,1.1,b,0
4,1.2,a,0
2,9.0,b,1
3,9.1,a,1
6,9.2,b,1
";

    #[test]
    fn test_entropy_of_even_split() {
        assert!((entropy(["a", "b"].iter()) - 1.0).abs() < 1e-12);
        assert_eq!(entropy(["a", "a"].iter()), 0.0);
    }

    #[test]
    fn test_perfect_predictor_gain() {
        let class = ["0", "0", "1", "1"];
        let feature = ["x", "x", "y", "y"];
        assert!((information_gain(&class, &feature) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_independent_feature_has_no_gain() {
        let class = ["0", "1", "0", "1"];
        let feature = ["x", "x", "y", "y"];
        assert!(information_gain(&class, &feature).abs() < 1e-12);
    }

    #[test]
    fn test_equal_frequency_bins() {
        let cells = [Some("1"), Some("2"), Some("3"), Some("4"), None];
        let bins = equal_frequency_bins("X", &cells, 2).unwrap();
        assert_eq!(bins, vec![0, 0, 1, 1, MISSING_BIN]);
    }

    #[test]
    fn test_ties_share_a_bin() {
        let cells = [Some("1"), Some("1"), Some("1"), Some("2")];
        let bins = equal_frequency_bins("X", &cells, 4).unwrap();
        assert_eq!(bins[0], bins[1]);
        assert_eq!(bins[1], bins[2]);
    }

    #[test]
    fn test_non_numeric_cell() {
        let err = equal_frequency_bins("AGE", &[Some("old")], 2).unwrap_err();
        assert!(matches!(err, SiftError::DataFormat { .. }));
    }

    #[test]
    fn test_rank_attributes_orders_by_gain() {
        let data = arff::parse(SAMPLE).unwrap();
        let scores = rank_attributes(&data, "cluster_id", 2).unwrap();
        assert_eq!(scores[0].0, "SIGNAL");
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn test_missing_target() {
        let data = arff::parse(SAMPLE).unwrap();
        assert!(rank_attributes(&data, "label", 2).is_err());
    }

    #[tokio::test]
    async fn test_ranker_returns_keep_names() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("data-3-2.arff");
        fs::write(&path, SAMPLE).expect("write");

        let ranked = InfoGainRanker::new(2)
            .rank(&RankRequest {
                arff_path: path,
                keep: 2,
                target: "cluster_id".into(),
            })
            .await
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0], "SIGNAL");
    }
}
