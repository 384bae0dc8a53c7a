//! Isolation forest outlier model.
//!
//! Trees isolate samples with random axis-aligned splits; short average path length means
//! anomalous. The decision threshold is fixed at fit time from the contamination rate.

use crate::error::{Result, SentinelError};
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.5772156649;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Normal,
    Anomalous,
}

/// Hyperparameters recorded with every snapshot for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub random_state: u64,
}

impl From<&crate::config::ModelConfig> for ForestParams {
    fn from(c: &crate::config::ModelConfig) -> Self {
        Self {
            n_estimators: c.n_estimators,
            max_samples: c.max_samples,
            contamination: c.contamination,
            random_state: c.random_state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationTree {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
    External {
        size: usize,
    },
}

impl IsolationTree {
    fn build(
        x: &Array2<f64>,
        indices: &[usize],
        height: usize,
        max_height: usize,
        rng: &mut StdRng,
    ) -> Self {
        let n_samples = indices.len();
        if height >= max_height || n_samples <= 1 {
            return IsolationTree::External { size: n_samples };
        }

        let feature = rng.gen_range(0..x.ncols());
        let (min_val, max_val) = indices
            .iter()
            .map(|&i| x[[i, feature]])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if max_val - min_val < 1e-10 {
            return IsolationTree::External { size: n_samples };
        }

        let threshold = rng.gen_range(min_val..max_val);
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] < threshold);
        if left.is_empty() || right.is_empty() {
            return IsolationTree::External { size: n_samples };
        }

        IsolationTree::Internal {
            feature,
            threshold,
            left: Box::new(Self::build(x, &left, height + 1, max_height, rng)),
            right: Box::new(Self::build(x, &right, height + 1, max_height, rng)),
        }
    }

    fn path_length(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationTree::External { size } => return depth as f64 + average_path(*size),
                IsolationTree::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] < *threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    params: ForestParams,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Grow the ensemble on every row of `x` and fix the decision threshold.
    pub fn fit(params: ForestParams, x: &Array2<f64>) -> Result<Self> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(SentinelError::EmptyInput("cannot fit on zero rows".into()));
        }
        if x.ncols() == 0 {
            return Err(SentinelError::DataFormat("cannot fit on zero features".into()));
        }

        let sample_size = params.max_samples.min(n_samples).max(1);
        let max_height = (sample_size as f64).log2().ceil().max(1.0) as usize;

        // Seeds are drawn up front so parallel construction keeps the same topology.
        let mut master = StdRng::seed_from_u64(params.random_state);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| master.gen()).collect();
        let trees: Vec<IsolationTree> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let indices = rand::seq::index::sample(&mut rng, n_samples, sample_size).into_vec();
                IsolationTree::build(x, &indices, 0, max_height, &mut rng)
            })
            .collect();

        let mut forest = Self {
            params,
            trees,
            sample_size,
            n_features: x.ncols(),
            threshold: 0.5,
        };
        let scores = forest.score_samples(x)?;
        forest.threshold = contamination_threshold(&scores, forest.params.contamination);
        Ok(forest)
    }

    /// Anomaly score in (0, 1]; higher is more anomalous.
    pub fn score_samples(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(SentinelError::DataFormat(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let c_n = average_path(self.sample_size).max(f64::EPSILON);
        let n_trees = self.trees.len().max(1) as f64;
        let rows: Vec<ArrayView1<'_, f64>> = x.rows().into_iter().collect();
        Ok(rows
            .par_iter()
            .map(|row| {
                let mean_path =
                    self.trees.iter().map(|t| t.path_length(*row)).sum::<f64>() / n_trees;
                2.0_f64.powf(-mean_path / c_n)
            })
            .collect())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<Label>> {
        Ok(self
            .score_samples(x)?
            .into_iter()
            .map(|s| {
                if s > self.threshold {
                    Label::Anomalous
                } else {
                    Label::Normal
                }
            })
            .collect())
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Midpoint between the k-th and (k+1)-th highest scores, k = round(contamination × n).
fn contamination_threshold(scores: &[f64], contamination: f64) -> f64 {
    let n = scores.len();
    let k = (contamination * n as f64).round() as usize;
    // Finite bounds keep the threshold representable in the JSON snapshot.
    if k == 0 {
        return f64::MAX;
    }
    if k >= n {
        return f64::MIN;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    (sorted[k - 1] + sorted[k]) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(contamination: f64) -> ForestParams {
        ForestParams {
            n_estimators: 100,
            max_samples: 256,
            contamination,
            random_state: 42,
        }
    }

    fn uniform(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((n, 3), |_| rng.gen_range(0.0..1.0))
    }

    #[test]
    fn outliers_score_higher() {
        let mut data = Vec::new();
        for i in 0..50 {
            data.push((i % 10) as f64);
            data.push(((i % 10) + 1) as f64);
        }
        data.extend_from_slice(&[100.0, 100.0, -50.0, -50.0]);
        let x = Array2::from_shape_vec((52, 2), data).unwrap();

        let forest = IsolationForest::fit(params(0.04), &x).unwrap();
        let scores = forest.score_samples(&x).unwrap();
        assert!(scores[50] > scores[0]);
        assert!(scores[51] > scores[0]);
        let labels = forest.predict(&x).unwrap();
        assert_eq!(labels[50], Label::Anomalous);
        assert_eq!(labels[51], Label::Anomalous);
    }

    #[test]
    fn same_seed_same_scores() {
        let x = uniform(300, 7);
        let a = IsolationForest::fit(params(0.05), &x).unwrap();
        let b = IsolationForest::fit(params(0.05), &x).unwrap();
        assert_eq!(a.score_samples(&x).unwrap(), b.score_samples(&x).unwrap());
        assert_eq!(a.threshold(), b.threshold());
    }

    #[test]
    fn training_flag_rate_matches_contamination() {
        let x = uniform(1000, 11);
        let forest = IsolationForest::fit(params(0.05), &x).unwrap();
        let flagged = forest
            .predict(&x)
            .unwrap()
            .iter()
            .filter(|l| **l == Label::Anomalous)
            .count();
        assert!((45..=55).contains(&flagged), "flagged {}", flagged);
    }

    #[test]
    fn fresh_iid_rate_tracks_contamination() {
        let forest = IsolationForest::fit(params(0.05), &uniform(2000, 3)).unwrap();
        let held_out = uniform(2000, 99);
        let flagged = forest
            .predict(&held_out)
            .unwrap()
            .iter()
            .filter(|l| **l == Label::Anomalous)
            .count();
        let rate = flagged as f64 / 2000.0;
        assert!(rate > 0.01 && rate < 0.12, "rate {}", rate);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let forest = IsolationForest::fit(params(0.05), &uniform(100, 1)).unwrap();
        let err = forest.predict(&Array2::zeros((2, 5))).unwrap_err();
        assert!(matches!(err, SentinelError::DataFormat(_)));
    }

    #[test]
    fn threshold_edges() {
        assert_eq!(contamination_threshold(&[0.1, 0.2], 0.0), f64::MAX);
        assert!((contamination_threshold(&[0.1, 0.9, 0.5, 0.3], 0.25) - 0.7).abs() < 1e-12);
        assert_eq!(contamination_threshold(&[0.1, 0.2], 1.0), f64::MIN);
    }
}
