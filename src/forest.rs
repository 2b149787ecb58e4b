use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibration::{Outcome, Prob3};
use crate::config::{ForestParams, derive_seed};
use crate::error::{ForecastError, Result};

/// Narrow seam between the training/serving code and the learning algorithm.
pub trait ProbabilisticClassifier: Send + Sync {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[Outcome], weights: &[f64]) -> Result<()>;

    fn predict_proba(&self, features: &[f64]) -> Result<Prob3>;

    /// Normalized per-feature importances, empty when the algorithm has none.
    fn feature_importances(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Serialized form of whichever classifier a model was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    RandomForest(RandomForest),
}

impl ProbabilisticClassifier for ClassifierArtifact {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[Outcome], weights: &[f64]) -> Result<()> {
        match self {
            ClassifierArtifact::RandomForest(f) => f.fit(features, labels, weights),
        }
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Prob3> {
        match self {
            ClassifierArtifact::RandomForest(f) => f.predict_proba(features),
        }
    }

    fn feature_importances(&self) -> Vec<f64> {
        match self {
            ClassifierArtifact::RandomForest(f) => f.feature_importances(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Node {
    Leaf {
        dist: [f64; 3],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: u32,
        right: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, x: &[f64]) -> [f64; 3] {
        let mut at = 0usize;
        loop {
            match self.nodes.get(at) {
                Some(Node::Leaf { dist }) => return *dist,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    at = if x[*feature] <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                None => return [1.0 / 3.0; 3],
            }
        }
    }
}

/// Bagged decision trees over weighted Gini impurity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn candidates_per_split(&self) -> usize {
        let k = self
            .params
            .max_features
            .unwrap_or_else(|| (self.n_features as f64).sqrt().ceil() as usize);
        k.clamp(1, self.n_features.max(1))
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[Outcome], weights: &[f64]) -> Result<()> {
        if features.is_empty() {
            return Err(ForecastError::InvalidRequest(
                "cannot fit a forest on zero rows".to_string(),
            ));
        }
        if features.len() != labels.len() || features.len() != weights.len() {
            return Err(ForecastError::InvalidRequest(format!(
                "row count mismatch: {} feature rows, {} labels, {} weights",
                features.len(),
                labels.len(),
                weights.len()
            )));
        }
        let n_features = features[0].len();
        if n_features == 0 || features.iter().any(|row| row.len() != n_features) {
            return Err(ForecastError::InvalidRequest(
                "feature rows must share one non-zero width".to_string(),
            ));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForecastError::InvalidRequest(
                "sample weights must be finite and non-negative".to_string(),
            ));
        }

        self.n_features = n_features;
        let k = self.candidates_per_split();
        let params = self.params;

        let grown = (0..params.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(params.seed, t as u64));
                let n = features.len();
                let rows = (0..n).map(|_| rng.gen_range(0..n)).collect::<Vec<_>>();
                let mut builder = TreeBuilder {
                    x: features,
                    y: labels,
                    w: weights,
                    params: &params,
                    candidates: k,
                    rng,
                    nodes: Vec::new(),
                    importance: vec![0.0; n_features],
                };
                builder.grow(rows, 0, [1.0 / 3.0; 3]);
                (
                    DecisionTree {
                        nodes: builder.nodes,
                    },
                    builder.importance,
                )
            })
            .collect::<Vec<_>>();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, imp) in grown {
            let total: f64 = imp.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&imp) {
                    *acc += v / total;
                }
            }
            trees.push(tree);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        self.trees = trees;
        self.importances = importances;
        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Prob3> {
        if features.len() != self.n_features {
            return Err(ForecastError::InvalidRequest(format!(
                "forest expects {} features, got {}",
                self.n_features,
                features.len()
            )));
        }
        if self.trees.is_empty() {
            return Ok(Prob3::uniform());
        }
        let mut acc = [0.0; 3];
        for tree in &self.trees {
            let d = tree.predict(features);
            for c in 0..3 {
                acc[c] += d[c];
            }
        }
        let n = self.trees.len() as f64;
        Ok(Prob3::from_array([acc[0] / n, acc[1] / n, acc[2] / n]))
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'d> {
    x: &'d [Vec<f64>],
    y: &'d [Outcome],
    w: &'d [f64],
    params: &'d ForestParams,
    candidates: usize,
    rng: ChaCha8Rng,
    nodes: Vec<Node>,
    importance: Vec<f64>,
}

impl TreeBuilder<'_> {
    fn class_totals(&self, rows: &[usize]) -> [f64; 3] {
        let mut t = [0.0; 3];
        for &r in rows {
            t[self.y[r].index()] += self.w[r];
        }
        t
    }

    /// Zero-weight nodes inherit `parent` as their leaf distribution.
    fn grow(&mut self, rows: Vec<usize>, depth: usize, parent: [f64; 3]) -> u32 {
        let totals = self.class_totals(&rows);
        let dist = normalized(totals).unwrap_or(parent);
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::Leaf { dist });

        let pure = totals.iter().filter(|v| **v > 0.0).count() <= 1;
        if depth >= self.params.max_depth
            || rows.len() < self.params.min_samples_split.max(2)
            || pure
        {
            return id;
        }
        let Some(split) = self.best_split(&rows, totals) else {
            return id;
        };

        let x = self.x;
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|r| x[*r][split.feature] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }
        self.importance[split.feature] += split.gain;

        let l = self.grow(left, depth + 1, dist);
        let r = self.grow(right, depth + 1, dist);
        self.nodes[id as usize] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: l,
            right: r,
        };
        id
    }

    fn best_split(&mut self, rows: &[usize], totals: [f64; 3]) -> Option<SplitChoice> {
        let n_features = self.x[0].len();
        let chosen = index::sample(&mut self.rng, n_features, self.candidates);
        let total_w: f64 = totals.iter().sum();
        let parent = gini(totals) * total_w;
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<SplitChoice> = None;
        let mut order = rows.to_vec();
        for feature in chosen.iter() {
            order.sort_unstable_by(|a, b| self.x[*a][feature].total_cmp(&self.x[*b][feature]));

            let mut left = [0.0; 3];
            for i in 0..order.len() - 1 {
                let r = order[i];
                left[self.y[r].index()] += self.w[r];
                let n_left = i + 1;
                let n_right = order.len() - n_left;
                if n_right < min_leaf {
                    break;
                }
                if n_left < min_leaf {
                    continue;
                }
                let v = self.x[r][feature];
                let next = self.x[order[i + 1]][feature];
                if next <= v {
                    continue;
                }
                let right = [totals[0] - left[0], totals[1] - left[1], totals[2] - left[2]];
                let wl: f64 = left.iter().sum();
                let wr: f64 = right.iter().sum();
                let gain = parent - gini(left) * wl - gini(right) * wr;
                if gain > best.as_ref().map_or(1e-12, |b| b.gain + 1e-12) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: 0.5 * (v + next),
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn gini(w: [f64; 3]) -> f64 {
    let total: f64 = w.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - w.iter().map(|v| (v / total).powi(2)).sum::<f64>()
}

fn normalized(w: [f64; 3]) -> Option<[f64; 3]> {
    let total: f64 = w.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some([w[0] / total, w[1] / total, w[2] / total])
}
