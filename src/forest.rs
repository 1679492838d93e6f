use anyhow::{Context, Result, anyhow};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::matrix::FeatureMatrix;

pub trait Regressor {
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> Result<()>;
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Normalised per-column importances, when the model has them.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    // None considers every column at every split.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
    // 0 uses every available core.
    pub n_jobs: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 400,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 2,
            max_features: None,
            bootstrap: true,
            seed: 42,
            n_jobs: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        // Where NaN goes at this node.
        missing_left: bool,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    missing_left,
                    left,
                    right,
                } => {
                    idx = if goes_left(row[*feature], *threshold, *missing_left) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

fn goes_left(value: f64, threshold: f64, missing_left: bool) -> bool {
    if value.is_nan() {
        missing_left
    } else {
        value <= threshold
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let mut m = Self::default();
        for v in values {
            m.push(v);
        }
        m
    }

    fn push(&mut self, v: f64) {
        self.n += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    fn plus(self, other: Moments) -> Moments {
        Moments {
            n: self.n + other.n,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
        }
    }

    fn minus(self, other: Moments) -> Moments {
        Moments {
            n: self.n - other.n,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    // Sum of squared deviations from the mean.
    fn sse(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.n as f64).max(0.0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    missing_left: bool,
    sse: f64,
}

struct TreeBuilder<'a> {
    x: &'a FeatureMatrix,
    y: &'a [f64],
    config: &'a ForestConfig,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        let parent = Moments::of(indices.iter().map(|&i| self.y[i]));
        self.nodes.push(Node::Leaf {
            value: parent.mean(),
        });

        let Some(split) = self.best_split(&indices, depth, &parent) else {
            return id;
        };
        let x = self.x;
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| goes_left(x.get(i, split.feature), split.threshold, split.missing_left));
        self.importances[split.feature] += parent.sse() - split.sse;

        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            missing_left: split.missing_left,
            left,
            right,
        };
        id
    }

    fn best_split(
        &mut self,
        indices: &[usize],
        depth: usize,
        parent: &Moments,
    ) -> Option<SplitCandidate> {
        let min_leaf = self.config.min_samples_leaf.max(1);
        let n = indices.len();
        if n < self.config.min_samples_split.max(2) || n < 2 * min_leaf {
            return None;
        }
        if self.config.max_depth.is_some_and(|max| depth >= max) {
            return None;
        }
        if parent.sse() <= 1e-12 {
            return None;
        }

        let n_features = self.x.n_cols();
        let candidates = match self.config.max_features {
            Some(k) if k < n_features => sample(&mut self.rng, n_features, k.max(1)).into_vec(),
            _ => (0..n_features).collect(),
        };

        let mut best: Option<SplitCandidate> = None;
        let mut present: Vec<(f64, f64)> = Vec::with_capacity(n);
        for feature in candidates {
            present.clear();
            let mut missing = Moments::default();
            for &i in indices {
                let v = self.x.get(i, feature);
                if v.is_nan() {
                    missing.push(self.y[i]);
                } else {
                    present.push((v, self.y[i]));
                }
            }
            let all_present = Moments::of(present.iter().map(|p| p.1));

            // Present values left, missing values right.
            if missing.n >= min_leaf && all_present.n >= min_leaf {
                let sse = all_present.sse() + missing.sse();
                if best.as_ref().is_none_or(|b| sse < b.sse) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: f64::INFINITY,
                        missing_left: false,
                        sse,
                    });
                }
            }

            if present.len() < 2 {
                continue;
            }
            present.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = Moments::default();
            for k in 0..present.len() - 1 {
                left.push(present[k].1);
                let (lo, hi) = (present[k].0, present[k + 1].0);
                if lo == hi {
                    continue;
                }
                let right = all_present.minus(left);
                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid >= hi { lo } else { mid };

                for missing_left in [true, false] {
                    if missing.n == 0 && !missing_left {
                        continue;
                    }
                    let (l, r) = if missing_left {
                        (left.plus(missing), right)
                    } else {
                        (left, right.plus(missing))
                    };
                    if l.n < min_leaf || r.n < min_leaf {
                        continue;
                    }
                    let sse = l.sse() + r.sse();
                    if best.as_ref().is_none_or(|b| sse < b.sse) {
                        // With no missing values here, unseen NaN follows the larger side.
                        let missing_left = if missing.n == 0 { l.n >= r.n } else { missing_left };
                        best = Some(SplitCandidate {
                            feature,
                            threshold,
                            missing_left,
                            sse,
                        });
                    }
                }
            }
        }

        best.filter(|b| b.sse < parent.sse())
    }
}

fn grow_tree(
    x: &FeatureMatrix,
    y: &[f64],
    config: &ForestConfig,
    seed: u64,
) -> (RegressionTree, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = y.len();
    let indices = if config.bootstrap {
        (0..n).map(|_| rng.gen_range(0..n)).collect()
    } else {
        (0..n).collect()
    };
    let mut builder = TreeBuilder {
        x,
        y,
        config,
        rng,
        nodes: Vec::new(),
        importances: vec![0.0; x.n_cols()],
    };
    builder.grow(indices, 0);
    (
        RegressionTree {
            nodes: builder.nodes,
        },
        builder.importances,
    )
}

/// Bagged variance-reduction regression trees. Missing feature values are
/// routed per split to whichever side fits the training data better.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForestRegressor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
            importances: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> Result<()> {
        if features.n_rows() != target.len() {
            return Err(anyhow!(
                "feature matrix has {} rows but target has {} values",
                features.n_rows(),
                target.len()
            ));
        }
        if target.is_empty() {
            return Err(anyhow!("cannot fit a forest on zero rows"));
        }
        if features.n_cols() == 0 {
            return Err(anyhow!("cannot fit a forest without feature columns"));
        }
        if let Some(idx) = target.iter().position(|v| !v.is_finite()) {
            return Err(anyhow!("target value at row {idx} is not finite"));
        }
        if self.config.n_trees == 0 {
            return Err(anyhow!("forest needs at least one tree"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs)
            .build()
            .context("build forest thread pool")?;
        let config = &self.config;
        let fitted: Vec<(RegressionTree, Vec<f64>)> = pool.install(|| {
            (0..config.n_trees)
                .into_par_iter()
                .map(|t| grow_tree(features, target, config, config.seed.wrapping_add(t as u64)))
                .collect()
        });

        let n_features = features.n_cols();
        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, tree_importances) in fitted {
            let total: f64 = tree_importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_importances) {
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

        let max_depth = trees.iter().map(|t| t.depth()).max().unwrap_or(0);
        info!(
            trees = trees.len(),
            rows = target.len(),
            features = n_features,
            max_depth,
            "fitted random forest"
        );

        self.trees = trees;
        self.n_features = n_features;
        self.importances = importances;
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(anyhow!("forest has not been fitted"));
        }
        if features.n_cols() != self.n_features {
            return Err(anyhow!(
                "forest was fitted on {} columns, got {}",
                self.n_features,
                features.n_cols()
            ));
        }
        let n_trees = self.trees.len() as f64;
        Ok((0..features.n_rows())
            .map(|i| {
                let row = features.row(i);
                self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees
            })
            .collect())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        (!self.importances.is_empty()).then(|| self.importances.clone())
    }
}
