
use anyhow::{ensure, Context};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::hyperparameters::Hyperparameters;
use crate::classifier::quantize::{FeatureBins, MISSING_BIN};
use crate::util::progress_bar::styled_progress_bar;

/// Hessian floor so pure nodes never divide by zero
const MIN_HESSIAN: f64 = 1e-16;

/// A node in a regression tree; children are indices into the tree's node list
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Values `<= threshold` go left
        threshold: f64,
        /// Where missing values go
        default_left: bool,
        left: usize,
        right: usize
    },
    Leaf {
        value: f64
    }
}

/// One boosting round; node 0 is the root
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>
}

impl RegressionTree {
    /// Margin contribution of this tree for one row
    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, default_left, left, right } => {
                    let value = row[*feature];
                    let go_left = if value.is_nan() { *default_left } else { value <= *threshold };
                    index = if go_left { *left } else { *right };
                }
            }
        }
    }

    // getters
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }
}

/// Additive ensemble of regression trees under a logistic link
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TreeEnsemble {
    base_margin: f64,
    trees: Vec<RegressionTree>
}

impl TreeEnsemble {
    /// Probability for one row using at most `rounds` trees
    pub fn predict_probability(&self, row: &[f64], rounds: usize) -> f64 {
        let margin = self.base_margin + self.trees.iter()
            .take(rounds)
            .map(|t| t.predict_margin(row))
            .sum::<f64>();
        sigmoid(margin)
    }

    /// Probabilities for a batch of rows
    pub fn predict(&self, rows: &[&[f64]], rounds: usize) -> Vec<f64> {
        rows.iter()
            .map(|r| self.predict_probability(r, rounds))
            .collect()
    }

    /// Number of trained rounds
    pub fn num_rounds(&self) -> usize {
        self.trees.len()
    }

    // getters
    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Trains a binary logistic ensemble on histogram-quantized features
/// # Arguments
/// * `rows` - row-major feature values; NaN is missing
/// * `labels` - true for positive rows
/// * `hyperparameters` - tree shape, regularization, and sampling
/// * `rounds` - number of trees to grow
/// # Errors
/// * if the inputs are empty or inconsistent
/// * if the thread pool cannot be created
pub fn train_ensemble(
    rows: &[&[f64]], labels: &[bool],
    hyperparameters: &Hyperparameters, rounds: usize
) -> anyhow::Result<TreeEnsemble> {
    ensure!(!rows.is_empty(), "No rows to train on");
    ensure!(rows.len() == labels.len(), "Received {} labels for {} rows", labels.len(), rows.len());
    let num_features = rows[0].len();
    ensure!(rows.iter().all(|r| r.len() == num_features), "Training rows have inconsistent widths");

    let bins = FeatureBins::fit(rows, num_features, hyperparameters.max_bin());
    let binned = bins.transform(rows);
    let targets: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();

    let base_score = hyperparameters.base_score();
    let base_margin = (base_score / (1.0 - base_score)).ln();
    let mut margins: Vec<f64> = vec![base_margin; rows.len()];
    let mut rng = StdRng::seed_from_u64(hyperparameters.seed());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(hyperparameters.nthread())
        .build()
        .with_context(|| "Error while building the training thread pool:")?;

    let num_sampled_features = ((num_features as f64 * hyperparameters.colsample_bytree()).ceil() as usize)
        .clamp(1, num_features.max(1));
    let mut feature_order: Vec<usize> = (0..num_features).collect();

    let pb = styled_progress_bar(rounds as u64, "Boosting rounds...");
    let mut trees: Vec<RegressionTree> = Vec::with_capacity(rounds);
    for _round in 0..rounds {
        let (gradients, hessians): (Vec<f64>, Vec<f64>) = margins.iter()
            .zip(targets.iter())
            .map(|(&m, &y)| {
                let p = sigmoid(m);
                (p - y, (p * (1.0 - p)).max(MIN_HESSIAN))
            })
            .unzip();

        let sampled_rows: Vec<usize> = if hyperparameters.subsample() < 1.0 {
            let chosen: Vec<usize> = (0..rows.len())
                .filter(|_i| rng.random::<f64>() < hyperparameters.subsample())
                .collect();
            if chosen.is_empty() { (0..rows.len()).collect() } else { chosen }
        } else {
            (0..rows.len()).collect()
        };

        let mut features: Vec<usize> = if num_sampled_features < num_features {
            feature_order.shuffle(&mut rng);
            feature_order[..num_sampled_features].to_vec()
        } else {
            (0..num_features).collect()
        };
        features.sort_unstable();

        let grower = TreeGrower {
            bins: &bins,
            binned: &binned,
            gradients: &gradients,
            hessians: &hessians,
            features: &features,
            hyperparameters
        };
        let tree = pool.install(|| grower.grow(sampled_rows));

        for (margin, row) in margins.iter_mut().zip(rows.iter()) {
            *margin += tree.predict_margin(row);
        }
        trees.push(tree);
        pb.inc(1);
    }
    pb.finish_with_message("Boosting complete.");

    let total_nodes: usize = trees.iter().map(|t| t.nodes.len()).sum();
    debug!("Trained {} trees with {total_nodes} total nodes", trees.len());
    Ok(TreeEnsemble {
        base_margin,
        trees
    })
}

/// Best split found for one node
#[derive(Clone, Copy, Debug)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: u16,
    default_left: bool
}

impl SplitCandidate {
    /// Higher gain wins; ties go to the lower feature, then lower bin, so results do not depend on thread timing
    fn better(self, other: Self) -> Self {
        let key = |c: &Self| (c.feature, c.bin, !c.default_left);
        if other.gain > self.gain || (other.gain == self.gain && key(&other) < key(&self)) {
            other
        } else {
            self
        }
    }
}

/// Per-round state for depth-wise tree growth
struct TreeGrower<'a> {
    bins: &'a FeatureBins,
    /// Column-major bins
    binned: &'a [Vec<u16>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    /// Features available to this tree
    features: &'a [usize],
    hyperparameters: &'a Hyperparameters
}

impl TreeGrower<'_> {
    fn grow(&self, rows: Vec<usize>) -> RegressionTree {
        let mut nodes: Vec<TreeNode> = vec![];
        self.grow_node(&mut nodes, rows, 0);
        RegressionTree { nodes }
    }

    /// Adds the subtree for `rows` and returns its root index
    fn grow_node(&self, nodes: &mut Vec<TreeNode>, rows: Vec<usize>, depth: usize) -> usize {
        let (g_sum, h_sum) = rows.iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.gradients[r], h + self.hessians[r]));
        let lambda = self.hyperparameters.lambda();

        let node_index = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: -g_sum / (h_sum + lambda) * self.hyperparameters.eta()
        });

        if depth >= self.hyperparameters.max_depth() || rows.len() < 2 {
            return node_index;
        }
        let best = match self.best_split(&rows, g_sum, h_sum) {
            Some(b) => b,
            None => return node_index
        };

        let column = &self.binned[best.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter()
            .partition(|&r| {
                let b = column[r];
                if b == MISSING_BIN { best.default_left } else { b <= best.bin }
            });

        let left = self.grow_node(nodes, left_rows, depth + 1);
        let right = self.grow_node(nodes, right_rows, depth + 1);
        nodes[node_index] = TreeNode::Split {
            feature: best.feature,
            threshold: self.bins.threshold(best.feature, best.bin),
            default_left: best.default_left,
            left,
            right
        };
        node_index
    }

    /// Scans gradient histograms of every available feature in parallel
    fn best_split(&self, rows: &[usize], g_sum: f64, h_sum: f64) -> Option<SplitCandidate> {
        self.features.par_iter()
            .filter_map(|&f| self.best_split_for_feature(f, rows, g_sum, h_sum))
            .reduce_with(|a, b| a.better(b))
    }

    fn best_split_for_feature(&self, feature: usize, rows: &[usize], g_sum: f64, h_sum: f64) -> Option<SplitCandidate> {
        let num_bins = self.bins.num_bins(feature);
        if num_bins < 2 {
            return None;
        }

        let column = &self.binned[feature];
        let mut histogram: Vec<(f64, f64)> = vec![(0.0, 0.0); num_bins];
        let mut missing = (0.0, 0.0);
        for &r in rows.iter() {
            let slot = match column[r] {
                MISSING_BIN => &mut missing,
                b => &mut histogram[b as usize]
            };
            slot.0 += self.gradients[r];
            slot.1 += self.hessians[r];
        }

        let lambda = self.hyperparameters.lambda();
        let min_child_weight = self.hyperparameters.min_child_weight();
        let parent_score = g_sum * g_sum / (h_sum + lambda);

        let mut best: Option<SplitCandidate> = None;
        let (mut g_left, mut h_left) = (0.0, 0.0);
        for (bin, &(g, h)) in histogram.iter().enumerate().take(num_bins - 1) {
            g_left += g;
            h_left += h;
            for default_left in [true, false] {
                let (gl, hl) = if default_left { (g_left + missing.0, h_left + missing.1) } else { (g_left, h_left) };
                let (gr, hr) = (g_sum - gl, h_sum - hl);
                if hl < min_child_weight || hr < min_child_weight {
                    continue;
                }
                let gain = 0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score)
                    - self.hyperparameters.gamma();
                if gain <= 0.0 {
                    continue;
                }
                let candidate = SplitCandidate { gain, feature, bin: bin as u16, default_left };
                best = Some(match best {
                    Some(b) => b.better(candidate),
                    None => candidate
                });
            }
        }
        best
    }
}
