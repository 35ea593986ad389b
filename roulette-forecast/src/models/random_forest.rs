use anyhow::{bail, Result};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{check_training_data, ClassModel, N_CLASSES};

/// Forêt aléatoire multi-classe (Gini), arbres construits en parallèle.
/// L'arbre de génération `g` est tiré avec la graine `seed + g`, ce qui rend
/// l'entraînement reproductible quel que soit l'ordonnancement de rayon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_split: usize,
    trees_per_update: usize,
    seed: u64,
    #[serde(default)]
    n_features: usize,
    #[serde(default)]
    generation: u64,
    #[serde(default)]
    trees: Vec<TreeNode>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100, 12, 4, 10, 42)
    }
}

impl RandomForest {
    pub fn new(n_trees: usize, max_depth: usize, min_samples_split: usize, trees_per_update: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            max_depth,
            min_samples_split: min_samples_split.max(2),
            trees_per_update: trees_per_update.max(1),
            seed,
            n_features: 0,
            generation: 0,
            trees: Vec::new(),
        }
    }

    pub fn n_fitted_trees(&self) -> usize {
        self.trees.len()
    }

    fn grow(&self, features: &[Vec<f64>], labels: &[u8], count: usize, first_generation: u64) -> Vec<TreeNode> {
        let features_per_split = (features[0].len() as f64).sqrt().ceil() as usize;
        (0..count as u64)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(first_generation + t));

                // Bootstrap sampling
                let n_samples = features.len();
                let indices: Vec<usize> = (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect();
                let boot_features: Vec<&Vec<f64>> = indices.iter().map(|&i| &features[i]).collect();
                let boot_labels: Vec<u8> = indices.iter().map(|&i| labels[i]).collect();

                let params = TreeParams {
                    min_samples_split: self.min_samples_split,
                    features_per_split,
                };
                build_tree(&boot_features, &boot_labels, self.max_depth, &params, &mut rng)
            })
            .collect()
    }
}

impl ClassModel for RandomForest {
    fn name(&self) -> &str {
        "RandomForest"
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        check_training_data(features, labels)?;
        self.trees = self.grow(features, labels, self.n_trees, 0);
        self.generation = self.n_trees as u64;
        self.n_features = features[0].len();
        Ok(())
    }

    fn partial_fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        if self.trees.is_empty() {
            return self.fit(features, labels);
        }
        check_training_data(features, labels)?;
        if features[0].len() != self.n_features {
            bail!(
                "Dimension des features incohérente : {} attendu, {} reçu",
                self.n_features,
                features[0].len()
            );
        }

        let count = self.trees_per_update.min(self.n_trees);
        let new_trees = self.grow(features, labels, count, self.generation);
        self.generation += count as u64;
        self.trees.extend(new_trees);
        // Les arbres les plus anciens sont retirés
        let excess = self.trees.len().saturating_sub(self.n_trees);
        self.trees.drain(..excess);
        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            bail!("Forêt non entraînée");
        }
        if features.len() != self.n_features {
            bail!(
                "Dimension des features incohérente : {} attendu, {} reçu",
                self.n_features,
                features.len()
            );
        }
        let mut dist = vec![0.0f64; N_CLASSES];
        for tree in &self.trees {
            for (d, p) in dist.iter_mut().zip(predict_tree(tree, features)) {
                *d += p;
            }
        }
        let n = self.trees.len() as f64;
        for d in &mut dist {
            *d /= n;
        }
        Ok(dist)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf { dist: Vec<f64> },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

struct TreeParams {
    min_samples_split: usize,
    features_per_split: usize,
}

fn class_counts<'a>(labels: impl IntoIterator<Item = &'a u8>) -> [usize; N_CLASSES] {
    let mut counts = [0usize; N_CLASSES];
    for &l in labels {
        counts[l as usize] += 1;
    }
    counts
}

fn leaf(labels: &[u8]) -> TreeNode {
    let counts = class_counts(labels);
    let n = labels.len().max(1) as f64;
    TreeNode::Leaf {
        dist: counts.iter().map(|&c| c as f64 / n).collect(),
    }
}

fn build_tree(
    features: &[&Vec<f64>],
    labels: &[u8],
    depth_left: usize,
    params: &TreeParams,
    rng: &mut StdRng,
) -> TreeNode {
    if depth_left == 0 || labels.len() < params.min_samples_split {
        return leaf(labels);
    }

    // Toutes les étiquettes identiques
    let first = labels[0];
    if labels.iter().all(|&l| l == first) {
        return leaf(labels);
    }

    let n_features = features[0].len();
    let mut feature_indices: Vec<usize> = (0..n_features).collect();
    feature_indices.shuffle(rng);
    feature_indices.truncate(params.features_per_split);

    let mut best_gini = f64::MAX;
    let mut best_feature = 0;
    let mut best_threshold = 0.0;

    for &feat_idx in &feature_indices {
        let mut values: Vec<f64> = features.iter().map(|f| f[feat_idx]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        if values.len() < 2 {
            continue;
        }

        // Seuils entre valeurs consécutives, échantillonnés
        let step = (values.len() / 10).max(1);
        for i in (0..values.len() - 1).step_by(step) {
            let threshold = (values[i] + values[i + 1]) / 2.0;
            let gini = split_gini(features, labels, feat_idx, threshold);

            if gini < best_gini {
                best_gini = gini;
                best_feature = feat_idx;
                best_threshold = threshold;
            }
        }
    }

    if best_gini >= gini_impurity(&class_counts(labels), labels.len()) {
        return leaf(labels);
    }

    let mut left_features = Vec::new();
    let mut left_labels = Vec::new();
    let mut right_features = Vec::new();
    let mut right_labels = Vec::new();

    for (i, feat) in features.iter().enumerate() {
        if feat[best_feature] <= best_threshold {
            left_features.push(*feat);
            left_labels.push(labels[i]);
        } else {
            right_features.push(*feat);
            right_labels.push(labels[i]);
        }
    }

    if left_features.is_empty() || right_features.is_empty() {
        return leaf(labels);
    }

    TreeNode::Split {
        feature_idx: best_feature,
        threshold: best_threshold,
        left: Box::new(build_tree(&left_features, &left_labels, depth_left - 1, params, rng)),
        right: Box::new(build_tree(&right_features, &right_labels, depth_left - 1, params, rng)),
    }
}

fn gini_impurity(counts: &[usize; N_CLASSES], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

fn split_gini(features: &[&Vec<f64>], labels: &[u8], feature_idx: usize, threshold: f64) -> f64 {
    let mut left = [0usize; N_CLASSES];
    let mut right = [0usize; N_CLASSES];
    let mut n_left = 0;

    for (feat, &label) in features.iter().zip(labels) {
        if feat[feature_idx] <= threshold {
            left[label as usize] += 1;
            n_left += 1;
        } else {
            right[label as usize] += 1;
        }
    }

    let n = labels.len();
    let n_right = n - n_left;
    if n_left == 0 || n_right == 0 {
        return f64::MAX;
    }

    let n = n as f64;
    (n_left as f64 / n) * gini_impurity(&left, n_left) + (n_right as f64 / n) * gini_impurity(&right, n_right)
}

fn predict_tree<'a>(node: &'a TreeNode, features: &[f64]) -> &'a [f64] {
    match node {
        TreeNode::Leaf { dist } => dist.as_slice(),
        TreeNode::Split { feature_idx, threshold, left, right } => {
            if features[*feature_idx] <= *threshold {
                predict_tree(left, features)
            } else {
                predict_tree(right, features)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validate_distribution;

    /// Deux groupes séparables : feature 0 < 0.5 -> classe 3, sinon classe 30.
    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let x = i as f64 / 40.0;
            features.push(vec![x, (i % 7) as f64]);
            labels.push(if x < 0.5 { 3 } else { 30 });
        }
        (features, labels)
    }

    #[test]
    fn test_forest_sums_to_one() {
        let (features, labels) = separable();
        let mut forest = RandomForest::new(20, 5, 2, 5, 42);
        forest.fit(&features, &labels).unwrap();
        let dist = forest.predict_proba(&[0.1, 2.0]).unwrap();
        assert!(validate_distribution(&dist), "Sum = {}", dist.iter().sum::<f64>());
    }

    #[test]
    fn test_forest_learns_separable_split() {
        let (features, labels) = separable();
        let mut forest = RandomForest::new(30, 5, 2, 5, 42);
        forest.fit(&features, &labels).unwrap();
        let low = forest.predict_proba(&[0.05, 1.0]).unwrap();
        let high = forest.predict_proba(&[0.95, 1.0]).unwrap();
        assert!(low[3] > low[30], "low: p3={} p30={}", low[3], low[30]);
        assert!(high[30] > high[3], "high: p3={} p30={}", high[3], high[30]);
    }

    #[test]
    fn test_forest_is_deterministic() {
        let (features, labels) = separable();
        let mut a = RandomForest::new(15, 4, 2, 5, 7);
        let mut b = RandomForest::new(15, 4, 2, 5, 7);
        a.fit(&features, &labels).unwrap();
        b.fit(&features, &labels).unwrap();
        assert_eq!(a.predict_proba(&[0.4, 3.0]).unwrap(), b.predict_proba(&[0.4, 3.0]).unwrap());
    }

    #[test]
    fn test_forest_unfitted_errors() {
        let forest = RandomForest::default();
        assert!(forest.predict_proba(&[0.0]).is_err());
    }

    #[test]
    fn test_forest_dimension_mismatch() {
        let (features, labels) = separable();
        let mut forest = RandomForest::new(5, 3, 2, 2, 42);
        forest.fit(&features, &labels).unwrap();
        assert!(forest.predict_proba(&[0.0, 1.0, 2.0]).is_err());
    }

    #[test]
    fn test_partial_fit_keeps_tree_count() {
        let (features, labels) = separable();
        let mut forest = RandomForest::new(10, 3, 2, 4, 42);
        forest.partial_fit(&features, &labels).unwrap();
        assert_eq!(forest.n_fitted_trees(), 10);
        forest.partial_fit(&features[..5], &labels[..5]).unwrap();
        assert_eq!(forest.n_fitted_trees(), 10);
        assert_eq!(forest.generation, 14);
        let dist = forest.predict_proba(&[0.2, 1.0]).unwrap();
        assert!(validate_distribution(&dist));
    }

    #[test]
    fn test_single_example_gives_leaf() {
        let mut forest = RandomForest::new(3, 5, 2, 1, 42);
        forest.fit(&[vec![1.0, 2.0]], &[17]).unwrap();
        let dist = forest.predict_proba(&[0.0, 0.0]).unwrap();
        assert!((dist[17] - 1.0).abs() < 1e-12);
    }
}
