use anyhow::{bail, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{check_training_data, ClassModel, N_CLASSES};

/// Régression logistique multinomiale, descente de gradient avec L2.
/// La standardisation (z-score) est figée au premier entraînement complet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    learning_rate: f64,
    lambda: f64,
    epochs: usize,
    #[serde(default)]
    state: Option<SoftmaxState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SoftmaxState {
    weights: Array2<f64>,
    bias: Array1<f64>,
    means: Array1<f64>,
    stds: Array1<f64>,
}

impl Default for SoftmaxRegression {
    fn default() -> Self {
        Self::new(0.1, 0.001, 200)
    }
}

impl SoftmaxRegression {
    pub fn new(learning_rate: f64, lambda: f64, epochs: usize) -> Self {
        Self { learning_rate, lambda, epochs, state: None }
    }

    fn descend(&self, state: &mut SoftmaxState, x: &Array2<f64>, labels: &[u8]) {
        let n_samples = x.nrows() as f64;
        let mut y = Array2::<f64>::zeros((x.nrows(), N_CLASSES));
        for (i, &l) in labels.iter().enumerate() {
            y[[i, l as usize]] = 1.0;
        }

        for _ in 0..self.epochs {
            let mut probs = x.dot(&state.weights) + &state.bias;
            for mut row in probs.rows_mut() {
                if let Some(slice) = row.as_slice_mut() {
                    softmax_in_place(slice);
                }
            }
            let errors = probs - &y;

            let grad_w = x.t().dot(&errors) / n_samples + &state.weights * (self.lambda * 2.0);
            let grad_b = errors.sum_axis(Axis(0)) / n_samples;

            state.weights = &state.weights - &(grad_w * self.learning_rate);
            state.bias = &state.bias - &(grad_b * self.learning_rate);
        }
    }
}

impl SoftmaxState {
    fn standardize(&self, features: &[Vec<f64>]) -> Array2<f64> {
        let n_features = self.means.len();
        Array2::from_shape_fn((features.len(), n_features), |(i, j)| {
            (features[i][j] - self.means[j]) / self.stds[j]
        })
    }
}

impl ClassModel for SoftmaxRegression {
    fn name(&self) -> &str {
        "Softmax"
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        check_training_data(features, labels)?;
        let n_samples = features.len();
        let n_features = features[0].len();

        let x = Array2::from_shape_fn((n_samples, n_features), |(i, j)| features[i][j]);

        // Normaliser les features (z-score)
        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let stds = x
            .axis_iter(Axis(0))
            .fold(Array1::<f64>::zeros(n_features), |acc, row| {
                let diff = &row - &means;
                acc + &diff.mapv(|v| v * v)
            })
            / n_samples as f64;
        let stds = stds.mapv(|v| v.sqrt().max(1e-10));

        let mut state = SoftmaxState {
            weights: Array2::zeros((n_features, N_CLASSES)),
            bias: Array1::zeros(N_CLASSES),
            means,
            stds,
        };
        let x_norm = state.standardize(features);
        self.descend(&mut state, &x_norm, labels);
        self.state = Some(state);
        Ok(())
    }

    fn partial_fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return self.fit(features, labels);
        };
        let checked = check_training_data(features, labels).and_then(|_| {
            if features[0].len() != state.means.len() {
                bail!(
                    "Dimension des features incohérente : {} attendu, {} reçu",
                    state.means.len(),
                    features[0].len()
                );
            }
            Ok(())
        });
        if let Err(e) = checked {
            self.state = Some(state);
            return Err(e);
        }

        let x_norm = state.standardize(features);
        self.descend(&mut state, &x_norm, labels);
        self.state = Some(state);
        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        let Some(state) = &self.state else {
            bail!("Modèle softmax non entraîné");
        };
        if features.len() != state.means.len() {
            bail!(
                "Dimension des features incohérente : {} attendu, {} reçu",
                state.means.len(),
                features.len()
            );
        }
        let x: Array1<f64> = features
            .iter()
            .enumerate()
            .map(|(j, &v)| (v - state.means[j]) / state.stds[j])
            .collect();
        let logits = x.dot(&state.weights) + &state.bias;
        let mut dist = logits.to_vec();
        softmax_in_place(&mut dist);
        Ok(dist)
    }
}

/// Softmax numériquement stable (soustraction du max).
fn softmax_in_place(values: &mut [f64]) {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if !(sum > 1e-30) {
        let uniform = 1.0 / values.len().max(1) as f64;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}
