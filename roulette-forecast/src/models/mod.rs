pub mod random_forest;
pub mod softmax;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use roulette_db::models::N_VALUES;

pub use random_forest::RandomForest;
pub use softmax::SoftmaxRegression;

/// Espace des labels : toutes les valeurs de la roue, 0 à 36.
pub const N_CLASSES: usize = N_VALUES;

pub trait ClassModel: Send + Sync {
    fn name(&self) -> &str;
    /// Réentraînement complet. `labels[i]` < N_CLASSES.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()>;
    /// Mise à jour incrémentale qui conserve l'état appris.
    fn partial_fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()>;
    /// Retourne Vec<f64> de taille N_CLASSES, somme = 1.0
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Model {
    Forest(RandomForest),
    Softmax(SoftmaxRegression),
}

impl Model {
    fn inner(&self) -> &dyn ClassModel {
        match self {
            Model::Forest(m) => m as &dyn ClassModel,
            Model::Softmax(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ClassModel {
        match self {
            Model::Forest(m) => m as &mut dyn ClassModel,
            Model::Softmax(m) => m,
        }
    }
}

impl ClassModel for Model {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        self.inner_mut().fit(features, labels)
    }

    fn partial_fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        self.inner_mut().partial_fit(features, labels)
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        self.inner().predict_proba(features)
    }
}

/// Vérifie un lot d'entraînement : non vide, dimensions cohérentes, labels dans 0..=36.
pub fn check_training_data(features: &[Vec<f64>], labels: &[u8]) -> Result<()> {
    if features.is_empty() {
        bail!("Lot d'entraînement vide");
    }
    if features.len() != labels.len() {
        bail!("{} vecteurs pour {} labels", features.len(), labels.len());
    }
    let n_features = features[0].len();
    if n_features == 0 {
        bail!("Vecteur de features vide");
    }
    if let Some(row) = features.iter().position(|f| f.len() != n_features) {
        bail!("Vecteur {} de longueur {} (attendu {})", row, features[row].len(), n_features);
    }
    if let Some(&label) = labels.iter().find(|&&l| l as usize >= N_CLASSES) {
        bail!("Label {} hors de l'espace des classes", label);
    }
    if features.iter().flatten().any(|x| !x.is_finite()) {
        bail!("Feature non finie dans le lot d'entraînement");
    }
    Ok(())
}

pub fn validate_distribution(dist: &[f64]) -> bool {
    if dist.len() != N_CLASSES {
        return false;
    }
    if dist.iter().any(|&p| p < 0.0 || !p.is_finite()) {
        return false;
    }
    let sum: f64 = dist.iter().sum();
    (sum - 1.0).abs() < 1e-9
}

/// Distribution uniforme sur les 37 classes.
pub fn uniform() -> Vec<f64> {
    vec![1.0 / N_CLASSES as f64; N_CLASSES]
}

/// Historique synthétique cyclique 0, 1, ..., 36, 0, 1, ...
pub fn make_test_history(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % N_CLASSES) as u8).collect()
}
