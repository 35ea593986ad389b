use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Model, RandomForest, SoftmaxRegression, N_CLASSES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrainStrategy {
    /// Réentraînement complet à chaque nouveau résultat
    #[default]
    Full,
    /// Mise à jour avec les seuls exemples nouveaux
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Forest,
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub trees_per_update: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 4,
            trees_per_update: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftmaxParams {
    pub learning_rate: f64,
    pub lambda: f64,
    pub epochs: usize,
}

impl Default for SoftmaxParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            lambda: 0.001,
            epochs: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Nombre minimal de résultats avant toute prédiction.
    pub janela_min: usize,
    /// Longueur de la fenêtre de features.
    pub janela_max: usize,
    pub top_k: usize,
    /// Probabilité minimale pour être classé sans complément.
    pub prob_threshold: f64,
    pub history_cap: Option<usize>,
    pub strategy: RetrainStrategy,
    pub model: ModelKind,
    pub forest: ForestParams,
    pub softmax: SoftmaxParams,
    pub seed: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            janela_min: 18,
            janela_max: 36,
            top_k: 6,
            prob_threshold: 0.0,
            history_cap: None,
            strategy: RetrainStrategy::Full,
            model: ModelKind::Forest,
            forest: ForestParams::default(),
            softmax: SoftmaxParams::default(),
            seed: 42,
        }
    }
}

impl PredictorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.janela_max == 0 {
            bail!("janela_max doit être positif");
        }
        if self.top_k == 0 || self.top_k > N_CLASSES {
            bail!("top_k doit être compris entre 1 et {} (reçu {})", N_CLASSES, self.top_k);
        }
        if !(0.0..=1.0).contains(&self.prob_threshold) {
            bail!("prob_threshold doit être dans [0, 1] (reçu {})", self.prob_threshold);
        }
        if let Some(cap) = self.history_cap {
            if cap < self.janela_max + 2 {
                bail!(
                    "history_cap ({}) trop petit pour janela_max={} (minimum {})",
                    cap,
                    self.janela_max,
                    self.janela_max + 2
                );
            }
        }
        if self.forest.n_trees == 0 {
            bail!("forest.n_trees doit être positif");
        }
        if self.softmax.epochs == 0 || self.softmax.learning_rate <= 0.0 {
            bail!("Paramètres softmax invalides");
        }
        Ok(())
    }

    /// Longueur d'historique à partir de laquelle une prédiction est produite :
    /// une fenêtre complète plus au moins un exemple d'entraînement, et jamais
    /// moins que `janela_min + 1`.
    pub fn min_history(&self) -> usize {
        (self.janela_min + 1).max(self.janela_max + 2)
    }

    pub fn build_model(&self) -> Model {
        match self.model {
            ModelKind::Forest => Model::Forest(RandomForest::new(
                self.forest.n_trees,
                self.forest.max_depth,
                self.forest.min_samples_split,
                self.forest.trees_per_update,
                self.seed,
            )),
            ModelKind::Softmax => Model::Softmax(SoftmaxRegression::new(
                self.softmax.learning_rate,
                self.softmax.lambda,
                self.softmax.epochs,
            )),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {:?}", path))?;
        let config: PredictorConfig = serde_json::from_str(&json)
            .with_context(|| format!("JSON invalide dans {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Impossible d'écrire {:?}", path))?;
        Ok(())
    }
}
