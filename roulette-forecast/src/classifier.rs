use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{ClassModel, Model, N_CLASSES};

/// Classe candidate avec sa probabilité estimée.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ranked {
    pub value: u8,
    pub probability: f64,
    /// Ajoutée pour compléter le top-k, sous le seuil de probabilité.
    pub backfilled: bool,
}

/// Classifieur en ligne sur l'espace fixe des labels 0..=36.
///
/// Prédire avant tout entraînement retourne une liste vide ; un lot vide
/// est ignoré et l'état précédent est conservé.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineClassifier {
    model: Model,
    fitted: bool,
    n_features: Option<usize>,
}

impl OnlineClassifier {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            fitted: false,
            n_features: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Réentraînement complet. Retourne `false` si le lot était vide.
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<bool> {
        if features.is_empty() {
            log::debug!("Lot d'entraînement vide, entraînement ignoré");
            return Ok(false);
        }
        let n_features = features[0].len();
        if let Some(previous) = self.n_features {
            if previous != n_features {
                log::warn!("Dimension des features modifiée ({previous} -> {n_features}), réentraînement complet");
            }
        }
        self.model.fit(features, labels)?;
        self.fitted = true;
        self.n_features = Some(n_features);
        Ok(true)
    }

    /// Mise à jour incrémentale ; sur un classifieur vierge, équivaut à `fit`.
    pub fn update(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<bool> {
        if !self.fitted {
            return self.fit(features, labels);
        }
        if features.is_empty() {
            log::debug!("Aucun exemple nouveau, mise à jour ignorée");
            return Ok(false);
        }
        self.check_dimension(features[0].len())?;
        self.model.partial_fit(features, labels)?;
        Ok(true)
    }

    /// Distribution complète sur les 37 classes, `None` avant tout entraînement.
    pub fn probabilities(&self, features: &[f64]) -> Result<Option<Vec<f64>>> {
        if !self.fitted {
            return Ok(None);
        }
        self.check_dimension(features.len())?;
        if features.iter().any(|x| !x.is_finite()) {
            bail!("Feature non finie en entrée de prédiction");
        }
        let dist = self.model.predict_proba(features)?;
        if dist.len() != N_CLASSES || dist.iter().any(|p| !p.is_finite() || *p < 0.0) {
            bail!("Distribution invalide retournée par {}", self.model.name());
        }
        Ok(Some(dist))
    }

    /// Les `k` classes les plus probables (probabilité décroissante, puis valeur
    /// croissante). Les classes sous `prob_threshold` ne servent qu'à compléter.
    pub fn predict_topk(&self, features: &[f64], k: usize, prob_threshold: f64) -> Result<Vec<Ranked>> {
        let Some(dist) = self.probabilities(features)? else {
            return Ok(Vec::new());
        };
        Ok(rank_topk(&dist, k, prob_threshold))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Impossible d'écrire {:?}", path))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {:?}", path))?;
        let classifier: OnlineClassifier = serde_json::from_str(&json)
            .with_context(|| format!("Classifieur illisible dans {:?}", path))?;
        Ok(classifier)
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        match self.n_features {
            Some(expected) if expected != len => bail!(
                "Dimension des features incohérente : {} attendu, {} reçu",
                expected,
                len
            ),
            _ => Ok(()),
        }
    }
}

pub fn rank_topk(dist: &[f64], k: usize, prob_threshold: f64) -> Vec<Ranked> {
    let mut order: Vec<usize> = (0..dist.len()).collect();
    order.sort_by(|&a, &b| {
        dist[b]
            .partial_cmp(&dist[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let (primary, rest): (Vec<usize>, Vec<usize>) =
        order.into_iter().partition(|&c| dist[c] >= prob_threshold);

    let k = k.min(dist.len());
    primary
        .into_iter()
        .map(|c| (c, false))
        .chain(rest.into_iter().map(|c| (c, true)))
        .take(k)
        .map(|(c, backfilled)| Ranked {
            value: c as u8,
            probability: dist[c],
            backfilled,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{uniform, RandomForest, SoftmaxRegression};

    fn small_set() -> (Vec<Vec<f64>>, Vec<u8>) {
        let features = (0..12).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels = (0..12).map(|i| (i % 4) as u8 * 9).collect();
        (features, labels)
    }

    fn forest() -> OnlineClassifier {
        OnlineClassifier::new(Model::Forest(RandomForest::new(10, 4, 2, 3, 42)))
    }

    #[test]
    fn test_unfitted_returns_empty() {
        let classifier = forest();
        assert!(!classifier.is_fitted());
        assert!(classifier.predict_topk(&[1.0, 2.0], 4, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_fit_is_noop() {
        let mut classifier = forest();
        assert!(!classifier.fit(&[], &[]).unwrap());
        assert!(!classifier.is_fitted());

        let (features, labels) = small_set();
        classifier.fit(&features, &labels).unwrap();
        let before = classifier.predict_topk(&[3.0, 0.0], 5, 0.0).unwrap();
        assert!(!classifier.fit(&[], &[]).unwrap());
        assert!(!classifier.update(&[], &[]).unwrap());
        assert!(classifier.is_fitted());
        assert_eq!(classifier.predict_topk(&[3.0, 0.0], 5, 0.0).unwrap(), before);
    }

    #[test]
    fn test_topk_exact_length_after_fit() {
        let mut classifier = forest();
        let (features, labels) = small_set();
        classifier.fit(&features, &labels).unwrap();
        for k in [1, 4, 6, 8, 37] {
            let ranked = classifier.predict_topk(&[5.0, 2.0], k, 0.0).unwrap();
            assert_eq!(ranked.len(), k);
        }
        assert_eq!(classifier.predict_topk(&[5.0, 2.0], 50, 0.0).unwrap().len(), 37);
    }

    #[test]
    fn test_topk_distinct_and_sorted() {
        let mut classifier = OnlineClassifier::new(Model::Softmax(SoftmaxRegression::default()));
        let (features, labels) = small_set();
        classifier.fit(&features, &labels).unwrap();
        let ranked = classifier.predict_topk(&[1.0, 1.0], 8, 0.0).unwrap();
        let mut values: Vec<u8> = ranked.iter().map(|r| r.value).collect();
        for pair in ranked.windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
        values.sort();
        values.dedup();
        assert_eq!(values.len(), 8);
    }

    #[test]
    fn test_rank_tie_break_by_value() {
        let ranked = rank_topk(&uniform(), 4, 0.0);
        let values: Vec<u8> = ranked.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_threshold_backfill() {
        let mut dist = vec![0.0; N_CLASSES];
        dist[7] = 0.6;
        dist[3] = 0.3;
        dist[20] = 0.06;
        dist[11] = 0.04;
        let ranked = rank_topk(&dist, 4, 0.1);
        let values: Vec<u8> = ranked.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![7, 3, 20, 11]);
        assert!(!ranked[1].backfilled);
        assert!(ranked[2].backfilled);
        assert!(ranked[3].backfilled);
    }

    #[test]
    fn test_threshold_backfill_with_zero_mass() {
        let mut dist = vec![0.0; N_CLASSES];
        dist[36] = 1.0;
        let ranked = rank_topk(&dist, 3, 0.05);
        let values: Vec<u8> = ranked.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![36, 0, 1]);
    }

    #[test]
    fn test_dimension_mismatch_errors() {
        let mut classifier = forest();
        let (features, labels) = small_set();
        classifier.fit(&features, &labels).unwrap();
        assert!(classifier.predict_topk(&[1.0, 2.0, 3.0], 4, 0.0).is_err());
        assert!(classifier.update(&[vec![1.0]], &[1]).is_err());
    }

    #[test]
    fn test_update_on_unfitted_fits() {
        let mut classifier = forest();
        let (features, labels) = small_set();
        assert!(classifier.update(&features, &labels).unwrap());
        assert!(classifier.is_fitted());
        assert_eq!(classifier.n_features(), Some(2));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("roulette-classifier-{}.json", std::process::id()));
        let mut classifier = forest();
        let (features, labels) = small_set();
        classifier.fit(&features, &labels).unwrap();
        classifier.save(&path).unwrap();

        let restored = OnlineClassifier::load(&path).unwrap();
        assert!(restored.is_fitted());
        assert_eq!(restored.model_name(), "RandomForest");
        let a = restored.predict_topk(&[4.0, 1.0], 6, 0.0).unwrap();
        let b = classifier.predict_topk(&[4.0, 1.0], 6, 0.0).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.value, y.value);
            assert!((x.probability - y.probability).abs() < 1e-9);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_errors() {
        let path = std::env::temp_dir().join("roulette-classifier-does-not-exist.json");
        assert!(OnlineClassifier::load(&path).is_err());
    }
}
