use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use roulette_db::history::History;
use roulette_db::models::{is_valid_value, Color, Outcome};

use crate::classifier::{OnlineClassifier, Ranked};
use crate::config::{PredictorConfig, RetrainStrategy};
use crate::encoding::{encode, Range};
use crate::features::{self, build_training_set};
use crate::frequency::FrequencyTable;

/// Descripteurs d'un numéro prédit, pour l'affichage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub value: u8,
    pub probability: f64,
    pub backfilled: bool,
    pub color: Color,
    pub column: u8,
    pub row: u8,
    pub high: bool,
    pub terminal: u8,
    pub neighbor_before: u8,
    pub neighbor_after: u8,
}

impl Candidate {
    fn from_ranked(ranked: &Ranked) -> Self {
        let e = encode(ranked.value);
        Self {
            value: ranked.value,
            probability: ranked.probability,
            backfilled: ranked.backfilled,
            color: e.color,
            column: e.column,
            row: e.row,
            high: e.is_high,
            terminal: e.terminal,
            neighbor_before: e.neighbor_before,
            neighbor_after: e.neighbor_after,
        }
    }

    pub fn range(&self) -> Range {
        if self.high { Range::Alto } else { Range::Baixo }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub numeros: Vec<u8>,
    pub coluna: u8,
    pub linha: u8,
    pub candidates: Vec<Candidate>,
}

impl Prediction {
    /// Résultat neutre : pas assez de données ou échec du modèle.
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.numeros.is_empty()
    }

    pub fn from_ranked(ranked: &[Ranked]) -> Self {
        let candidates: Vec<Candidate> = ranked.iter().map(Candidate::from_ranked).collect();
        let nonzero = || candidates.iter().filter(|c| c.value != 0);
        Self {
            numeros: candidates.iter().map(|c| c.value).collect(),
            coluna: mode_first(nonzero().map(|c| c.column)),
            linha: mode_first(nonzero().map(|c| c.row)),
            candidates,
        }
    }

    /// Rang (0 = premier) de `value` parmi les numéros prédits.
    pub fn rank_of(&self, value: u8) -> Option<usize> {
        self.numeros.iter().position(|&v| v == value)
    }
}

/// Valeur la plus fréquente ; à égalité, la première rencontrée. 0 si vide.
fn mode_first(values: impl Iterator<Item = u8>) -> u8 {
    let mut counts: Vec<(u8, usize)> = Vec::new();
    for v in values {
        match counts.iter_mut().find(|(x, _)| *x == v) {
            Some((_, c)) => *c += 1,
            None => counts.push((v, 1)),
        }
    }
    let mut best: Option<(u8, usize)> = None;
    for &(v, c) in &counts {
        match best {
            Some((_, bc)) if c <= bc => {}
            _ => best = Some((v, c)),
        }
    }
    best.map(|(v, _)| v).unwrap_or(0)
}

/// Orchestre entraînement et prédiction sur l'historique complet.
pub struct SequencePredictor {
    config: PredictorConfig,
    classifier: OnlineClassifier,
    /// Fin de l'historique (fenêtre + label) du dernier exemple appris et sa
    /// position de fin, pour retrouver les exemples nouveaux en mode incrémental.
    trained_tail: Option<(usize, Vec<u8>)>,
}

impl SequencePredictor {
    pub fn new(config: PredictorConfig) -> Result<Self> {
        config.validate()?;
        let classifier = OnlineClassifier::new(config.build_model());
        Ok(Self {
            config,
            classifier,
            trained_tail: None,
        })
    }

    /// Recharge un classifieur persisté s'il existe et correspond au modèle configuré.
    pub fn with_classifier_file(config: PredictorConfig, path: &Path) -> Result<Self> {
        let mut predictor = Self::new(config)?;
        if !path.exists() {
            log::info!("Pas de classifieur persisté dans {:?}, démarrage à froid", path);
            return Ok(predictor);
        }
        match OnlineClassifier::load(path) {
            Ok(classifier) if classifier.model_name() == predictor.classifier.model_name() => {
                log::info!("Classifieur {} rechargé depuis {:?}", classifier.model_name(), path);
                predictor.classifier = classifier;
            }
            Ok(classifier) => log::warn!(
                "Classifieur persisté {} ignoré (modèle configuré : {})",
                classifier.model_name(),
                predictor.classifier.model_name()
            ),
            Err(e) => log::warn!("Classifieur persisté ignoré : {e:#}"),
        }
        Ok(predictor)
    }

    pub fn save_classifier(&self, path: &Path) -> Result<()> {
        self.classifier.save(path)
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn classifier(&self) -> &OnlineClassifier {
        &self.classifier
    }

    /// Ne retourne jamais d'erreur : un échec du modèle est journalisé et
    /// produit la prédiction neutre.
    pub fn predict_next(&mut self, history: &[u8]) -> Prediction {
        match self.try_predict_next(history) {
            Ok(prediction) => prediction,
            Err(e) => {
                log::warn!("Échec de la prédiction ({} résultats) : {e:#}", history.len());
                Prediction::neutral()
            }
        }
    }

    pub fn try_predict_next(&mut self, history: &[u8]) -> Result<Prediction> {
        let window = self.config.janela_max;
        if history.len() < self.config.min_history() {
            log::debug!(
                "Historique insuffisant : {} < {}",
                history.len(),
                self.config.min_history()
            );
            return Ok(Prediction::neutral());
        }

        self.train(history)?;

        let latest = &history[history.len() - window..];
        if !latest.iter().all(|&v| is_valid_value(v)) {
            log::warn!("Fenêtre récente corrompue, prédiction neutre");
            return Ok(Prediction::neutral());
        }
        let freq = FrequencyTable::count(history);
        let x = features::build(latest, &freq);
        let ranked = self
            .classifier
            .predict_topk(&x, self.config.top_k, self.config.prob_threshold)?;
        Ok(Prediction::from_ranked(&ranked))
    }

    fn train(&mut self, history: &[u8]) -> Result<()> {
        let window = self.config.janela_max;
        let set = build_training_set(history, window);
        if set.skipped > 0 {
            log::debug!("{} exemples écartés (valeurs hors limites)", set.skipped);
        }

        match self.config.strategy {
            RetrainStrategy::Full => {
                self.classifier.fit(&set.features, &set.labels)?;
            }
            RetrainStrategy::Incremental => match self.resume_index(history) {
                Some(start) if self.classifier.is_fitted() => {
                    let (features, labels) = set.since(start);
                    log::debug!("Mise à jour incrémentale : {} exemples nouveaux", labels.len());
                    self.classifier.update(features, labels)?;
                }
                _ => {
                    self.classifier.fit(&set.features, &set.labels)?;
                }
            },
        }

        // Le dernier label appris est history[len - 2]
        let end = history.len() - 1;
        self.trained_tail = Some((end, history[end.saturating_sub(window + 1)..end].to_vec()));
        Ok(())
    }

    /// Premier index de label non encore appris, `None` si la suite apprise
    /// n'est plus localisée sans ambiguïté (réentraînement complet).
    ///
    /// Sous le plafond, rien n'a pu être évincé : la suite doit se trouver à
    /// sa position d'origine. Au plafond, elle a reculé d'un nombre inconnu de
    /// positions et une seule correspondance est acceptée.
    fn resume_index(&self, history: &[u8]) -> Option<usize> {
        let (anchor, tail) = self.trained_tail.as_ref()?;
        let matches_at = |end: usize| {
            end >= tail.len() && end <= history.len() && history[end - tail.len()..end] == tail[..]
        };

        let at_cap = self
            .config
            .history_cap
            .is_some_and(|cap| history.len() >= cap);
        if !at_cap {
            return matches_at(*anchor).then_some(*anchor);
        }

        let mut found = (tail.len()..=(*anchor).min(history.len())).filter(|&end| matches_at(end));
        match (found.next(), found.next()) {
            (Some(end), None) => Some(end),
            _ => None,
        }
    }

    /// Cycle complet pour un nouveau résultat : ajout idempotent puis prédiction.
    /// `None` si le résultat était déjà connu.
    pub fn observe(&mut self, history: &mut History, outcome: Outcome) -> Option<Prediction> {
        if !history.append(outcome) {
            return None;
        }
        Some(self.predict_next(&history.values()))
    }
}
