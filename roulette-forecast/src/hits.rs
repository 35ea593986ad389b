use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use roulette_db::models::Outcome;

use crate::predictor::Prediction;

pub const MAX_HITS: usize = 50;

/// Résultat tombé parmi les numéros prédits juste avant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub value: u8,
    pub timestamp: String,
    /// Position dans la liste prédite (0 = premier).
    pub rank: usize,
}

/// Confronte chaque nouveau résultat à la dernière prédiction émise.
#[derive(Debug, Clone, Default)]
pub struct HitTracker {
    pending: Option<Prediction>,
    hits: VecDeque<Hit>,
    checked: usize,
    total_hits: usize,
}

impl HitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Une prédiction vide n'est pas évaluée.
    pub fn set_pending(&mut self, prediction: &Prediction) {
        self.pending = if prediction.is_empty() { None } else { Some(prediction.clone()) };
    }

    pub fn pending(&self) -> Option<&Prediction> {
        self.pending.as_ref()
    }

    /// Évalue `outcome` contre la prédiction en attente, qui est consommée.
    pub fn check(&mut self, outcome: &Outcome) -> Option<Hit> {
        let pending = self.pending.take()?;
        self.checked += 1;
        let rank = pending.rank_of(outcome.value)?;
        let hit = Hit {
            value: outcome.value,
            timestamp: outcome.timestamp.clone(),
            rank,
        };
        log::info!("Acerto : {} (rang {})", hit.value, hit.rank + 1);
        self.total_hits += 1;
        self.hits.push_front(hit.clone());
        self.hits.truncate(MAX_HITS);
        Some(hit)
    }

    /// Évalue `outcome` puis arme la prédiction suivante.
    pub fn record(&mut self, outcome: &Outcome, next: &Prediction) -> Option<Hit> {
        let hit = self.check(outcome);
        self.set_pending(next);
        hit
    }

    /// Les derniers acertos, du plus récent au plus ancien.
    pub fn hits(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }

    pub fn checked(&self) -> usize {
        self.checked
    }

    pub fn hit_rate(&self) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            self.total_hits as f64 / self.checked as f64
        }
    }
}
