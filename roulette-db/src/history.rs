use std::collections::{HashSet, VecDeque};

use crate::models::Outcome;

/// Historique ordonné par insertion, sans doublon d'horodatage.
///
/// Avec un plafond, les entrées les plus anciennes sont évincées en premier.
/// Un horodatage évincé reste connu : le réinsérer est sans effet.
#[derive(Debug, Clone, Default)]
pub struct History {
    outcomes: VecDeque<Outcome>,
    seen: HashSet<String>,
    cap: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cap(cap: Option<usize>) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    /// Construit un historique à partir d'entrées déjà ordonnées (plus ancienne en tête).
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = Outcome>, cap: Option<usize>) -> Self {
        let mut history = Self::with_cap(cap);
        for outcome in outcomes {
            history.append(outcome);
        }
        history
    }

    /// Retourne `false` si l'horodatage a déjà été vu (aucun changement).
    pub fn append(&mut self, outcome: Outcome) -> bool {
        if self.seen.contains(&outcome.timestamp) {
            return false;
        }
        self.seen.insert(outcome.timestamp.clone());
        self.outcomes.push_back(outcome);
        self.enforce_cap();
        true
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn last(&self) -> Option<&Outcome> {
        self.outcomes.back()
    }

    /// Valeurs seules, plus ancienne en tête.
    pub fn values(&self) -> Vec<u8> {
        self.outcomes.iter().map(|o| o.value).collect()
    }

    fn enforce_cap(&mut self) {
        let Some(cap) = self.cap else {
            return;
        };
        let excess = self.outcomes.len().saturating_sub(cap);
        self.outcomes.drain(..excess);
    }
}
