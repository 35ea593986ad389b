use std::collections::BTreeMap;

use roulette_db::models::N_VALUES;

/// Comptage des apparitions de chaque valeur sur un préfixe de l'historique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: [u32; N_VALUES],
    total: u32,
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self {
            counts: [0; N_VALUES],
            total: 0,
        }
    }
}

impl FrequencyTable {
    /// Les valeurs hors limites sont ignorées.
    pub fn count(prefix: &[u8]) -> Self {
        let mut table = Self::default();
        for &v in prefix {
            table.push(v);
        }
        table
    }

    pub fn push(&mut self, value: u8) {
        if let Some(c) = self.counts.get_mut(value as usize) {
            *c += 1;
            self.total += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn count_of(&self, value: u8) -> u32 {
        self.counts.get(value as usize).copied().unwrap_or(0)
    }

    /// count/total, 0 si la table est vide.
    pub fn weight(&self, value: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count_of(value) as f64 / self.total as f64
    }

    pub fn normalize(&self) -> BTreeMap<u8, f64> {
        if self.total == 0 {
            return BTreeMap::new();
        }
        (0..N_VALUES as u8)
            .map(|v| (v, self.weight(v)))
            .collect()
    }

    /// Les `n` valeurs les plus fréquentes (à égalité, la plus petite valeur d'abord).
    pub fn top(&self, n: usize) -> Vec<(u8, u32)> {
        let mut entries: Vec<(u8, u32)> = (0..N_VALUES as u8)
            .map(|v| (v, self.count_of(v)))
            .filter(|&(_, c)| c > 0)
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}
