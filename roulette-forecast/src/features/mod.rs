pub mod compute;

use roulette_db::models::is_valid_value;

use crate::frequency::FrequencyTable;

pub const FEATURES_PER_ELEMENT: usize = 10;

/// Longueur du vecteur pour une fenêtre de `window_len` éléments.
pub fn vector_len(window_len: usize) -> usize {
    FEATURES_PER_ELEMENT * window_len
}

/// Vecteur de la fenêtre complète (plus ancien en tête), 10 valeurs par élément.
pub fn build(window: &[u8], freq: &FrequencyTable) -> Vec<f64> {
    compute::window_features(window, freq)
}

#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    /// Index du label de chaque exemple dans l'historique.
    pub indices: Vec<usize>,
    pub skipped: usize,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Exemples dont le label est à l'index `start` ou au-delà.
    pub fn since(&self, start: usize) -> (&[Vec<f64>], &[u8]) {
        let from = self.indices.partition_point(|&i| i < start);
        (&self.features[from..], &self.labels[from..])
    }
}

/// Un exemple par index `i` dans `window..=len-2` : fenêtre `values[i-window..i]`,
/// label `values[i]`, fréquences sur `values[..i]` (le label n'y figure pas).
/// Les exemples contenant une valeur hors limites sont écartés.
pub fn build_training_set(values: &[u8], window: usize) -> TrainingSet {
    let mut set = TrainingSet::default();
    if window == 0 || values.len() < window + 2 {
        return set;
    }

    let mut freq = FrequencyTable::count(&values[..window]);
    for i in window..values.len() - 1 {
        let slice = &values[i - window..i];
        let label = values[i];
        if is_valid_value(label) && slice.iter().all(|&v| is_valid_value(v)) {
            set.features.push(build(slice, &freq));
            set.labels.push(label);
            set.indices.push(i);
        } else {
            set.skipped += 1;
        }
        freq.push(label);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_history;

    #[test]
    fn test_vector_len_constant() {
        let history = make_test_history(80);
        let freq = FrequencyTable::count(&history);
        for start in [0, 5, 20, 44] {
            let v = build(&history[start..start + 36], &freq);
            assert_eq!(v.len(), 360);
            assert_eq!(v.len(), vector_len(36));
        }
    }

    #[test]
    fn test_training_set_indices() {
        let history = make_test_history(40);
        let set = build_training_set(&history, 36);
        // i = 36, 37, 38
        assert_eq!(set.len(), 3);
        assert_eq!(set.labels, vec![history[36], history[37], history[38]]);
        assert!(set.features.iter().all(|f| f.len() == 360));
    }

    #[test]
    fn test_training_set_too_short() {
        let history = make_test_history(37);
        assert!(build_training_set(&history, 36).is_empty());
    }

    #[test]
    fn test_training_set_skips_corrupt_values() {
        let mut history = make_test_history(20);
        history[12] = 99;
        let set = build_training_set(&history, 4);
        assert!(!set.labels.contains(&99));
        // 99 est label en i=12 et dans les fenêtres i=13..=16
        assert_eq!(set.skipped, 5);
        assert_eq!(set.len() + set.skipped, 20 - 4 - 1);
    }

    #[test]
    fn test_since_selects_tail() {
        let history = make_test_history(45);
        let set = build_training_set(&history, 36);
        assert_eq!(set.indices, (36..44).collect::<Vec<_>>());
        let (features, labels) = set.since(42);
        assert_eq!(labels, &[history[42], history[43]]);
        assert_eq!(features.len(), 2);
        assert!(set.since(100).1.is_empty());
    }

    #[test]
    fn test_training_frequency_excludes_label() {
        let history = vec![1, 2, 3, 4, 5, 6];
        let set = build_training_set(&history, 2);
        // premier exemple : i=2, fréquences sur [1, 2], label 3
        let first = &set.features[0];
        // freq_norm de l'élément 0 (valeur 1) = 1/2
        assert!((first[6] - 0.5).abs() < 1e-12);
    }
}
