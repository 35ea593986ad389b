use std::sync::{Arc, Mutex};

use crate::predictor::{Prediction, SequencePredictor};

/// Prédicteur partageable entre threads ; les appels sont sérialisés.
#[derive(Clone)]
pub struct SharedPredictor {
    inner: Arc<Mutex<SequencePredictor>>,
}

impl SharedPredictor {
    pub fn new(predictor: SequencePredictor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(predictor)),
        }
    }

    /// Verrou empoisonné : prédiction neutre.
    pub fn predict_next(&self, history: &[u8]) -> Prediction {
        match self.inner.lock() {
            Ok(mut predictor) => predictor.predict_next(history),
            Err(_) => {
                log::error!("Verrou du prédicteur empoisonné, prédiction neutre");
                Prediction::neutral()
            }
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SequencePredictor) -> R) -> Option<R> {
        match self.inner.lock() {
            Ok(mut predictor) => Some(f(&mut predictor)),
            Err(_) => {
                log::error!("Verrou du prédicteur empoisonné");
                None
            }
        }
    }
}
