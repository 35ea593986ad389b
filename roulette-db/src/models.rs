use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Plus grande valeur de la roue (0 à 36 inclus).
pub const MAX_VALUE: u8 = 36;

/// Nombre de valeurs distinctes de la roue.
pub const N_VALUES: usize = MAX_VALUE as usize + 1;

pub const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl Color {
    pub fn of(value: u8) -> Self {
        if value == 0 {
            Color::Green
        } else if RED_NUMBERS.contains(&value) {
            Color::Red
        } else {
            Color::Black
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::Red => write!(f, "vermelho"),
            Color::Black => write!(f, "preto"),
            Color::Green => write!(f, "verde"),
        }
    }
}

/// Un résultat de roulette validé. Immuable une fois enregistré.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub value: u8,
    pub color: Color,
    pub timestamp: String,
    pub lucky_numbers: Vec<u8>,
}

/// Enregistrement brut tel que fourni par la collecte (API, saisie, fichier).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub value: Option<i64>,
    pub timestamp: Option<String>,
    pub lucky_numbers: Vec<i64>,
}

impl Outcome {
    /// Les numéros chanceux hors limites sont ignorés, comme dans `try_from_raw`.
    pub fn new(value: u8, timestamp: impl Into<String>, lucky_numbers: Vec<u8>) -> Result<Self> {
        validate_value(i64::from(value))?;
        let timestamp = timestamp.into();
        if timestamp.trim().is_empty() {
            bail!("Horodatage vide");
        }
        Ok(Self {
            value,
            color: Color::of(value),
            timestamp,
            lucky_numbers: valid_lucky_numbers(lucky_numbers.into_iter().map(i64::from)),
        })
    }

    /// Valide un enregistrement brut. Les numéros chanceux hors limites sont ignorés.
    pub fn try_from_raw(raw: &RawOutcome) -> Result<Self> {
        let value = raw.value.context("Valeur absente")?;
        let value = validate_value(value)?;
        let timestamp = raw
            .timestamp
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .context("Horodatage absent")?;
        let lucky_numbers = valid_lucky_numbers(raw.lucky_numbers.iter().copied());
        Ok(Self {
            value,
            color: Color::of(value),
            timestamp: timestamp.to_string(),
            lucky_numbers,
        })
    }

    /// Horodatage synthétique pour une saisie manuelle sans heure réelle.
    pub fn manual_timestamp() -> String {
        format!(
            "manual-{}",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
        )
    }
}

pub fn validate_value(value: i64) -> Result<u8> {
    if !(0..=i64::from(MAX_VALUE)).contains(&value) {
        bail!("Numéro {} hors limites (0-{})", value, MAX_VALUE);
    }
    Ok(value as u8)
}

fn valid_lucky_numbers(numbers: impl Iterator<Item = i64>) -> Vec<u8> {
    numbers
        .filter_map(|n| match validate_value(n) {
            Ok(v) => Some(v),
            Err(_) => {
                log::debug!("Numéro chanceux {} ignoré", n);
                None
            }
        })
        .collect()
}

pub fn is_valid_value(value: u8) -> bool {
    value <= MAX_VALUE
}
