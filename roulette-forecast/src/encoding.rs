//! Attributs dérivés d'une valeur de la roue. Fonctions pures, domaine 0..=36.

use roulette_db::models::Color;

const WHEEL_SIZE: u8 = 37;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    Baixo,
    Alto,
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Range::Baixo => write!(f, "baixo"),
            Range::Alto => write!(f, "alto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    pub value: u8,
    pub parity: u8,
    pub mod3: u8,
    pub is_high: bool,
    pub color: Color,
    pub column: u8,
    pub row: u8,
    pub terminal: u8,
    pub neighbor_before: u8,
    pub neighbor_after: u8,
}

impl Encoded {
    pub fn range(&self) -> Range {
        if self.is_high { Range::Alto } else { Range::Baixo }
    }
}

pub fn encode(value: u8) -> Encoded {
    Encoded {
        value,
        parity: value % 2,
        mod3: value % 3,
        is_high: is_high(value),
        color: Color::of(value),
        column: column(value),
        row: row(value),
        terminal: value % 10,
        neighbor_before: neighbor_before(value),
        neighbor_after: neighbor_after(value),
    }
}

pub fn is_high(value: u8) -> bool {
    (19..=36).contains(&value)
}

pub fn column(value: u8) -> u8 {
    if value == 0 { 0 } else { (value - 1) % 3 + 1 }
}

pub fn row(value: u8) -> u8 {
    if value == 0 { 0 } else { (value - 1) / 3 + 1 }
}

pub fn neighbor_before(value: u8) -> u8 {
    (value + WHEEL_SIZE - 1) % WHEEL_SIZE
}

pub fn neighbor_after(value: u8) -> u8 {
    (value + 1) % WHEEL_SIZE
}

/// -1 pour le vert, 0 pour le noir, 1 pour le rouge.
pub fn color_signal(color: Color) -> f64 {
    match color {
        Color::Green => -1.0,
        Color::Black => 0.0,
        Color::Red => 1.0,
    }
}
