use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::models::{Color, Outcome};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS outcomes (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT NOT NULL UNIQUE,
    value         INTEGER NOT NULL CHECK (value BETWEEN 0 AND 36),
    lucky_numbers TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS seen_timestamps (
    timestamp TEXT PRIMARY KEY
);

INSERT OR IGNORE INTO seen_timestamps (timestamp) SELECT timestamp FROM outcomes;
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("roulette.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

/// Idempotent par horodatage : retourne `false` si le résultat a déjà été vu,
/// y compris s'il a été purgé depuis.
pub fn insert_outcome(conn: &Connection, outcome: &Outcome) -> Result<bool> {
    let seen: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM seen_timestamps WHERE timestamp = ?1)",
        [&outcome.timestamp],
        |row| row.get(0),
    )?;
    if seen {
        return Ok(false);
    }
    let changed = conn.execute(
        "INSERT OR IGNORE INTO outcomes (timestamp, value, lucky_numbers) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            outcome.timestamp,
            outcome.value,
            join_lucky(&outcome.lucky_numbers),
        ],
    ).context("Échec de l'insertion")?;
    conn.execute(
        "INSERT OR IGNORE INTO seen_timestamps (timestamp) VALUES (?1)",
        [&outcome.timestamp],
    )?;
    Ok(changed > 0)
}

/// Les `limit` derniers résultats, du plus ancien au plus récent.
pub fn fetch_last_outcomes(conn: &Connection, limit: u32) -> Result<Vec<Outcome>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, value, lucky_numbers FROM outcomes ORDER BY id DESC LIMIT ?1"
    )?;
    let mut outcomes = stmt.query_map([limit], |row| {
        let value: u8 = row.get(1)?;
        let lucky: String = row.get(2)?;
        Ok(Outcome {
            timestamp: row.get(0)?,
            value,
            color: Color::of(value),
            lucky_numbers: split_lucky(&lucky),
        })
    })?.collect::<Result<Vec<_>, _>>()?;
    outcomes.reverse();
    Ok(outcomes)
}

pub fn count_outcomes(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get(0))?;
    Ok(count)
}

/// Supprime les plus anciens résultats au-delà de `cap`. Retourne le nombre supprimé.
/// Les horodatages purgés restent dans `seen_timestamps`.
pub fn prune_to(conn: &Connection, cap: u32) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM outcomes WHERE id NOT IN (SELECT id FROM outcomes ORDER BY id DESC LIMIT ?1)",
        [cap],
    ).context("Échec de la purge")?;
    if removed > 0 {
        log::debug!("{removed} résultats anciens purgés (plafond {cap})");
    }
    Ok(removed)
}

fn join_lucky(numbers: &[u8]) -> String {
    numbers.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
}

fn split_lucky(s: &str) -> Vec<u8> {
    s.split(',')
        .filter_map(|p| p.trim().parse::<u8>().ok())
        .collect()
}
