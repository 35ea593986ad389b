use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use roulette_db::rusqlite::Connection;
use std::path::Path;

use roulette_db::db::insert_outcome;
use roulette_db::log_file::read_log;
use roulette_db::models::{Outcome, RawOutcome};

#[derive(Debug, Default)]
pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// Colonnes `numero` (obligatoire) et `timestamp` (facultative). Sans horodatage,
/// l'identifiant `csv-<fichier>-<ligne>` rend le réimport du même fichier sans effet.
fn parse_record(source: &str, headers: &csv::StringRecord, record: &csv::StringRecord) -> Result<RawOutcome> {
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let value = match column("numero") {
        Some(s) => Some(
            s.parse::<i64>()
                .with_context(|| format!("Impossible de parser le numéro '{}'", s))?,
        ),
        None => None,
    };

    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let timestamp = column("timestamp")
        .map(str::to_string)
        .unwrap_or_else(|| format!("csv-{source}-{line}"));

    Ok(RawOutcome {
        value,
        timestamp: Some(timestamp),
        lucky_numbers: Vec::new(),
    })
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

pub fn import_csv(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
    let headers = reader.headers().context("En-tête CSV illisible")?.clone();
    let source = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "import".to_string());
    let records: Vec<_> = reader.records().collect();

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    let pb = progress_bar(records.len() as u64)?;
    let mut result = ImportResult::default();

    for record_result in records {
        result.total_records += 1;
        pb.inc(1);
        let outcome = record_result
            .context("Ligne illisible")
            .and_then(|record| parse_record(&source, &headers, &record))
            .and_then(|raw| Outcome::try_from_raw(&raw));
        match outcome {
            Ok(outcome) => store(&tx, &outcome, &mut result),
            Err(e) => {
                log::warn!("Ligne {} ignorée : {:#}", result.total_records, e);
                result.errors += 1;
            }
        }
    }

    pb.finish_and_clear();
    tx.commit().context("Échec du commit")?;
    Ok(result)
}

/// Import d'un journal texte (`<numéro> | <chanceux> | <horodatage>`).
pub fn import_log(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let contents = read_log(path)?;
    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    let mut result = ImportResult {
        total_records: (contents.outcomes.len() + contents.skipped) as u32,
        errors: contents.skipped as u32,
        ..ImportResult::default()
    };
    for outcome in &contents.outcomes {
        store(&tx, outcome, &mut result);
    }
    tx.commit().context("Échec du commit")?;
    Ok(result)
}

fn store(conn: &Connection, outcome: &Outcome, result: &mut ImportResult) {
    match insert_outcome(conn, outcome) {
        Ok(true) => result.inserted += 1,
        Ok(false) => result.skipped += 1,
        Err(e) => {
            log::warn!("Erreur insertion {}: {:#}", outcome.timestamp, e);
            result.errors += 1;
        }
    }
}
