//! Lecture des réponses de l'API de résultats, un document JSON par ligne.

use std::io::BufRead;

use anyhow::{Context, Result};
use serde::Deserialize;

use roulette_db::models::RawOutcome;

#[derive(Debug, Deserialize)]
struct Payload {
    data: PayloadData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadData {
    started_at: Option<String>,
    result: PayloadResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadResult {
    outcome: PayloadNumber,
    #[serde(default)]
    lucky_numbers_list: Vec<PayloadNumber>,
}

#[derive(Debug, Deserialize)]
struct PayloadNumber {
    number: Option<i64>,
}

pub fn parse_payload(json: &str) -> Result<RawOutcome> {
    let payload: Payload = serde_json::from_str(json).context("Réponse API invalide")?;
    let result = payload.data.result;
    Ok(RawOutcome {
        value: result.outcome.number,
        timestamp: payload.data.started_at,
        lucky_numbers: result
            .lucky_numbers_list
            .iter()
            .filter_map(|n| n.number)
            .collect(),
    })
}

/// Parse chaque ligne non vide ; l'erreur d'une ligne n'interrompt pas la lecture.
pub fn read_payloads(reader: impl BufRead) -> impl Iterator<Item = (usize, Result<RawOutcome>)> {
    reader
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
        .map(|(i, line)| {
            let raw = line
                .context("Lecture impossible")
                .and_then(|l| parse_payload(&l));
            (i + 1, raw)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_db::models::Outcome;

    const SAMPLE: &str = r#"{"data": {"startedAt": "2025-05-01T10:00:00.000Z", "result": {"outcome": {"number": 17}, "luckyNumbersList": [{"number": 4}, {"number": 22}]}}}"#;

    #[test]
    fn test_parse_payload() {
        let raw = parse_payload(SAMPLE).unwrap();
        assert_eq!(raw.value, Some(17));
        assert_eq!(raw.timestamp.as_deref(), Some("2025-05-01T10:00:00.000Z"));
        assert_eq!(raw.lucky_numbers, vec![4, 22]);
        let outcome = Outcome::try_from_raw(&raw).unwrap();
        assert_eq!(outcome.value, 17);
    }

    #[test]
    fn test_null_number_is_rejected_later() {
        let raw = parse_payload(
            r#"{"data": {"startedAt": "t1", "result": {"outcome": {"number": null}}}}"#,
        )
        .unwrap();
        assert_eq!(raw.value, None);
        assert!(raw.lucky_numbers.is_empty());
        assert!(Outcome::try_from_raw(&raw).is_err());
    }

    #[test]
    fn test_missing_fields_error() {
        assert!(parse_payload(r#"{"data": {}}"#).is_err());
        assert!(parse_payload("pas du json").is_err());
    }

    #[test]
    fn test_read_payloads_continues_after_bad_line() {
        let input = format!("{SAMPLE}\n\n{{broken\n{SAMPLE}\n");
        let results: Vec<(usize, Result<RawOutcome>)> = read_payloads(input.as_bytes()).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, 3);
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());
    }
}
