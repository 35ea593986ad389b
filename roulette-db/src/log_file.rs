//! Journal texte des résultats, une ligne par tirage :
//! `<numéro> | <chanceux,séparés,par,virgules> | <horodatage>`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::{Outcome, RawOutcome};

pub fn format_line(outcome: &Outcome) -> String {
    let lucky = outcome
        .lucky_numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{} | {} | {}", outcome.value, lucky, outcome.timestamp)
}

pub fn parse_line(line: &str) -> Result<RawOutcome> {
    let parts: Vec<&str> = line.splitn(3, '|').map(str::trim).collect();
    if parts.len() != 3 {
        bail!("Ligne mal formée : '{}'", line);
    }
    let value = match parts[0] {
        "" | "None" | "null" => None,
        s => Some(
            s.parse::<i64>()
                .with_context(|| format!("Numéro illisible : '{}'", s))?,
        ),
    };
    let lucky_numbers = parts[1]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().with_context(|| format!("Numéro chanceux illisible : '{}'", s)))
        .collect::<Result<Vec<_>>>()?;
    Ok(RawOutcome {
        value,
        timestamp: Some(parts[2].to_string()),
        lucky_numbers,
    })
}

pub fn append_log(path: &Path, outcomes: &[Outcome]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
    for outcome in outcomes {
        writeln!(file, "{}", format_line(outcome))?;
    }
    Ok(())
}

pub struct LogContents {
    pub outcomes: Vec<Outcome>,
    pub skipped: usize,
}

/// Lit le journal ; les lignes invalides sont ignorées et comptées.
pub fn read_log(path: &Path) -> Result<LogContents> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {:?}", path))?;
    let mut contents = LogContents {
        outcomes: Vec::new(),
        skipped: 0,
    };
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line).and_then(|raw| Outcome::try_from_raw(&raw)) {
            Ok(outcome) => contents.outcomes.push(outcome),
            Err(e) => {
                log::warn!("{:?} ligne {} ignorée : {}", path, i + 1, e);
                contents.skipped += 1;
            }
        }
    }
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let outcome = Outcome::new(17, "2025-05-01T10:00:00Z", vec![4, 22]).unwrap();
        assert_eq!(format_line(&outcome), "17 | 4,22 | 2025-05-01T10:00:00Z");
    }

    #[test]
    fn test_parse_line_without_lucky() {
        let raw = parse_line("0 |  | t1").unwrap();
        assert_eq!(raw.value, Some(0));
        assert!(raw.lucky_numbers.is_empty());
        assert_eq!(raw.timestamp.as_deref(), Some("t1"));
    }

    #[test]
    fn test_parse_line_null_value() {
        let raw = parse_line("None | 3 | t1").unwrap();
        assert_eq!(raw.value, None);
        assert!(Outcome::try_from_raw(&raw).is_err());
    }

    #[test]
    fn test_parse_line_malformed() {
        assert!(parse_line("17 ; 3 ; t1").is_err());
        assert!(parse_line("abc | | t1").is_err());
    }

    #[test]
    fn test_append_then_read() {
        let path = std::env::temp_dir().join(format!("roulette-log-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let outcomes = vec![
            Outcome::new(5, "t1", vec![]).unwrap(),
            Outcome::new(32, "t2", vec![1, 2, 3]).unwrap(),
        ];
        append_log(&path, &outcomes).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"99 | | t3\ngarbage\n")
            .unwrap();

        let contents = read_log(&path).unwrap();
        assert_eq!(contents.outcomes, outcomes);
        assert_eq!(contents.skipped, 2);

        std::fs::remove_file(&path).unwrap();
    }
}
