mod display;
mod import;
mod ingest;

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use roulette_db::db::{
    count_outcomes, db_path, fetch_last_outcomes, insert_outcome, migrate, open_db, prune_to,
};
use roulette_db::history::History;
use roulette_db::log_file::append_log;
use roulette_db::models::Outcome;
use roulette_db::rusqlite::Connection;
use roulette_forecast::config::{ModelKind, PredictorConfig, RetrainStrategy};
use roulette_forecast::frequency::FrequencyTable;
use roulette_forecast::hits::HitTracker;
use roulette_forecast::predictor::{Prediction, SequencePredictor};

use crate::display::{
    display_frequencies, display_hits, display_import_summary, display_outcomes,
    display_prediction,
};

/// Plafond d'historique quand ni le fichier de configuration ni les options n'en fixent.
const DEFAULT_HISTORY_CAP: usize = 500;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum ImportFormat {
    #[default]
    Csv,
    Log,
}

#[derive(Parser)]
#[command(name = "roulette", about = "Prédiction en ligne des résultats de roulette")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct PredictorArgs {
    /// Fichier de configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Nombre de numéros prédits
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Probabilité minimale avant complément
    #[arg(long)]
    threshold: Option<f64>,

    /// Nombre maximal de résultats conservés
    #[arg(long)]
    cap: Option<usize>,

    /// Stratégie de réentraînement
    #[arg(long)]
    strategy: Option<RetrainStrategy>,

    /// Modèle de classification
    #[arg(short, long)]
    model: Option<ModelKind>,

    /// Seed pour la reproductibilité
    #[arg(long)]
    seed: Option<u64>,

    /// Fichier du classifieur persisté (rechargé puis réécrit)
    #[arg(long)]
    classifier: Option<PathBuf>,
}

impl PredictorArgs {
    fn resolve(&self) -> Result<PredictorConfig> {
        let mut config = match &self.config {
            Some(path) => PredictorConfig::load(path)?,
            None => PredictorConfig::default(),
        };
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(threshold) = self.threshold {
            config.prob_threshold = threshold;
        }
        if let Some(cap) = self.cap {
            config.history_cap = Some(cap);
        }
        config.history_cap.get_or_insert(DEFAULT_HISTORY_CAP);
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }

    fn predictor(&self, config: PredictorConfig) -> Result<SequencePredictor> {
        match &self.classifier {
            Some(path) => SequencePredictor::with_classifier_file(config, path),
            None => SequencePredictor::new(config),
        }
    }

    fn save(&self, predictor: &SequencePredictor) -> Result<()> {
        if let Some(path) = &self.classifier {
            if predictor.classifier().is_fitted() {
                predictor.save_classifier(path)?;
                log::info!("Classifieur enregistré dans {:?}", path);
            }
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum Command {
    /// Importer des résultats depuis un fichier CSV (colonne `numero`) ou un journal texte
    Import {
        /// Chemin vers le fichier
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long, default_value = "csv")]
        format: ImportFormat,
    },

    /// Ingérer les réponses de l'API (JSON, une par ligne) et prédire après chacune
    Ingest {
        /// Fichier à lire (entrée standard par défaut)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Journal texte où ajouter chaque nouveau résultat
        #[arg(long, default_value = "data/historico.log")]
        log: PathBuf,

        #[command(flatten)]
        predictor: PredictorArgs,
    },

    /// Ajouter un résultat manuellement
    Add {
        /// Numéro tiré (0-36)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=36))]
        value: u8,

        /// Numéros chanceux (0-36), séparés par des virgules
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=36))]
        lucky: Vec<u8>,

        #[command(flatten)]
        predictor: PredictorArgs,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers résultats
    List {
        /// Nombre de résultats à afficher
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Numéros les plus fréquents
    Stats {
        /// Fenêtre d'analyse (nombre de résultats)
        #[arg(short, long, default_value = "100")]
        window: u32,

        /// Nombre de numéros affichés
        #[arg(short, long, default_value = "10")]
        top: usize,
    },

    /// Prédire le prochain résultat à partir de l'historique en base
    Predict {
        #[command(flatten)]
        predictor: PredictorArgs,
    },

    /// Rejouer l'historique en base et mesurer les acertos
    Hits {
        #[command(flatten)]
        predictor: PredictorArgs,
    },

    /// Afficher la configuration effective (JSON)
    Config {
        #[command(flatten)]
        predictor: PredictorArgs,

        /// Écrire la configuration dans ce fichier
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file, format } => cmd_import(&conn, &file, format),
        Command::Ingest { file, log, predictor } => cmd_ingest(&conn, file.as_deref(), &log, &predictor),
        Command::Add { value, lucky, predictor } => cmd_add(&conn, value, lucky, &predictor),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { last } => cmd_list(&conn, last),
        Command::Stats { window, top } => cmd_stats(&conn, window, top),
        Command::Predict { predictor } => cmd_predict(&conn, &predictor),
        Command::Hits { predictor } => cmd_hits(&conn, &predictor),
        Command::Config { predictor, save } => cmd_config(&predictor, save.as_deref()),
    }
}

fn cmd_import(conn: &Connection, file: &Path, format: ImportFormat) -> Result<()> {
    let result = match format {
        ImportFormat::Csv => import::import_csv(conn, file)?,
        ImportFormat::Log => import::import_log(conn, file)?,
    };
    display_import_summary(&result);
    Ok(())
}

fn cap_u32(config: &PredictorConfig) -> u32 {
    config
        .history_cap
        .map(|cap| u32::try_from(cap).unwrap_or(u32::MAX))
        .unwrap_or(u32::MAX)
}

fn load_history(conn: &Connection, config: &PredictorConfig) -> Result<History> {
    let outcomes = fetch_last_outcomes(conn, cap_u32(config))?;
    Ok(History::from_outcomes(outcomes, config.history_cap))
}

fn cmd_ingest(conn: &Connection, file: Option<&Path>, log_path: &Path, args: &PredictorArgs) -> Result<()> {
    let config = args.resolve()?;
    let cap = cap_u32(&config);
    let mut history = load_history(conn, &config)?;
    let mut predictor = args.predictor(config)?;
    let mut tracker = HitTracker::new();
    let mut prediction = predictor.predict_next(&history.values());
    tracker.set_pending(&prediction);

    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("Impossible d'ouvrir {:?}", path))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let (mut inserted, mut duplicates, mut rejected) = (0u32, 0u32, 0u32);
    for (line, raw) in ingest::read_payloads(reader) {
        let outcome = match raw.and_then(|raw| Outcome::try_from_raw(&raw)) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Ligne {} ignorée : {:#}", line, e);
                rejected += 1;
                continue;
            }
        };
        if !insert_outcome(conn, &outcome)? {
            log::debug!("Résultat {} déjà connu", outcome.timestamp);
            duplicates += 1;
            continue;
        }
        inserted += 1;
        prune_to(conn, cap)?;
        append_log(log_path, std::slice::from_ref(&outcome))?;

        let Some(next) = predictor.observe(&mut history, outcome.clone()) else {
            continue;
        };
        if let Some(hit) = tracker.record(&outcome, &next) {
            println!("✅ Acerto : {} (rang {})", hit.value, hit.rank + 1);
        }
        prediction = next;
    }

    args.save(&predictor)?;

    println!(
        "Ingestion terminée : {} nouveaux, {} doublons, {} rejetés",
        inserted, duplicates, rejected
    );
    if let Some(last) = history.last() {
        println!("Dernier résultat : {} ({})", last.value, last.timestamp);
    }
    display_prediction(&prediction, history.len(), predictor.classifier().model_name());
    if tracker.checked() > 0 {
        display_hits(&tracker);
    }
    Ok(())
}

fn cmd_add(conn: &Connection, value: u8, lucky: Vec<u8>, args: &PredictorArgs) -> Result<()> {
    let config = args.resolve()?;
    let outcome = Outcome::new(value, Outcome::manual_timestamp(), lucky)?;
    display_outcomes(std::slice::from_ref(&outcome));

    if insert_outcome(conn, &outcome)? {
        println!("Résultat inséré avec succès.");
    } else {
        println!("Ce résultat existe déjà (doublon ignoré).");
    }
    prune_to(conn, cap_u32(&config))?;

    let history = load_history(conn, &config)?;
    let mut predictor = args.predictor(config)?;
    let prediction = predictor.predict_next(&history.values());
    args.save(&predictor)?;
    display_prediction(&prediction, history.len(), predictor.classifier().model_name());
    Ok(())
}

fn cmd_list(conn: &Connection, last: u32) -> Result<()> {
    if count_outcomes(conn)? == 0 {
        println!("Base vide. Lancez d'abord : roulette import");
        return Ok(());
    }
    let outcomes = fetch_last_outcomes(conn, last)?;
    display_outcomes(&outcomes);
    Ok(())
}

fn cmd_stats(conn: &Connection, window: u32, top: usize) -> Result<()> {
    let n = count_outcomes(conn)?;
    if n == 0 {
        println!("Base vide. Lancez d'abord : roulette import");
        return Ok(());
    }
    let effective_window = window.min(n);
    let values: Vec<u8> = fetch_last_outcomes(conn, effective_window)?
        .iter()
        .map(|o| o.value)
        .collect();
    let freq = FrequencyTable::count(&values);
    display_frequencies(&freq.top(top), freq.total(), effective_window);
    Ok(())
}

fn cmd_predict(conn: &Connection, args: &PredictorArgs) -> Result<()> {
    let config = args.resolve()?;
    let history = load_history(conn, &config)?;
    let mut predictor = args.predictor(config)?;
    let prediction = predictor.try_predict_next(&history.values())?;
    args.save(&predictor)?;
    display_prediction(&prediction, history.len(), predictor.classifier().model_name());
    Ok(())
}

/// Rejoue les résultats en base un par un, comme s'ils arrivaient en direct.
fn replay(outcomes: Vec<Outcome>, predictor: &mut SequencePredictor, cap: Option<usize>) -> Result<(HitTracker, Prediction)> {
    let pb = ProgressBar::new(outcomes.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=> "),
    );

    let mut history = History::with_cap(cap);
    let mut tracker = HitTracker::new();
    let mut prediction = Prediction::neutral();
    for outcome in outcomes {
        pb.inc(1);
        if let Some(next) = predictor.observe(&mut history, outcome.clone()) {
            tracker.record(&outcome, &next);
            prediction = next;
        }
    }
    pb.finish_and_clear();
    Ok((tracker, prediction))
}

fn cmd_hits(conn: &Connection, args: &PredictorArgs) -> Result<()> {
    let config = args.resolve()?;
    let cap = config.history_cap;
    let outcomes = fetch_last_outcomes(conn, cap_u32(&config))?;
    if outcomes.is_empty() {
        println!("Base vide. Lancez d'abord : roulette import");
        return Ok(());
    }
    let n = outcomes.len();
    let mut predictor = args.predictor(config)?;
    let (tracker, prediction) = replay(outcomes, &mut predictor, cap)?;
    args.save(&predictor)?;
    display_hits(&tracker);
    display_prediction(&prediction, n, predictor.classifier().model_name());
    Ok(())
}

fn cmd_config(args: &PredictorArgs, save: Option<&Path>) -> Result<()> {
    let config = args.resolve()?;
    match save {
        Some(path) => {
            config.save(path)?;
            println!("Configuration enregistrée dans {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_forecast::config::ForestParams;
    use roulette_forecast::models::make_test_history;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_default_cap_applied() {
        let config = PredictorArgs::default().resolve().unwrap();
        assert_eq!(config.history_cap, Some(DEFAULT_HISTORY_CAP));
        assert_eq!(config.top_k, 6);
    }

    #[test]
    fn test_flags_override_config() {
        let Command::Predict { predictor } = parse(&[
            "roulette", "predict", "-k", "8", "--strategy", "incremental", "--model", "softmax", "--cap", "100",
        ]) else {
            panic!("sous-commande inattendue");
        };
        let config = predictor.resolve().unwrap();
        assert_eq!(config.top_k, 8);
        assert_eq!(config.strategy, RetrainStrategy::Incremental);
        assert_eq!(config.model, ModelKind::Softmax);
        assert_eq!(config.history_cap, Some(100));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let Command::Predict { predictor } = parse(&["roulette", "predict", "-k", "40"]) else {
            panic!("sous-commande inattendue");
        };
        assert!(predictor.resolve().is_err());
    }

    #[test]
    fn test_add_parses_lucky_list() {
        let Command::Add { value, lucky, .. } = parse(&["roulette", "add", "17", "--lucky", "4,22"]) else {
            panic!("sous-commande inattendue");
        };
        assert_eq!(value, 17);
        assert_eq!(lucky, vec![4, 22]);
    }

    #[test]
    fn test_add_rejects_out_of_range() {
        assert!(Cli::try_parse_from(["roulette", "add", "17", "--lucky", "4,40"]).is_err());
        assert!(Cli::try_parse_from(["roulette", "add", "37"]).is_err());
    }

    #[test]
    fn test_replay_cyclic_history() {
        let config = PredictorConfig {
            forest: ForestParams { n_trees: 10, max_depth: 5, ..ForestParams::default() },
            ..PredictorConfig::default()
        };
        let outcomes: Vec<Outcome> = make_test_history(42)
            .into_iter()
            .enumerate()
            .map(|(i, v)| Outcome::new(v, format!("t{i:03}"), vec![]).unwrap())
            .collect();
        let mut predictor = SequencePredictor::new(config).unwrap();
        let (tracker, prediction) = replay(outcomes, &mut predictor, None).unwrap();
        // prédictions émises à partir de 38 résultats : 4 évaluées
        assert_eq!(tracker.checked(), 4);
        assert_eq!(prediction.numeros.len(), 6);
    }

    #[test]
    fn test_reingest_after_prune_keeps_history() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let dir = std::env::temp_dir();
        let payloads = dir.join(format!("roulette-reingest-{}.jsonl", std::process::id()));
        let log_path = dir.join(format!("roulette-reingest-{}.log", std::process::id()));
        let lines: Vec<String> = (0..45)
            .map(|i| {
                format!(
                    r#"{{"data": {{"startedAt": "2025-05-01T10:{:02}:00Z", "result": {{"outcome": {{"number": {}}}}}}}}}"#,
                    i,
                    i % 37
                )
            })
            .collect();
        std::fs::write(&payloads, lines.join("\n")).unwrap();
        let _ = std::fs::remove_file(&log_path);
        let args = PredictorArgs {
            cap: Some(40),
            model: Some(ModelKind::Softmax),
            ..PredictorArgs::default()
        };
        let timestamps = |conn: &Connection| -> Vec<String> {
            fetch_last_outcomes(conn, 100).unwrap().into_iter().map(|o| o.timestamp).collect()
        };

        cmd_ingest(&conn, Some(payloads.as_path()), &log_path, &args).unwrap();
        let first = timestamps(&conn);
        assert_eq!(first.len(), 40);
        assert_eq!(first[0], "2025-05-01T10:05:00Z");
        assert_eq!(first[39], "2025-05-01T10:44:00Z");

        cmd_ingest(&conn, Some(payloads.as_path()), &log_path, &args).unwrap();
        assert_eq!(timestamps(&conn), first);
        let logged = roulette_db::log_file::read_log(&log_path).unwrap();
        assert_eq!(logged.outcomes.len(), 45);

        std::fs::remove_file(&payloads).unwrap();
        std::fs::remove_file(&log_path).unwrap();
    }

    #[test]
    fn test_ingest_pipeline_in_memory() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let payload = r#"{"data": {"startedAt": "t1", "result": {"outcome": {"number": 9}, "luckyNumbersList": []}}}"#;
        let raw = ingest::parse_payload(payload).unwrap();
        let outcome = Outcome::try_from_raw(&raw).unwrap();
        assert!(insert_outcome(&conn, &outcome).unwrap());
        assert!(!insert_outcome(&conn, &outcome).unwrap());
        let history = load_history(&conn, &PredictorConfig::default()).unwrap();
        assert_eq!(history.values(), vec![9]);
    }
}
