use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL, Cell, Color as CellColor};

use crate::import::ImportResult;
use roulette_db::models::{Color, Outcome};
use roulette_forecast::hits::HitTracker;
use roulette_forecast::predictor::Prediction;

fn cell_color(color: Color) -> CellColor {
    match color {
        Color::Red => CellColor::Red,
        Color::Black => CellColor::White,
        Color::Green => CellColor::Green,
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn display_outcomes(outcomes: &[Outcome]) {
    if outcomes.is_empty() {
        println!("Aucun résultat à afficher.");
        return;
    }

    let mut table = new_table(vec!["Horodatage", "Numéro", "Couleur", "Chanceux"]);
    for outcome in outcomes {
        let lucky = if outcome.lucky_numbers.is_empty() {
            "—".to_string()
        } else {
            outcome
                .lucky_numbers
                .iter()
                .map(|n| format!("{:2}", n))
                .collect::<Vec<_>>()
                .join(" - ")
        };
        table.add_row(vec![
            Cell::new(&outcome.timestamp),
            Cell::new(format!("{:2}", outcome.value)),
            Cell::new(outcome.color.to_string()).fg(cell_color(outcome.color)),
            Cell::new(lucky),
        ]);
    }
    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Total lignes lues : {}", result.total_records);
    println!("  Insérés           : {}", result.inserted);
    println!("  Doublons ignorés  : {}", result.skipped);
    if result.errors > 0 {
        println!("  Erreurs           : {}", result.errors);
    }
}

pub fn display_frequencies(top: &[(u8, u32)], total: u32, window: u32) {
    println!("\n📊 Numéros les plus fréquents sur les {} derniers résultats\n", window);

    let mut table = new_table(vec!["Numéro", "Couleur", "Fréquence", "Part"]);
    for &(value, count) in top {
        let color = Color::of(value);
        let share = if total > 0 { count as f64 / total as f64 } else { 0.0 };
        table.add_row(vec![
            Cell::new(format!("{:2}", value)),
            Cell::new(color.to_string()).fg(cell_color(color)),
            Cell::new(count.to_string()),
            Cell::new(format!("{:.2} %", share * 100.0)),
        ]);
    }
    println!("{table}");
}

pub fn display_prediction(prediction: &Prediction, history_len: usize, model_name: &str) {
    if prediction.is_empty() {
        println!("Pas encore de prédiction ({} résultats en base).", history_len);
        return;
    }

    println!("\n🎯 Prochains numéros probables ({model_name}, {history_len} résultats)\n");
    println!("{}", prediction_table(prediction));
    if prediction.candidates.iter().any(|c| c.backfilled) {
        println!("* sous le seuil de probabilité, ajouté pour compléter la liste");
    }
    println!("Coluna : {}   Linha : {}", prediction.coluna, prediction.linha);
}

fn prediction_table(prediction: &Prediction) -> Table {
    let mut table = new_table(vec![
        "#", "Numéro", "Probabilité", "Couleur", "Colonne", "Ligne", "Moitié", "Voisins",
    ]);
    for (i, c) in prediction.candidates.iter().enumerate() {
        let probability = if c.backfilled {
            format!("{:.4} *", c.probability)
        } else {
            format!("{:.4}", c.probability)
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(format!("{:2}", c.value)),
            Cell::new(probability),
            Cell::new(c.color.to_string()).fg(cell_color(c.color)),
            Cell::new(c.column),
            Cell::new(c.row),
            Cell::new(c.range().to_string()),
            Cell::new(format!("{} / {}", c.neighbor_before, c.neighbor_after)),
        ]);
    }
    table
}

pub fn display_hits(tracker: &HitTracker) {
    println!(
        "\n✅ Acertos : {:.1} % sur {} prédictions évaluées\n",
        tracker.hit_rate() * 100.0,
        tracker.checked()
    );

    let mut table = new_table(vec!["Horodatage", "Numéro", "Rang"]);
    for hit in tracker.hits() {
        table.add_row(vec![
            Cell::new(&hit.timestamp),
            Cell::new(format!("{:2}", hit.value)),
            Cell::new(hit.rank + 1),
        ]);
    }
    println!("{table}");
}
