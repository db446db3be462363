use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use kenostat_db::models::{Round, Trend, BOARD_COLUMNS, BOARD_ROWS};
use kenostat_engine::comparison::backtest::BacktestReport;
use kenostat_engine::comparison::lookahead::{CompletionStats, LookaheadOptions, MethodCompletion};
use kenostat_engine::comparison::optimize::{BuildupCandidate, MomentumCandidate, SweepResult};
use kenostat_engine::comparison::LeaderboardEntry;
use kenostat_engine::generators::shapes::number_at;
use kenostat_engine::generators::StrategyKind;
use kenostat_engine::patterns::buildup::Buildup;
use kenostat_engine::patterns::{PatternReport, SortMode};
use kenostat_engine::stats::NumberOverview;

use crate::import::ImportResult;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn join_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:2}", n))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn display_rounds(rounds: &[Round], first_index: usize) {
    if rounds.is_empty() {
        println!("Aucune partie à afficher.");
        return;
    }

    let mut table = new_table(vec!["#", "Date", "Tirés", "Sélection", "Trouvés", "Gain"]);
    for (i, round) in rounds.iter().enumerate() {
        let gain = match round.payout() {
            Some(p) if p.payout > 0.0 => format!("x{:.2}", p.payout),
            _ => "—".to_string(),
        };
        table.add_row(vec![
            (first_index + i).to_string(),
            round.time().format("%Y-%m-%d %H:%M:%S").to_string(),
            join_numbers(round.drawn()),
            join_numbers(round.selected()),
            round.hits().len().to_string(),
            gain,
        ]);
    }
    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Entrées lues      : {}", result.total_records);
    println!("  Parties ajoutées  : {}", result.inserted);
    if result.errors > 0 {
        println!("  Entrées ignorées  : {}", result.errors);
    }
}

pub fn display_stats(overview: &[NumberOverview], window: usize) {
    println!("\n📊 Statistiques sur les {} dernières parties\n", window);

    let mut table = new_table(vec!["Numéro", "Fréquence", "Retard", "Tendance"]);
    let mut sorted = overview.to_vec();
    sorted.sort_by(|a, b| b.stats.frequency.cmp(&a.stats.frequency));

    for entry in &sorted {
        let color = match entry.trend {
            Trend::Up => Color::Green,
            Trend::Down => Color::Red,
            Trend::Neutral => Color::White,
        };
        table.add_row(vec![
            Cell::new(format!("{:2}", entry.stats.number)),
            Cell::new(entry.stats.frequency),
            Cell::new(entry.stats.gap),
            Cell::new(entry.trend.to_string()).fg(color),
        ]);
    }
    println!("{table}");
}

/// Plateau 8x5, numéros choisis mis en évidence.
pub fn display_board(picks: &[u8]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    for row in 0..BOARD_ROWS {
        let cells: Vec<Cell> = (0..BOARD_COLUMNS)
            .map(|col| {
                let n = number_at(row, col);
                if picks.contains(&n) {
                    Cell::new(format!("{:2}", n)).fg(Color::Green)
                } else {
                    Cell::new(format!("{:2}", n)).fg(Color::DarkGrey)
                }
            })
            .collect();
        table.add_row(cells);
    }
    println!("{table}");
}

pub fn display_prediction(method: StrategyKind, picks: &[u8], delegate: Option<StrategyKind>) {
    match delegate {
        Some(d) if method == StrategyKind::Auto => {
            println!("\n🎯 Prédiction {} (délégué : {})\n", method, d)
        }
        _ => println!("\n🎯 Prédiction {}\n", method),
    }
    if picks.is_empty() {
        println!("Aucun numéro proposé.");
        return;
    }
    println!("  {}\n", join_numbers(picks));
    display_board(picks);
}

pub fn display_patterns(report: &PatternReport, k: usize, mode: SortMode) {
    println!(
        "\n🔗 Combinaisons de {} numéros ({} parties, tri {:?})\n",
        k, report.stats.sample_size, mode
    );
    if report.patterns.is_empty() {
        println!("Aucune combinaison (historique insuffisant ou taille invalide).");
        return;
    }

    let mut table = new_table(vec!["#", "Numéros", "Sorties", "Dernière", "Score hot"]);
    for (i, pattern) in report.patterns.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            join_numbers(&pattern.numbers),
            pattern.count().to_string(),
            pattern.last_seen().map(|i| i.to_string()).unwrap_or_default(),
            format!("{:.3}", pattern.hot_score),
        ]);
    }
    println!("{table}");
    println!(
        "{} combinaison(s) distincte(s), {:.2} sortie(s) en moyenne",
        report.stats.total_combinations, report.stats.average_occurrences
    );
}

pub fn display_buildups(buildups: &[Buildup]) {
    if buildups.is_empty() {
        println!("Aucune montée en charge détectée.");
        return;
    }
    let mut table = new_table(vec!["Numéros", "Partielles", "Taux", "Dernière complète"]);
    for b in buildups {
        table.add_row(vec![
            join_numbers(&b.numbers),
            b.partial_hits.len().to_string(),
            format!("{:.1} %", b.hit_rate * 100.0),
            b.last_full_hit
                .map(|ago| format!("il y a {ago} partie(s)"))
                .unwrap_or_else(|| "jamais".to_string()),
        ]);
    }
    println!("{table}");
}

pub fn display_leaderboard(entries: &[LeaderboardEntry]) {
    let mut table = new_table(vec!["Rang", "Méthode", "Gain cumulé", "Trouvés", "Moyenne", "Parties"]);
    for (i, e) in entries.iter().enumerate() {
        let rank = if i == 0 {
            Cell::new("1").fg(Color::Green)
        } else {
            Cell::new(i + 1)
        };
        table.add_row(vec![
            rank,
            Cell::new(e.method),
            Cell::new(format!("{:.2}", e.total_profit)),
            Cell::new(e.total_hits),
            Cell::new(format!("{:.2}", e.average_hits)),
            Cell::new(e.rounds),
        ]);
    }
    println!("{table}");
}

pub fn display_backtest(report: &BacktestReport) {
    println!("\n📈 Backtest walk-forward sur {} partie(s)\n", report.rounds_scored);

    let mut table = new_table(vec!["Méthode", "Parties", "Moyenne", "Max", "Gain", "Net"]);
    for s in &report.summaries {
        let net_color = if s.net_profit >= 0.0 { Color::Green } else { Color::Red };
        table.add_row(vec![
            Cell::new(s.method),
            Cell::new(s.rounds),
            Cell::new(format!("{:.2}", s.average_hits)),
            Cell::new(s.best_hits),
            Cell::new(format!("{:.2}", s.total_profit)),
            Cell::new(format!("{:+.2}", s.net_profit)).fg(net_color),
        ]);
    }
    println!("{table}");

    println!("\n── Classement sur la fenêtre glissante ──");
    display_leaderboard(&report.leaderboard);
}

fn completion_cells(stats: &CompletionStats) -> Vec<Cell> {
    let profit_color = if stats.average_profit() >= 0.0 { Color::Green } else { Color::Red };
    vec![
        Cell::new(stats.predictions),
        Cell::new(format!("{:.1} %", stats.success_rate() * 100.0)),
        Cell::new(
            stats
                .average_rounds_to_hit()
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "—".to_string()),
        ),
        Cell::new(format!("{:.1} %", stats.maintaining_rate() * 100.0)),
        Cell::new(format!("{:+.2}", stats.average_profit())).fg(profit_color),
    ]
}

pub fn display_completions(results: &[MethodCompletion], options: &LookaheadOptions) {
    println!(
        "\n⏱  Sorties complètes sous {} partie(s), renouvellement toutes les {} partie(s)\n",
        options.horizon, options.refresh
    );
    let mut table = new_table(vec![
        "Méthode", "Prédictions", "Réussite", "Délai moyen", "Rentables", "Gain moyen", "Changements",
    ]);
    for r in results {
        let mut row = vec![Cell::new(r.method)];
        row.extend(completion_cells(&r.stats));
        row.push(Cell::new(r.pattern_changes));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_momentum_sweep(results: &[SweepResult<MomentumCandidate>], top: usize) {
    println!("\n🔧 Meilleures configurations momentum\n");
    let mut table = new_table(vec![
        "#", "Détection", "Base", "Seuil", "Renouv.", "Prédictions", "Réussite", "Délai moyen",
        "Rentables", "Gain moyen",
    ]);
    for (i, r) in results.iter().take(top).enumerate() {
        let m = &r.params.momentum;
        let mut row = vec![
            Cell::new(i + 1),
            Cell::new(m.detection_window),
            Cell::new(m.baseline_window),
            Cell::new(format!("{:.1}", m.threshold)),
            Cell::new(r.params.refresh),
        ];
        row.extend(completion_cells(&r.stats));
        table.add_row(row);
    }
    println!("{table}");
}

pub fn display_buildup_sweep(results: &[SweepResult<BuildupCandidate>], top: usize) {
    println!("\n🔧 Meilleurs filtres de montée\n");
    let mut table = new_table(vec![
        "#", "Échantillon", "Min", "Max", "Pas sortie depuis", "Prédictions", "Réussite",
        "Délai moyen", "Rentables", "Gain moyen",
    ]);
    for (i, r) in results.iter().take(top).enumerate() {
        let f = &r.params.filter;
        let mut row = vec![
            Cell::new(i + 1),
            Cell::new(r.params.sample),
            Cell::new(f.min_hits),
            Cell::new(f.max_hits),
            Cell::new(f.not_hit_in),
        ];
        row.extend(completion_cells(&r.stats));
        table.add_row(row);
    }
    println!("{table}");
}
