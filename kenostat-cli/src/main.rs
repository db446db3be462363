mod display;
mod import;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use kenostat_db::db::{db_path, SqliteStore};
use kenostat_db::models::{validate_round, Round};
use kenostat_engine::comparison::backtest::{walk_forward, BacktestOptions};
use kenostat_engine::comparison::lookahead::{evaluate_methods, LookaheadOptions, DEFAULT_REFRESH};
use kenostat_engine::comparison::optimize::{
    buildup_grid, momentum_grid, sweep_buildups, sweep_momentum, BuildupSweepOptions,
};
use kenostat_engine::config::EngineConfig;
use kenostat_engine::generators::StrategyKind;
use kenostat_engine::patterns::buildup::{find_buildups, BuildupFilter};
use kenostat_engine::patterns::{SortMode, DEFAULT_TOP_N};
use kenostat_engine::payout::{Difficulty, PayoutTable};
use kenostat_engine::stats::number_overview;
use kenostat_engine::Engine;

use crate::display::{
    display_backtest, display_buildup_sweep, display_buildups, display_completions,
    display_import_summary, display_momentum_sweep, display_patterns, display_prediction,
    display_rounds, display_stats,
};
use crate::import::{parse_numbers, ImportResult};

#[derive(Parser)]
#[command(name = "kenostat", about = "Analyse de l'historique des parties de keno")]
struct Cli {
    /// Configuration JSON du moteur
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Table des multiplicateurs de gain (JSON)
    #[arg(long, global = true)]
    payouts: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum SweepTarget {
    Momentum,
    Buildups,
}

#[derive(Subcommand)]
enum Command {
    /// Importer un historique exporté en JSON
    Import {
        /// Chemin vers le fichier JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les dernières parties
    List {
        /// Nombre de parties à afficher
        #[arg(short, long, default_value = "10")]
        last: usize,
    },

    /// Afficher les statistiques (fréquences, retards, tendances)
    Stats {
        /// Fenêtre d'analyse (nombre de parties)
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// Prédire la prochaine partie
    Predict {
        /// Méthode : frequency, cold, mixed, average, momentum, shapes, auto
        #[arg(short, long, default_value = "frequency")]
        method: String,

        /// Nombre de numéros
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Rechercher les combinaisons fréquentes
    Patterns {
        /// Taille des combinaisons (1-10)
        #[arg(short = 'k', long, default_value = "3")]
        size: usize,

        /// Nombre de parties récentes analysées
        #[arg(short, long)]
        sample: Option<usize>,

        /// Ordre de tri
        #[arg(long, value_enum, default_value = "frequency")]
        sort: SortMode,

        /// Nombre de combinaisons affichées
        #[arg(short, long, default_value_t = DEFAULT_TOP_N)]
        top: usize,
    },

    /// Détecter les combinaisons en montée (sorties partielles récentes)
    Buildups {
        #[arg(short = 'k', long, default_value = "5")]
        size: usize,

        /// Parties servant à découvrir les combinaisons
        #[arg(long, default_value = "100")]
        discovery: usize,

        /// Parties où l'on cherche les sorties partielles
        #[arg(short, long, default_value = "20")]
        sample: usize,

        /// Parties où l'on cherche la dernière sortie complète
        #[arg(long, default_value = "1000")]
        tracking: usize,

        #[arg(long, default_value = "3")]
        min_hits: usize,

        #[arg(long, default_value = "4")]
        max_hits: usize,

        /// Exclure les combinaisons sorties entièrement il y a moins de N parties
        #[arg(long, default_value = "0")]
        not_hit_in: usize,
    },

    /// Rejouer l'historique et classer les méthodes
    Backtest {
        /// Première partie évaluée
        #[arg(long)]
        start: Option<usize>,

        /// Difficulté des gains
        #[arg(short, long, value_enum)]
        difficulty: Option<Difficulty>,

        /// Méthodes comparées (séparées par des virgules)
        #[arg(short, long)]
        methods: Option<String>,

        /// Évaluer à horizon : la prédiction sort-elle entièrement dans les N parties suivantes ?
        #[arg(long)]
        horizon: Option<usize>,

        /// Nouvelle prédiction toutes les N parties (avec --horizon)
        #[arg(long, default_value_t = DEFAULT_REFRESH)]
        refresh: usize,

        /// Rechercher les meilleurs paramètres par grille
        #[arg(long, value_enum)]
        optimize: Option<SweepTarget>,

        /// Taille des combinaisons (avec --optimize buildups)
        #[arg(short = 'k', long, default_value = "5")]
        size: usize,

        /// Nombre de configurations affichées (avec --optimize)
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Ajouter une partie manuellement
    Add,

    /// Effacer tout l'historique
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let payouts = match &cli.payouts {
        Some(path) => PayoutTable::load(path)?,
        None => PayoutTable::default(),
    };

    let path = db_path();
    if let Command::DbPath = cli.command {
        println!("{}", path.display());
        return Ok(());
    }

    let store = Arc::new(SqliteStore::open(&path)?);
    let mut engine = Engine::open(store, config, Box::new(payouts.clone())).await?;

    let result = match cli.command {
        Command::Import { file } => cmd_import(&mut engine, &file),
        Command::DbPath => Ok(()),
        Command::List { last } => cmd_list(&engine, last),
        Command::Stats { window } => cmd_stats(&engine, window),
        Command::Predict { method, count } => cmd_predict(&mut engine, &method, count),
        Command::Patterns { size, sample, sort, top } => {
            cmd_patterns(&mut engine, size, sample, sort, top)
        }
        Command::Buildups {
            size,
            discovery,
            sample,
            tracking,
            min_hits,
            max_hits,
            not_hit_in,
        } => {
            let filter = BuildupFilter {
                min_hits,
                max_hits,
                not_hit_in,
                ..BuildupFilter::default()
            };
            cmd_buildups(&mut engine, size, discovery, sample, tracking, &filter)
        }
        Command::Backtest {
            start,
            difficulty,
            methods,
            horizon,
            refresh,
            optimize,
            size,
            top,
        } => match (optimize, horizon) {
            (Some(target), _) => cmd_optimize(&engine, &payouts, target, difficulty, horizon, size, top),
            (None, Some(horizon)) => cmd_lookahead(
                &engine,
                &payouts,
                start,
                difficulty,
                methods.as_deref(),
                horizon,
                refresh,
            ),
            (None, None) => cmd_backtest(&engine, &payouts, start, difficulty, methods.as_deref()),
        },
        Command::Add => cmd_add(&mut engine),
        Command::Clear => cmd_clear(&mut engine).await,
    };

    engine.flush().await.context("Écriture finale de l'historique")?;
    result
}

fn ensure_history(engine: &Engine) -> bool {
    if engine.history().is_empty() {
        println!("Historique vide. Lancez d'abord : kenostat import --file <export.json>");
        return false;
    }
    true
}

fn cmd_import(engine: &mut Engine, file: &Path) -> Result<()> {
    let (rounds, errors) = import::read_rounds(file)?;
    let mut result = ImportResult {
        total_records: rounds.len() as u32 + errors,
        inserted: 0,
        errors,
    };

    let pb = ProgressBar::new(rounds.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=> "));
    for round in rounds {
        engine.append(round);
        result.inserted += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    display_import_summary(&result);
    Ok(())
}

fn cmd_list(engine: &Engine, last: usize) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    let history = engine.history();
    let rounds = history.sample(last);
    display_rounds(rounds, history.len() - rounds.len());
    Ok(())
}

fn cmd_stats(engine: &Engine, window: Option<usize>) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    let window = window.unwrap_or(engine.config().sample_size);
    let sample = engine.history().sample(window);
    let overview = number_overview(sample, &engine.config().generator.momentum);
    display_stats(&overview, sample.len());
    Ok(())
}

fn cmd_predict(engine: &mut Engine, method: &str, count: Option<usize>) -> Result<()> {
    let count = count.unwrap_or(engine.config().prediction_count);
    let kind = method.parse::<StrategyKind>()?;
    let picks = engine.generate(method, count);
    display_prediction(kind, &picks, engine.best_method());
    Ok(())
}

fn cmd_patterns(
    engine: &mut Engine,
    size: usize,
    sample: Option<usize>,
    sort: SortMode,
    top: usize,
) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    let sample = sample.unwrap_or(engine.config().sample_size);
    let report = engine.find_patterns(size, sample, sort, top);
    display_patterns(&report, size, sort);
    Ok(())
}

fn cmd_buildups(
    engine: &mut Engine,
    size: usize,
    discovery: usize,
    sample: usize,
    tracking: usize,
    filter: &BuildupFilter,
) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    let candidates = engine.find_patterns(size, discovery, SortMode::Frequency, 100);
    let history = engine.history();
    let buildups = find_buildups(
        &candidates.patterns,
        history.sample(sample),
        history.sample(tracking),
        filter,
    );
    println!(
        "\n🔥 {} montée(s) sur {} combinaison(s) de {} numéros\n",
        buildups.len(),
        candidates.patterns.len(),
        size
    );
    display_buildups(&buildups);
    Ok(())
}

fn cmd_backtest(
    engine: &Engine,
    payouts: &PayoutTable,
    start: Option<usize>,
    difficulty: Option<Difficulty>,
    methods: Option<&str>,
) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    if payouts.is_empty() {
        log::warn!("Aucune table de gains (--payouts) : tous les gains valent 0");
    }

    let methods = parse_methods(methods)?;
    let config = engine.config();
    let mut options = BacktestOptions::from_config(config);
    if let Some(start) = start {
        options.start = start;
    }
    if let Some(difficulty) = difficulty {
        options.difficulty = difficulty;
    }

    let history = engine.history().rounds();
    println!(
        "Backtest de {} méthode(s) sur {} parties (difficulté {})...",
        methods.len(),
        history.len(),
        options.difficulty
    );

    let pb = ProgressBar::new(history.len().saturating_sub(options.start) as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=> "));
    let report = walk_forward(history, &methods, &config.generator, &options, payouts, |done, _| {
        pb.set_position(done as u64)
    });
    pb.finish_and_clear();

    display_backtest(&report);
    Ok(())
}

fn parse_methods(methods: Option<&str>) -> Result<Vec<StrategyKind>> {
    match methods {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().parse::<StrategyKind>())
            .collect(),
        None => Ok(StrategyKind::TRACKED.to_vec()),
    }
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
        .progress_chars("=> "));
    Ok(pb)
}

fn cmd_lookahead(
    engine: &Engine,
    payouts: &PayoutTable,
    start: Option<usize>,
    difficulty: Option<Difficulty>,
    methods: Option<&str>,
    horizon: usize,
    refresh: usize,
) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    let methods = parse_methods(methods)?;
    let config = engine.config();
    let mut options = LookaheadOptions {
        horizon,
        refresh,
        ..LookaheadOptions::from_config(config)
    };
    if let Some(start) = start {
        options.start = start;
    }
    if let Some(difficulty) = difficulty {
        options.difficulty = difficulty;
    }

    let history = engine.history().rounds();
    let points = options.emission_points(history.len()).count();
    println!(
        "Évaluation à horizon de {horizon} partie(s), une prédiction toutes les {refresh} partie(s) ({points} point(s))..."
    );

    let pb = progress_bar(points)?;
    let results = evaluate_methods(history, &methods, &config.generator, &options, payouts, |done, _| {
        pb.set_position(done as u64)
    });
    pb.finish_and_clear();

    display_completions(&results, &options);
    Ok(())
}

fn cmd_optimize(
    engine: &Engine,
    payouts: &PayoutTable,
    target: SweepTarget,
    difficulty: Option<Difficulty>,
    horizon: Option<usize>,
    size: usize,
    top: usize,
) -> Result<()> {
    if !ensure_history(engine) {
        return Ok(());
    }
    let config = engine.config();
    let history = engine.history().rounds();
    let difficulty = difficulty.unwrap_or(config.difficulty);

    match target {
        SweepTarget::Momentum => {
            let mut options = LookaheadOptions::from_config(config);
            options.difficulty = difficulty;
            if let Some(horizon) = horizon {
                options.horizon = horizon;
            }
            let grid = momentum_grid(config.generator.momentum.pool_size);
            println!("Test de {} configuration(s) momentum...", grid.len());

            let pb = progress_bar(grid.len())?;
            let results = sweep_momentum(history, &grid, &config.generator, &options, payouts, || pb.inc(1));
            pb.finish_and_clear();
            display_momentum_sweep(&results, top);
        }
        SweepTarget::Buildups => {
            let mut options = BuildupSweepOptions {
                pattern_size: size,
                difficulty,
                ..BuildupSweepOptions::default()
            };
            if let Some(horizon) = horizon {
                options.horizon = horizon;
            }
            let grid = buildup_grid(size);
            if grid.is_empty() {
                anyhow::bail!("Aucune configuration pour des combinaisons de {size} numéro(s)");
            }
            println!("Test de {} configuration(s) de montée, combinaisons de {size}...", grid.len());

            let pb = progress_bar(grid.len())?;
            let results = sweep_buildups(history, &grid, &options, payouts, || pb.inc(1));
            pb.finish_and_clear();
            display_buildup_sweep(&results, top);
        }
    }
    Ok(())
}

fn cmd_add(engine: &mut Engine) -> Result<()> {
    println!("Ajout d'une partie manuellement\n");

    let drawn = prompt_numbers("Numéros tirés (1-40, séparés par des espaces) : ")?;
    let selected = prompt_numbers("Numéros sélectionnés (vide si aucun) : ")?;
    validate_round(&drawn, &selected)?;

    let round = Round::new(&drawn, &selected, Utc::now());
    println!("\nPartie à ajouter :");
    display_rounds(std::slice::from_ref(&round), engine.history().len());

    let confirm = prompt("\nConfirmer l'ajout ? (o/n) : ")?;
    if confirm.trim().to_lowercase() == "o" {
        let index = engine.append(round);
        println!("Partie #{index} ajoutée.");
    } else {
        println!("Ajout annulé.");
    }
    Ok(())
}

async fn cmd_clear(engine: &mut Engine) -> Result<()> {
    let n = engine.history().len();
    let confirm = prompt(&format!("Effacer les {n} partie(s) de l'historique ? (o/n) : "))?;
    if confirm.trim().to_lowercase() != "o" {
        println!("Effacement annulé.");
        return Ok(());
    }
    engine.clear().await?;
    println!("Historique effacé.");
    Ok(())
}

fn prompt(msg: &str) -> Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Erreur de lecture")?;
    Ok(input.trim().to_string())
}

fn prompt_numbers(msg: &str) -> Result<Vec<u8>> {
    loop {
        let input = prompt(msg)?;
        match parse_numbers(&input) {
            Ok(numbers) => return Ok(numbers),
            Err(e) => println!("{e}. Réessayez."),
        }
    }
}
