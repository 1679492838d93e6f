use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fantasy_forecast::config::PipelineConfig;
use fantasy_forecast::pipeline;
use fantasy_forecast::records::SeasonType;

/// Downloads and caches weekly stats and schedules, then prints row counts.
#[derive(Parser, Debug)]
#[command(author, version)]
struct Args {
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    seasons: Option<Vec<i32>>,

    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[arg(long)]
    refresh: bool,
}

#[derive(Default)]
struct SeasonCounts {
    rows: usize,
    regular: usize,
    players: HashSet<String>,
    games: usize,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fantasy_forecast=info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    cfg.apply_env_overrides();
    if let Some(seasons) = args.seasons {
        cfg.seasons = seasons;
    }
    if args.cache_dir.is_some() {
        cfg.cache_dir = args.cache_dir;
    }
    cfg.refresh |= args.refresh;

    let provider = pipeline::provider_for(&cfg);
    let raw = pipeline::load(provider.as_ref(), &cfg.seasons).context("fetch failed")?;

    let mut by_season: BTreeMap<i32, SeasonCounts> = BTreeMap::new();
    for record in &raw.weekly {
        let entry = by_season.entry(record.season).or_default();
        entry.rows += 1;
        if record.season_type == SeasonType::Regular {
            entry.regular += 1;
        }
        entry.players.insert(record.player_id.clone());
    }
    for game in &raw.schedules {
        by_season.entry(game.season).or_default().games += 1;
    }

    println!("Fetch complete");
    println!("Seasons: {}", cfg.seasons.len());
    println!("{:<8} {:>8} {:>8} {:>8} {:>6}", "season", "rows", "regular", "players", "games");
    for (season, counts) in &by_season {
        println!(
            "{:<8} {:>8} {:>8} {:>8} {:>6}",
            season,
            counts.rows,
            counts.regular,
            counts.players.len(),
            counts.games
        );
    }
    let missing = cfg
        .seasons
        .iter()
        .filter(|s| !by_season.contains_key(s))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        println!("Seasons without rows: {missing:?}");
    }
    Ok(())
}
