use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fantasy_forecast::config::{DataSource, PipelineConfig};
use fantasy_forecast::evaluation::EvaluationReport;
use fantasy_forecast::pipeline;

const TOP_FEATURES: usize = 15;

#[derive(Parser, Debug)]
#[command(author, version, about = "Weekly PPR fantasy points forecaster")]
struct Args {
    /// JSON config file; flags below override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seasons to load, e.g. 2020,2021,2022.
    #[arg(long, value_delimiter = ',')]
    seasons: Option<Vec<i32>>,

    #[arg(long)]
    holdout: Option<i32>,

    /// Read player_stats_{season} files and games.csv from this directory
    /// instead of downloading.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Revalidate cached downloads.
    #[arg(long)]
    refresh: bool,

    #[arg(long)]
    trees: Option<usize>,

    #[arg(long)]
    min_samples_leaf: Option<usize>,

    #[arg(long)]
    max_depth: Option<usize>,

    /// Worker threads for tree fitting (0 = all cores).
    #[arg(long)]
    jobs: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    xlsx: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    features_out: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        cfg.apply_env_overrides();

        if let Some(seasons) = self.seasons {
            cfg.seasons = seasons;
        }
        if let Some(holdout) = self.holdout {
            cfg.holdout_season = holdout;
        }
        if let Some(dir) = self.data_dir {
            cfg.source = DataSource::Local { dir };
        }
        cfg.refresh |= self.refresh;
        if let Some(trees) = self.trees {
            cfg.forest.n_trees = trees;
        }
        if let Some(leaf) = self.min_samples_leaf {
            cfg.forest.min_samples_leaf = leaf;
        }
        if self.max_depth.is_some() {
            cfg.forest.max_depth = self.max_depth;
        }
        if let Some(jobs) = self.jobs {
            cfg.forest.n_jobs = jobs;
        }
        if let Some(seed) = self.seed {
            cfg.forest.seed = seed;
        }
        if self.out.is_some() {
            cfg.output.predictions = self.out;
        }
        if self.xlsx.is_some() {
            cfg.output.xlsx = self.xlsx;
        }
        if self.features_out.is_some() {
            cfg.output.features = self.features_out;
        }
        Ok(cfg)
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string())
}

fn print_report(report: &EvaluationReport) {
    println!("Holdout season: {}", report.holdout_season);
    println!("Train rows: {}  Eval rows: {}", report.train_rows, report.eval_rows);
    println!("Mean Absolute Error: {}", report.overall.mae);
    println!("Mean Squared Error: {}", report.overall.mse);
    println!("R^2 Score: {}", report.overall.r2);
    println!();
    println!("{:<4} {:>6} {:>8} {:>8} {:>8}", "pos", "rows", "MAE", "RMSE", "R2");
    for pm in &report.per_position {
        let m = pm.metrics.as_ref();
        println!(
            "{:<4} {:>6} {:>8} {:>8} {:>8}",
            pm.position.as_str(),
            m.map_or(0, |m| m.samples),
            fmt_opt(m.map(|m| m.mae)),
            fmt_opt(m.map(|m| m.rmse)),
            fmt_opt(m.map(|m| m.r2)),
        );
    }
    if !report.feature_importances.is_empty() {
        println!();
        println!("Top features:");
        for (name, value) in report.feature_importances.iter().take(TOP_FEATURES) {
            println!("  {name:<28} {value:.4}");
        }
    }
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

    let cfg = Args::parse().into_config()?;
    let output = pipeline::run(&cfg)?;

    print_report(&output.report);
    println!();
    println!("Feature rows: {}", output.feature_rows);
    println!("Exported predictions to {}", output.predictions_path.display());
    if let Some(path) = &cfg.output.xlsx {
        println!("Workbook: {}", path.display());
    }
    Ok(())
}
