use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{DataSource, PipelineConfig};
use crate::download_cache::DownloadCache;
use crate::evaluation::{EvaluationReport, train_and_evaluate};
use crate::export;
use crate::feature_table::{FeatureSchema, FeatureTable};
use crate::forest::RandomForestRegressor;
use crate::provider::{DataProvider, LocalProvider, NflverseProvider, WEEKLY_COLUMNS};
use crate::records::{PlayerWeek, ScheduledGame, WeeklyPlayerRecord};
use crate::row_filter::filter_rows;
use crate::schedule_context::{build_schedule_context, check_spread_convention};
use crate::temporal::build_temporal_features;

#[derive(Debug, Clone)]
pub struct RawData {
    pub weekly: Vec<WeeklyPlayerRecord>,
    pub schedules: Vec<ScheduledGame>,
}

pub fn provider_for(config: &PipelineConfig) -> Box<dyn DataProvider> {
    match &config.source {
        DataSource::Nflverse {
            weekly_url_template,
            schedules_url,
        } => {
            let cache = match &config.cache_dir {
                Some(dir) => DownloadCache::new(dir.clone(), config.refresh),
                None => DownloadCache::in_app_cache_dir(config.refresh),
            };
            Box::new(NflverseProvider::new(
                weekly_url_template.clone(),
                schedules_url.clone(),
                cache,
            ))
        }
        DataSource::Local { dir } => Box::new(LocalProvider::new(dir.clone())),
    }
}

pub fn load(provider: &dyn DataProvider, seasons: &[i32]) -> Result<RawData> {
    let weekly = provider
        .fetch_weekly_stats(seasons, &WEEKLY_COLUMNS)
        .context("load weekly player stats")?;
    let schedules = provider
        .fetch_schedules(seasons)
        .context("load schedules")?;
    info!(
        weekly_rows = weekly.len(),
        games = schedules.len(),
        "loaded raw data"
    );
    Ok(RawData { weekly, schedules })
}

pub fn filter(weekly: Vec<WeeklyPlayerRecord>) -> Result<Vec<PlayerWeek>> {
    let (rows, _summary) = filter_rows(weekly)?;
    Ok(rows)
}

/// load -> filter -> schedule context -> temporal features -> assemble.
pub fn build_feature_table(raw: RawData, min_spread_agreement: f64) -> Result<FeatureTable> {
    let players = filter(raw.weekly)?;
    check_spread_convention(&raw.schedules, min_spread_agreement)?;
    let context = build_schedule_context(&raw.schedules)?;
    let temporal = build_temporal_features(&players)?;
    let table = FeatureTable::assemble(players, temporal, &context, FeatureSchema::standard())
        .context("assemble feature table")?;
    Ok(table)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: EvaluationReport,
    pub predictions_path: PathBuf,
    pub feature_rows: usize,
}

pub fn run(config: &PipelineConfig) -> Result<RunOutput> {
    config.validate()?;
    let provider = provider_for(config);
    let raw = load(provider.as_ref(), &config.seasons)?;
    let table = build_feature_table(raw, config.min_spread_agreement)?;

    if let Some(path) = &config.output.features {
        export::write_feature_table_csv(path, &table)?;
    }

    let mut model = RandomForestRegressor::new(config.forest.clone());
    let report = train_and_evaluate(&table, config.holdout_season, &mut model)?;

    let predictions_path = config.predictions_path();
    export::write_predictions_csv(&predictions_path, &report.predictions)?;
    if let Some(path) = &config.output.xlsx {
        export::write_workbook(path, &report)?;
    }

    Ok(RunOutput {
        report,
        predictions_path,
        feature_rows: table.len(),
    })
}
