use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::forest::ForestConfig;
use crate::provider::{
    DEFAULT_SCHEDULES_URL, DEFAULT_WEEKLY_URL_TEMPLATE, SCHEDULES_URL_ENV, WEEKLY_URL_ENV,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    Nflverse {
        #[serde(default = "default_weekly_url")]
        weekly_url_template: String,
        #[serde(default = "default_schedules_url")]
        schedules_url: String,
    },
    /// Directory with `player_stats_{season}.{parquet,csv}` and `games.csv`.
    Local { dir: PathBuf },
}

fn default_weekly_url() -> String {
    DEFAULT_WEEKLY_URL_TEMPLATE.to_string()
}

fn default_schedules_url() -> String {
    DEFAULT_SCHEDULES_URL.to_string()
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Nflverse {
            weekly_url_template: default_weekly_url(),
            schedules_url: default_schedules_url(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Defaults to `fantasy_predictions_{holdout}.csv`.
    pub predictions: Option<PathBuf>,
    pub xlsx: Option<PathBuf>,
    pub features: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub seasons: Vec<i32>,
    pub holdout_season: i32,
    pub source: DataSource,
    pub refresh: bool,
    pub cache_dir: Option<PathBuf>,
    pub forest: ForestConfig,
    /// Minimum per-season share of games where the spread and the moneyline
    /// agree on the favourite.
    pub min_spread_agreement: f64,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seasons: (2020..=2024).collect(),
            holdout_season: 2024,
            source: DataSource::default(),
            refresh: false,
            cache_dir: None,
            forest: ForestConfig::default(),
            min_spread_agreement: 0.80,
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.seasons.len() < 2 {
            return Err(anyhow!(
                "need at least two seasons to train and evaluate, got {:?}",
                self.seasons
            ));
        }
        let mut sorted = self.seasons.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(anyhow!("seasons contain duplicates: {:?}", self.seasons));
        }
        if !self.seasons.contains(&self.holdout_season) {
            return Err(anyhow!(
                "holdout season {} is not among seasons {:?}",
                self.holdout_season,
                self.seasons
            ));
        }
        if !sorted.iter().any(|s| *s < self.holdout_season) {
            return Err(anyhow!(
                "no season before holdout {} to train on",
                self.holdout_season
            ));
        }
        if self.forest.n_trees == 0 {
            return Err(anyhow!("forest.n_trees must be at least 1"));
        }
        if self.forest.min_samples_leaf == 0 {
            return Err(anyhow!("forest.min_samples_leaf must be at least 1"));
        }
        if self.forest.max_features == Some(0) {
            return Err(anyhow!("forest.max_features must be at least 1 when set"));
        }
        if !(0.0..=1.0).contains(&self.min_spread_agreement) {
            return Err(anyhow!(
                "min_spread_agreement must be within [0, 1], got {}",
                self.min_spread_agreement
            ));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let DataSource::Nflverse {
            weekly_url_template,
            schedules_url,
        } = &mut self.source
        {
            if let Some(url) = lookup(WEEKLY_URL_ENV).filter(|v| !v.trim().is_empty()) {
                *weekly_url_template = url;
            }
            if let Some(url) = lookup(SCHEDULES_URL_ENV).filter(|v| !v.trim().is_empty()) {
                *schedules_url = url;
            }
        }
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.output.predictions.clone().unwrap_or_else(|| {
            PathBuf::from(format!("fantasy_predictions_{}.csv", self.holdout_season))
        })
    }
}
