use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row};
use serde::Deserialize;
use tracing::{debug, info};

use crate::download_cache::DownloadCache;
use crate::records::{CountingStat, STAT_COUNT, ScheduledGame, SeasonType, WeeklyPlayerRecord};

pub const DEFAULT_WEEKLY_URL_TEMPLATE: &str = "https://github.com/nflverse/nflverse-data/releases/download/player_stats/player_stats_{season}.parquet";
pub const DEFAULT_SCHEDULES_URL: &str =
    "https://github.com/nflverse/nfldata/raw/master/data/games.csv";

pub const WEEKLY_URL_ENV: &str = "FFP_WEEKLY_URL_TEMPLATE";
pub const SCHEDULES_URL_ENV: &str = "FFP_SCHEDULES_URL";

pub const WEEKLY_COLUMNS: [&str; 27] = [
    "player_id",
    "player_name",
    "position",
    "position_group",
    "recent_team",
    "season",
    "week",
    "season_type",
    "opponent_team",
    "completions",
    "attempts",
    "passing_yards",
    "passing_tds",
    "interceptions",
    "sacks",
    "sack_yards",
    "carries",
    "rushing_yards",
    "rushing_tds",
    "rushing_fumbles",
    "receptions",
    "targets",
    "receiving_yards",
    "receiving_tds",
    "receiving_fumbles",
    "fantasy_points",
    "fantasy_points_ppr",
];

pub trait DataProvider {
    fn fetch_weekly_stats(&self, seasons: &[i32], columns: &[&str])
    -> Result<Vec<WeeklyPlayerRecord>>;
    fn fetch_schedules(&self, seasons: &[i32]) -> Result<Vec<ScheduledGame>>;
}

#[derive(Debug, Clone)]
pub struct NflverseProvider {
    pub weekly_url_template: String,
    pub schedules_url: String,
    cache: DownloadCache,
}

impl NflverseProvider {
    pub fn new(weekly_url_template: String, schedules_url: String, cache: DownloadCache) -> Self {
        Self {
            weekly_url_template,
            schedules_url,
            cache,
        }
    }

    pub fn weekly_url(&self, season: i32) -> String {
        self.weekly_url_template
            .replace("{season}", &season.to_string())
    }
}

impl DataProvider for NflverseProvider {
    fn fetch_weekly_stats(
        &self,
        seasons: &[i32],
        columns: &[&str],
    ) -> Result<Vec<WeeklyPlayerRecord>> {
        ensure_required_columns(columns)?;
        let mut out = Vec::new();
        for season in seasons {
            let url = self.weekly_url(*season);
            let path = self
                .cache
                .fetch(&url)
                .with_context(|| format!("download weekly stats for {season}"))?;
            let rows = read_weekly_parquet(&path, columns, &[*season])?;
            info!(season, rows = rows.len(), "loaded weekly player stats");
            out.extend(rows);
        }
        Ok(out)
    }

    fn fetch_schedules(&self, seasons: &[i32]) -> Result<Vec<ScheduledGame>> {
        let path = self
            .cache
            .fetch(&self.schedules_url)
            .context("download schedules")?;
        let file = fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let games = parse_schedules_csv(file, seasons)?;
        info!(games = games.len(), "loaded schedules");
        Ok(games)
    }
}

/// Reads `player_stats_{season}.parquet` (or `.csv`) and `games.csv` from a
/// directory.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    dir: PathBuf,
}

impl LocalProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DataProvider for LocalProvider {
    fn fetch_weekly_stats(
        &self,
        seasons: &[i32],
        columns: &[&str],
    ) -> Result<Vec<WeeklyPlayerRecord>> {
        ensure_required_columns(columns)?;
        let mut out = Vec::new();
        for season in seasons {
            let parquet_path = self.dir.join(format!("player_stats_{season}.parquet"));
            let csv_path = self.dir.join(format!("player_stats_{season}.csv"));
            let rows = if parquet_path.exists() {
                read_weekly_parquet(&parquet_path, columns, &[*season])?
            } else if csv_path.exists() {
                let file = fs::File::open(&csv_path)
                    .with_context(|| format!("open {}", csv_path.display()))?;
                parse_weekly_csv(file, columns, &[*season])
                    .with_context(|| format!("parse {}", csv_path.display()))?
            } else {
                return Err(anyhow!(
                    "no weekly stats file for season {season} in {}",
                    self.dir.display()
                ));
            };
            debug!(season, rows = rows.len(), "loaded local weekly stats");
            out.extend(rows);
        }
        Ok(out)
    }

    fn fetch_schedules(&self, seasons: &[i32]) -> Result<Vec<ScheduledGame>> {
        let path = self.dir.join("games.csv");
        let file = fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
        parse_schedules_csv(file, seasons).with_context(|| format!("parse {}", path.display()))
    }
}

fn ensure_required_columns(columns: &[&str]) -> Result<()> {
    for required in WEEKLY_COLUMNS {
        if !columns.contains(&required) {
            return Err(anyhow!(
                "requested column list omits required column `{required}`"
            ));
        }
    }
    Ok(())
}

fn ensure_columns_present<'a>(
    available: impl IntoIterator<Item = &'a str>,
    columns: &[&str],
    source: &str,
) -> Result<()> {
    let available: HashSet<&str> = available.into_iter().collect();
    for column in columns {
        if !available.contains(column) {
            return Err(anyhow!("{source} is missing column `{column}`"));
        }
    }
    Ok(())
}

trait FieldSource {
    fn text(&self, name: &str) -> Option<String>;
    fn number(&self, name: &str) -> Result<Option<f64>>;
}

struct ParquetRow<'a> {
    fields: HashMap<&'a str, &'a Field>,
}

impl<'a> ParquetRow<'a> {
    fn new(row: &'a Row) -> Self {
        Self {
            fields: row
                .get_column_iter()
                .map(|(name, field)| (name.as_str(), field))
                .collect(),
        }
    }
}

impl FieldSource for ParquetRow<'_> {
    fn text(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Field::Str(s) => Some(s.clone()),
            Field::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn number(&self, name: &str) -> Result<Option<f64>> {
        let Some(field) = self.fields.get(name) else {
            return Ok(None);
        };
        let value = match field {
            Field::Null => None,
            Field::Byte(v) => Some(*v as f64),
            Field::Short(v) => Some(*v as f64),
            Field::Int(v) => Some(*v as f64),
            Field::Long(v) => Some(*v as f64),
            Field::UByte(v) => Some(*v as f64),
            Field::UShort(v) => Some(*v as f64),
            Field::UInt(v) => Some(*v as f64),
            Field::ULong(v) => Some(*v as f64),
            Field::Float(v) => Some(*v as f64),
            Field::Double(v) => Some(*v),
            Field::Str(s) => parse_number(s).with_context(|| format!("column `{name}`"))?,
            other => return Err(anyhow!("column `{name}` has non-numeric value {other}")),
        };
        Ok(value.filter(|v| v.is_finite()))
    }
}

struct CsvRow<'a> {
    headers: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl FieldSource for CsvRow<'_> {
    fn text(&self, name: &str) -> Option<String> {
        let idx = *self.headers.get(name)?;
        let raw = self.record.get(idx)?.trim();
        if is_missing_token(raw) {
            None
        } else {
            Some(raw.to_string())
        }
    }

    fn number(&self, name: &str) -> Result<Option<f64>> {
        let Some(idx) = self.headers.get(name) else {
            return Ok(None);
        };
        let raw = self.record.get(*idx).unwrap_or_default();
        parse_number(raw).with_context(|| format!("column `{name}`"))
    }
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw.eq_ignore_ascii_case("nan")
}

fn parse_number(raw: &str) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if is_missing_token(trimmed) {
        return Ok(None);
    }
    let value = trimmed
        .parse::<f64>()
        .with_context(|| format!("invalid number `{trimmed}`"))?;
    Ok(value.is_finite().then_some(value))
}

fn weekly_record_from(src: &impl FieldSource) -> Result<WeeklyPlayerRecord> {
    let player_id = src
        .text("player_id")
        .ok_or_else(|| anyhow!("weekly row without player_id"))?;
    let season = src
        .number("season")?
        .ok_or_else(|| anyhow!("weekly row for {player_id} without season"))?;
    let week = src
        .number("week")?
        .ok_or_else(|| anyhow!("weekly row for {player_id} without week"))?;
    if week < 0.0 {
        return Err(anyhow!("weekly row for {player_id} has negative week {week}"));
    }

    let mut stats = [None; STAT_COUNT];
    for stat in CountingStat::ALL {
        stats[stat.index()] = src.number(stat.column())?;
    }

    Ok(WeeklyPlayerRecord {
        player_name: src.text("player_name").unwrap_or_default(),
        position: src.text("position").unwrap_or_default(),
        position_group: src.text("position_group").unwrap_or_default(),
        recent_team: src.text("recent_team").unwrap_or_default(),
        opponent_team: src.text("opponent_team").unwrap_or_default(),
        season: season as i32,
        week: week as u32,
        season_type: SeasonType::parse(&src.text("season_type").unwrap_or_default()),
        stats,
        fantasy_points: src.number("fantasy_points")?,
        fantasy_points_ppr: src.number("fantasy_points_ppr")?,
        player_id,
    })
}

pub fn read_weekly_parquet(
    path: &Path,
    columns: &[&str],
    seasons: &[i32],
) -> Result<Vec<WeeklyPlayerRecord>> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open parquet reader weekly stats")?;
    {
        let schema = reader.metadata().file_metadata().schema_descr();
        ensure_columns_present(
            schema.columns().iter().map(|c| c.name()),
            columns,
            &path.display().to_string(),
        )?;
    }

    let iter = reader.get_row_iter(None).context("iterate weekly rows")?;
    let mut out = Vec::new();
    for (idx, row) in iter.enumerate() {
        let row = row.with_context(|| format!("decode weekly row {idx}"))?;
        let record = weekly_record_from(&ParquetRow::new(&row))
            .with_context(|| format!("weekly row {idx} in {}", path.display()))?;
        if seasons.contains(&record.season) {
            out.push(record);
        }
    }
    Ok(out)
}

pub fn parse_weekly_csv<R: Read>(
    reader: R,
    columns: &[&str],
    seasons: &[i32],
) -> Result<Vec<WeeklyPlayerRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers: HashMap<String, usize> = rdr
        .headers()
        .context("read weekly csv header")?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_string(), idx))
        .collect();
    ensure_columns_present(headers.keys().map(|k| k.as_str()), columns, "weekly csv")?;

    let mut out = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("read weekly csv row {idx}"))?;
        let row = CsvRow {
            headers: &headers,
            record: &record,
        };
        let parsed =
            weekly_record_from(&row).with_context(|| format!("weekly csv row {idx}"))?;
        if seasons.contains(&parsed.season) {
            out.push(parsed);
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct GameRow {
    game_id: String,
    season: i32,
    game_type: String,
    week: u32,
    home_team: String,
    away_team: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    spread_line: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    total_line: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    home_moneyline: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    away_moneyline: Option<f64>,
}

pub fn parse_schedules_csv<R: Read>(reader: R, seasons: &[i32]) -> Result<Vec<ScheduledGame>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<GameRow>().enumerate() {
        let row = row.with_context(|| format!("decode schedule row {idx}"))?;
        if !seasons.contains(&row.season) {
            continue;
        }
        out.push(ScheduledGame {
            game_id: row.game_id,
            season: row.season,
            game_type: row.game_type,
            week: row.week,
            home_team: row.home_team,
            away_team: row.away_team,
            spread_line: row.spread_line.filter(|v| v.is_finite()),
            total_line: row.total_line.filter(|v| v.is_finite()),
            home_moneyline: row.home_moneyline.filter(|v| v.is_finite()),
            away_moneyline: row.away_moneyline.filter(|v| v.is_finite()),
        });
    }
    Ok(out)
}
