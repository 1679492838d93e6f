use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;
use tracing::info;

use crate::evaluation::{EvaluationReport, PredictionRecord};
use crate::feature_table::FeatureTable;
use crate::metrics::RegressionMetrics;

pub const EXPORT_HEADER: [&str; 12] = [
    "player_name",
    "recent_team",
    "position",
    "season",
    "week",
    "fantasy_points_ppr",
    "predicted_points",
    "absolute_error",
    "spread_line",
    "total_line",
    "is_home",
    "is_away",
];

const TOP_IMPORTANCES: usize = 25;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    player_name: &'a str,
    recent_team: &'a str,
    position: &'a str,
    season: i32,
    week: u32,
    fantasy_points_ppr: f64,
    predicted_points: f64,
    absolute_error: f64,
    spread_line: Option<f64>,
    total_line: Option<f64>,
    is_home: Option<f64>,
    is_away: Option<f64>,
}

impl<'a> From<&'a PredictionRecord> for ExportRow<'a> {
    fn from(p: &'a PredictionRecord) -> Self {
        Self {
            player_name: &p.player_name,
            recent_team: &p.recent_team,
            position: p.position.as_str(),
            season: p.season,
            week: p.week,
            fantasy_points_ppr: p.actual,
            predicted_points: p.predicted,
            absolute_error: p.absolute_error(),
            spread_line: p.spread_line,
            total_line: p.total_line,
            is_home: p.is_home,
            is_away: p.is_away,
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("export"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    Ok(())
}

/// Writes through a sibling tmp file and renames it over `path`.
fn write_csv_atomically(
    path: &Path,
    fill: impl FnOnce(&mut csv::Writer<fs::File>) -> Result<()>,
) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp)
        .with_context(|| format!("create {}", tmp.display()))?;
    fill(&mut writer)?;
    writer
        .flush()
        .with_context(|| format!("flush {}", tmp.display()))?;
    drop(writer);
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

pub fn write_predictions_csv(path: &Path, predictions: &[PredictionRecord]) -> Result<()> {
    write_csv_atomically(path, |writer| {
        writer.write_record(EXPORT_HEADER).context("write header")?;
        for p in predictions {
            writer
                .serialize(ExportRow::from(p))
                .with_context(|| format!("write prediction for {}", p.player_id))?;
        }
        Ok(())
    })?;
    info!(rows = predictions.len(), path = %path.display(), "wrote predictions");
    Ok(())
}

/// Dumps the whole engineered table, identity and target included.
pub fn write_feature_table_csv(path: &Path, table: &FeatureTable) -> Result<()> {
    write_csv_atomically(path, |writer| {
        writer.write_record(table.columns()).context("write header")?;
        for row in table.rows() {
            writer
                .write_record(row.cells())
                .context("write feature row")?;
        }
        Ok(())
    })?;
    info!(rows = table.len(), path = %path.display(), "wrote feature table");
    Ok(())
}

pub fn write_workbook(path: &Path, report: &EvaluationReport) -> Result<()> {
    ensure_parent(path)?;
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Predictions")?;
        write_predictions_sheet(sheet, &report.predictions)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Metrics")?;
        write_rows(sheet, &metrics_rows(report))?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    info!(path = %path.display(), "wrote workbook");
    Ok(())
}

fn write_predictions_sheet(sheet: &mut Worksheet, predictions: &[PredictionRecord]) -> Result<()> {
    for (col, name) in EXPORT_HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (idx, p) in predictions.iter().enumerate() {
        let r = idx as u32 + 1;
        sheet.write_string(r, 0, &p.player_name)?;
        sheet.write_string(r, 1, &p.recent_team)?;
        sheet.write_string(r, 2, p.position.as_str())?;
        let numbers = [
            Some(p.season as f64),
            Some(p.week as f64),
            Some(p.actual),
            Some(p.predicted),
            Some(p.absolute_error()),
            p.spread_line,
            p.total_line,
            p.is_home,
            p.is_away,
        ];
        for (offset, value) in numbers.into_iter().enumerate() {
            if let Some(v) = value {
                sheet
                    .write_number(r, 3 + offset as u16, v)
                    .with_context(|| format!("write cell ({r},{})", 3 + offset))?;
            }
        }
    }
    Ok(())
}

fn metric_cells(scope: &str, m: Option<&RegressionMetrics>) -> Vec<String> {
    match m {
        Some(m) => vec![
            scope.to_string(),
            m.samples.to_string(),
            format!("{:.4}", m.mae),
            format!("{:.4}", m.mse),
            format!("{:.4}", m.rmse),
            format!("{:.4}", m.r2),
        ],
        None => vec![scope.to_string(), "0".to_string()],
    }
}

fn metrics_rows(report: &EvaluationReport) -> Vec<Vec<String>> {
    let mut rows = vec![
        ["scope", "samples", "mae", "mse", "rmse", "r2"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    ];
    rows.push(metric_cells("overall", Some(&report.overall)));
    for pm in &report.per_position {
        rows.push(metric_cells(pm.position.as_str(), pm.metrics.as_ref()));
    }
    if !report.feature_importances.is_empty() {
        rows.push(Vec::new());
        rows.push(vec!["feature".to_string(), "importance".to_string()]);
        for (name, value) in report.feature_importances.iter().take(TOP_IMPORTANCES) {
            rows.push(vec![name.clone(), format!("{value:.6}")]);
        }
    }
    rows
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
