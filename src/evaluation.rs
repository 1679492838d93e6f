use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::feature_table::{EngineeredFeatureRow, FeatureTable};
use crate::forest::Regressor;
use crate::metrics::{RegressionMetrics, evaluate};
use crate::records::PositionGroup;

#[derive(Debug, Clone)]
pub struct SeasonSplit<'a> {
    pub train: Vec<&'a EngineeredFeatureRow>,
    pub eval: Vec<&'a EngineeredFeatureRow>,
}

pub fn split_by_season(table: &FeatureTable, holdout: i32) -> SeasonSplit<'_> {
    let mut split = SeasonSplit {
        train: Vec::new(),
        eval: Vec::new(),
    };
    for row in table.rows() {
        match row.player.season.cmp(&holdout) {
            std::cmp::Ordering::Less => split.train.push(row),
            std::cmp::Ordering::Equal => split.eval.push(row),
            std::cmp::Ordering::Greater => {}
        }
    }
    split
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub player_id: String,
    pub player_name: String,
    pub recent_team: String,
    pub position: PositionGroup,
    pub season: i32,
    pub week: u32,
    pub actual: f64,
    pub predicted: f64,
    pub spread_line: Option<f64>,
    pub total_line: Option<f64>,
    pub is_home: Option<f64>,
    pub is_away: Option<f64>,
}

impl PredictionRecord {
    fn new(row: &EngineeredFeatureRow, predicted: f64) -> Self {
        let p = &row.player;
        Self {
            player_id: p.player_id.clone(),
            player_name: p.player_name.clone(),
            recent_team: p.recent_team.clone(),
            position: row.position(),
            season: p.season,
            week: p.week,
            actual: p.fantasy_points_ppr,
            predicted,
            spread_line: row.spread_line,
            total_line: row.total_line,
            is_home: row.is_home,
            is_away: row.is_away,
        }
    }

    pub fn error(&self) -> f64 {
        self.actual - self.predicted
    }

    pub fn absolute_error(&self) -> f64 {
        self.error().abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionMetrics {
    pub position: PositionGroup,
    /// `None` when the holdout season has no rows for this position.
    pub metrics: Option<RegressionMetrics>,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub holdout_season: i32,
    pub train_rows: usize,
    pub eval_rows: usize,
    pub overall: RegressionMetrics,
    pub per_position: Vec<PositionMetrics>,
    /// Sorted by importance, largest first. Empty if the model has none.
    pub feature_importances: Vec<(String, f64)>,
    pub predictions: Vec<PredictionRecord>,
}

impl EvaluationReport {
    pub fn position(&self, pos: PositionGroup) -> Option<&RegressionMetrics> {
        self.per_position
            .iter()
            .find(|m| m.position == pos)
            .and_then(|m| m.metrics.as_ref())
    }
}

pub fn train_and_evaluate<R: Regressor + ?Sized>(
    table: &FeatureTable,
    holdout: i32,
    model: &mut R,
) -> Result<EvaluationReport> {
    let split = split_by_season(table, holdout);
    if split.train.is_empty() {
        return Err(anyhow!("no training rows before season {holdout}"));
    }
    if split.eval.is_empty() {
        return Err(anyhow!("no evaluation rows for season {holdout}"));
    }
    info!(
        holdout,
        train_rows = split.train.len(),
        eval_rows = split.eval.len(),
        "split by season"
    );

    let x_train = table.feature_matrix(split.train.iter().copied())?;
    let y_train = FeatureTable::targets(split.train.iter().copied());
    model.fit(&x_train, &y_train).context("fit model")?;

    let x_eval = table.feature_matrix(split.eval.iter().copied())?;
    let y_eval = FeatureTable::targets(split.eval.iter().copied());
    let predicted = model.predict(&x_eval).context("predict holdout season")?;
    if predicted.len() != y_eval.len() {
        return Err(anyhow!(
            "model returned {} predictions for {} rows",
            predicted.len(),
            y_eval.len()
        ));
    }
    let overall = evaluate(&y_eval, &predicted)
        .ok_or_else(|| anyhow!("no evaluation rows to score"))?;

    let per_position = PositionGroup::ALL
        .iter()
        .map(|&pos| {
            let (actual, preds): (Vec<f64>, Vec<f64>) = split
                .eval
                .iter()
                .zip(&predicted)
                .filter(|(row, _)| row.position_indicator(pos) == 1.0)
                .map(|(row, p)| (row.player.fantasy_points_ppr, *p))
                .unzip();
            PositionMetrics {
                position: pos,
                metrics: evaluate(&actual, &preds),
            }
        })
        .collect();

    let mut feature_importances = model
        .feature_importances()
        .map(|imp| {
            x_train
                .columns()
                .iter()
                .cloned()
                .zip(imp)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    feature_importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    let predictions = split
        .eval
        .iter()
        .zip(&predicted)
        .map(|(row, p)| PredictionRecord::new(row, *p))
        .collect();

    info!(
        mae = overall.mae,
        mse = overall.mse,
        r2 = overall.r2,
        "evaluated holdout season"
    );

    Ok(EvaluationReport {
        holdout_season: holdout,
        train_rows: split.train.len(),
        eval_rows: split.eval.len(),
        overall,
        per_position,
        feature_importances,
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_table::FeatureSchema;
    use crate::matrix::FeatureMatrix;
    use crate::records::{PlayerWeek, STAT_COUNT, SeasonType};
    use crate::schedule_context::ShiftedContextIndex;
    use crate::temporal::TemporalFeatures;

    struct MeanModel {
        mean: f64,
        seen_columns: usize,
    }

    impl Regressor for MeanModel {
        fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> Result<()> {
            self.seen_columns = features.n_cols();
            self.mean = target.iter().sum::<f64>() / target.len() as f64;
            Ok(())
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
            assert_eq!(features.n_cols(), self.seen_columns);
            Ok(vec![self.mean; features.n_rows()])
        }
    }

    fn row(id: &str, season: i32, week: u32, pos: PositionGroup, points: f64) -> PlayerWeek {
        PlayerWeek {
            player_id: id.to_string(),
            player_name: id.to_string(),
            position: pos.as_str().to_string(),
            position_group: pos,
            recent_team: "KC".to_string(),
            opponent_team: "BUF".to_string(),
            season,
            week,
            season_type: SeasonType::Regular,
            stats: [None; STAT_COUNT],
            fantasy_points: None,
            fantasy_points_ppr: points,
        }
    }

    fn table(players: Vec<PlayerWeek>) -> FeatureTable {
        let temporal = vec![
            TemporalFeatures {
                lagged: [None; STAT_COUNT],
                roll3: [None; STAT_COUNT],
                roll5: [None; STAT_COUNT],
            };
            players.len()
        ];
        FeatureTable::assemble(
            players,
            temporal,
            &ShiftedContextIndex::default(),
            FeatureSchema::standard(),
        )
        .unwrap()
    }

    #[test]
    fn split_partitions_by_holdout_season() {
        let mut players = Vec::new();
        for season in 2020..=2024 {
            for week in 1..=3 {
                players.push(row("a", season, week, PositionGroup::Wr, 10.0));
            }
        }
        let t = table(players);
        let split = split_by_season(&t, 2024);
        assert!(split.train.iter().all(|r| r.player.season < 2024));
        assert!(split.eval.iter().all(|r| r.player.season == 2024));
        assert_eq!(split.train.len() + split.eval.len(), t.len());
        assert_eq!(split.eval.len(), 3);
    }

    #[test]
    fn absent_position_has_no_metrics() {
        let t = table(vec![
            row("a", 2023, 1, PositionGroup::Qb, 20.0),
            row("b", 2023, 1, PositionGroup::Wr, 10.0),
            row("a", 2024, 1, PositionGroup::Qb, 18.0),
            row("b", 2024, 1, PositionGroup::Wr, 12.0),
        ]);
        let mut model = MeanModel {
            mean: 0.0,
            seen_columns: 0,
        };
        let report = train_and_evaluate(&t, 2024, &mut model).expect("report");
        assert_eq!(report.train_rows, 2);
        assert_eq!(report.eval_rows, 2);
        assert!((report.overall.mae - 3.0).abs() < 1e-12);
        assert!(report.position(PositionGroup::Te).is_none());
        assert!(report.position(PositionGroup::Rb).is_none());
        let qb = report.position(PositionGroup::Qb).unwrap();
        assert_eq!(qb.samples, 1);
        assert!((qb.mae - 3.0).abs() < 1e-12);
        assert!(report.feature_importances.is_empty());

        let first = &report.predictions[0];
        assert_eq!(first.predicted, 15.0);
        assert_eq!(first.absolute_error(), 3.0);
        assert_eq!(first.position, PositionGroup::Qb);
    }

    #[test]
    fn empty_split_is_an_error() {
        let t = table(vec![row("a", 2024, 1, PositionGroup::Te, 5.0)]);
        let mut model = MeanModel {
            mean: 0.0,
            seen_columns: 0,
        };
        assert!(train_and_evaluate(&t, 2024, &mut model).is_err());
        assert!(train_and_evaluate(&t, 2025, &mut model).is_err());
    }
}
