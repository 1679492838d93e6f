use std::fs;
use std::path::PathBuf;

use fantasy_forecast::config::{DataSource, OutputConfig, PipelineConfig};
use fantasy_forecast::evaluation::{split_by_season, train_and_evaluate};
use fantasy_forecast::export::EXPORT_HEADER;
use fantasy_forecast::feature_table::{FeatureSchema, FeatureTable};
use fantasy_forecast::forest::{ForestConfig, RandomForestRegressor};
use fantasy_forecast::pipeline;
use fantasy_forecast::records::{CountingStat, PlayerWeek, PositionGroup, STAT_COUNT, SeasonType};
use fantasy_forecast::schedule_context::ShiftedContextIndex;
use fantasy_forecast::temporal::build_temporal_features;

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn small_forest() -> ForestConfig {
    ForestConfig {
        n_trees: 25,
        n_jobs: 2,
        ..ForestConfig::default()
    }
}

fn synthetic_table() -> FeatureTable {
    let positions = PositionGroup::ALL;
    let mut players = Vec::new();
    for (p, pos) in positions.iter().enumerate() {
        for season in 2020..=2024 {
            for week in 1..=6u32 {
                let mut stats = [None; STAT_COUNT];
                let yards = 40.0 * (p as f64 + 1.0) + week as f64 * 3.0;
                stats[CountingStat::ReceivingYards.index()] = Some(yards);
                stats[CountingStat::Receptions.index()] = Some(week as f64);
                players.push(PlayerWeek {
                    player_id: format!("p{p}"),
                    player_name: format!("Player {p}"),
                    position: pos.as_str().to_string(),
                    position_group: *pos,
                    recent_team: "KC".to_string(),
                    opponent_team: "BUF".to_string(),
                    season,
                    week,
                    season_type: SeasonType::Regular,
                    stats,
                    fantasy_points: None,
                    fantasy_points_ppr: yards / 10.0 + week as f64,
                });
            }
        }
    }
    let temporal = build_temporal_features(&players).expect("temporal");
    FeatureTable::assemble(
        players,
        temporal,
        &ShiftedContextIndex::default(),
        FeatureSchema::standard(),
    )
    .expect("assemble")
}

#[test]
fn holdout_split_over_five_seasons() {
    let table = synthetic_table();
    assert_eq!(table.seasons(), vec![2020, 2021, 2022, 2023, 2024]);

    let split = split_by_season(&table, 2024);
    assert!(split.train.iter().all(|r| r.player.season != 2024));
    assert!(split.eval.iter().all(|r| r.player.season == 2024));
    assert_eq!(split.train.len() + split.eval.len(), table.len());
    assert_eq!(split.eval.len(), 4 * 6);
}

#[test]
fn forest_learns_position_separated_targets() {
    let table = synthetic_table();
    let mut model = RandomForestRegressor::new(small_forest());
    let report = train_and_evaluate(&table, 2024, &mut model).expect("evaluate");

    assert_eq!(report.eval_rows, 24);
    assert_eq!(report.predictions.len(), 24);
    assert!(report.overall.r2 > 0.5, "r2 = {}", report.overall.r2);
    for pos in PositionGroup::ALL {
        assert_eq!(report.position(pos).map(|m| m.samples), Some(6));
    }

    let total: f64 = report.feature_importances.iter().map(|(_, v)| v).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(
        report
            .feature_importances
            .windows(2)
            .all(|w| w[0].1 >= w[1].1)
    );
}

#[test]
fn end_to_end_run_on_fixtures_writes_predictions() {
    let out_dir = std::env::temp_dir().join(format!("ff_run_{}", std::process::id()));
    let predictions = out_dir.join("fantasy_predictions_2024.csv");
    let xlsx = out_dir.join("report.xlsx");
    let cfg = PipelineConfig {
        seasons: vec![2023, 2024],
        holdout_season: 2024,
        source: DataSource::Local {
            dir: fixtures_dir(),
        },
        forest: small_forest(),
        output: OutputConfig {
            predictions: Some(predictions.clone()),
            xlsx: Some(xlsx.clone()),
            features: None,
        },
        ..PipelineConfig::default()
    };

    let output = pipeline::run(&cfg).expect("pipeline run");
    let report = &output.report;
    assert_eq!(output.feature_rows, 36);
    assert_eq!(report.train_rows, 16);
    assert_eq!(report.eval_rows, 20);
    assert!(report.overall.mae.is_finite());
    assert!(report.overall.mse >= report.overall.mae.powi(2) - 1e-9);
    assert!(report.predictions.iter().all(|p| p.season == 2024));

    let text = fs::read_to_string(&predictions).expect("predictions csv");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(EXPORT_HEADER.join(",").as_str()));
    assert_eq!(lines.count(), 20);
    assert!(xlsx.exists());

    // Mahomes week 5 has no game on the schedule, so its covariates are blank.
    assert!(text.lines().any(|l| l.starts_with("P.Mahomes,KC,QB,2024,5,") && l.ends_with(",,,,")));

    fs::remove_dir_all(&out_dir).ok();
}

#[test]
fn invalid_holdout_fails_before_loading() {
    let cfg = PipelineConfig {
        seasons: vec![2023, 2024],
        holdout_season: 2022,
        source: DataSource::Local {
            dir: PathBuf::from("/nonexistent"),
        },
        ..PipelineConfig::default()
    };
    let err = pipeline::run(&cfg).expect_err("invalid config");
    assert!(err.to_string().contains("holdout"));
}
