use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use fantasy_forecast::feature_table::{FeatureSchema, FeatureTable};
use fantasy_forecast::forest::{ForestConfig, RandomForestRegressor, Regressor};
use fantasy_forecast::records::{
    CountingStat, PlayerWeek, PositionGroup, STAT_COUNT, ScheduledGame, SeasonType,
};
use fantasy_forecast::schedule_context::build_schedule_context;
use fantasy_forecast::temporal::build_temporal_features;

const TEAMS: [&str; 8] = ["KC", "BUF", "BAL", "DET", "SF", "PHI", "CIN", "DAL"];

fn sample_games() -> Vec<ScheduledGame> {
    let mut games = Vec::new();
    for season in 2020..=2024 {
        for week in 1..=17u32 {
            for pair in 0..TEAMS.len() / 2 {
                let shift = week as usize % TEAMS.len();
                let home = TEAMS[(pair * 2 + shift) % TEAMS.len()];
                let away = TEAMS[(pair * 2 + 1 + shift) % TEAMS.len()];
                let spread = ((week as usize + pair) % 7) as f64 - 3.0;
                games.push(ScheduledGame {
                    game_id: format!("{season}_{week:02}_{away}_{home}"),
                    season,
                    game_type: "REG".to_string(),
                    week,
                    home_team: home.to_string(),
                    away_team: away.to_string(),
                    spread_line: Some(spread),
                    total_line: Some(44.0 + spread.abs()),
                    home_moneyline: None,
                    away_moneyline: None,
                });
            }
        }
    }
    games
}

fn sample_players(count: usize) -> Vec<PlayerWeek> {
    let mut rows = Vec::new();
    for idx in 0..count {
        let pos = PositionGroup::ALL[idx % 4];
        for season in 2020..=2024 {
            for week in 1..=17u32 {
                let mut stats = [None; STAT_COUNT];
                for stat in CountingStat::ALL {
                    let v = ((idx * 31 + week as usize * 7 + stat.index() * 3) % 97) as f64;
                    stats[stat.index()] = (week % 9 != 0).then_some(v);
                }
                rows.push(PlayerWeek {
                    player_id: format!("{idx:05}"),
                    player_name: format!("Player {idx}"),
                    position: pos.as_str().to_string(),
                    position_group: pos,
                    recent_team: TEAMS[idx % TEAMS.len()].to_string(),
                    opponent_team: String::new(),
                    season,
                    week,
                    season_type: SeasonType::Regular,
                    stats,
                    fantasy_points: None,
                    fantasy_points_ppr: (idx % 25) as f64 + week as f64 * 0.5,
                });
            }
        }
    }
    rows
}

fn bench_temporal_features(c: &mut Criterion) {
    let players = sample_players(200);
    c.bench_function("temporal_features_200_players", |b| {
        b.iter(|| {
            let features = build_temporal_features(black_box(&players)).unwrap();
            black_box(features.len());
        })
    });
}

fn bench_feature_table(c: &mut Criterion) {
    let players = sample_players(200);
    let games = sample_games();
    c.bench_function("feature_table_assemble", |b| {
        b.iter(|| {
            let context = build_schedule_context(black_box(&games)).unwrap();
            let temporal = build_temporal_features(&players).unwrap();
            let table = FeatureTable::assemble(
                players.clone(),
                temporal,
                &context,
                FeatureSchema::standard(),
            )
            .unwrap();
            black_box(table.len());
        })
    });
}

fn bench_forest_fit(c: &mut Criterion) {
    let players = sample_players(40);
    let context = build_schedule_context(&sample_games()).unwrap();
    let temporal = build_temporal_features(&players).unwrap();
    let table =
        FeatureTable::assemble(players, temporal, &context, FeatureSchema::standard()).unwrap();
    let x = table.feature_matrix(table.rows()).unwrap();
    let y = FeatureTable::targets(table.rows());

    let mut group = c.benchmark_group("forest");
    group.sample_size(10);
    group.bench_function("fit_20_trees", |b| {
        b.iter(|| {
            let mut forest = RandomForestRegressor::new(ForestConfig {
                n_trees: 20,
                ..ForestConfig::default()
            });
            forest.fit(black_box(&x), black_box(&y)).unwrap();
            black_box(forest.n_trees());
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_temporal_features,
    bench_feature_table,
    bench_forest_fit
);
criterion_main!(benches);
