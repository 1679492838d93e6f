use anyhow::{Result, anyhow};
use tracing::info;

use crate::records::{CountingStat, PlayerWeek, STAT_COUNT, StatLine};

pub const SHORT_WINDOW: usize = 3;
pub const LONG_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFeatures {
    pub lagged: StatLine,
    pub roll3: StatLine,
    pub roll5: StatLine,
}

impl TemporalFeatures {
    fn empty() -> Self {
        Self {
            lagged: [None; STAT_COUNT],
            roll3: [None; STAT_COUNT],
            roll5: [None; STAT_COUNT],
        }
    }
}

/// Value at position k becomes the value at k-1; position 0 becomes missing.
pub fn lag_one_game(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    out.extend_from_slice(&values[..values.len() - 1]);
    out
}

/// Missing only when the whole window is missing.
pub fn trailing_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let (sum, count) = values[start..=idx]
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

pub fn build_temporal_features(rows: &[PlayerWeek]) -> Result<Vec<TemporalFeatures>> {
    if let Some(pair) = rows.windows(2).find(|w| w[0].key() >= w[1].key()) {
        let (player_id, season, week) = pair[1].key();
        return Err(anyhow!(
            "player rows out of order at player {player_id} season {season} week {week}"
        ));
    }

    let mut out = vec![TemporalFeatures::empty(); rows.len()];
    let mut players = 0usize;
    let mut start = 0usize;
    while start < rows.len() {
        let player_id = rows[start].player_id.as_str();
        let end = rows[start..]
            .iter()
            .position(|r| r.player_id != player_id)
            .map_or(rows.len(), |offset| start + offset);
        let history = &rows[start..end];

        for stat in CountingStat::ALL {
            let raw = history.iter().map(|r| r.stat(stat)).collect::<Vec<_>>();
            let lagged = lag_one_game(&raw);
            let roll3 = trailing_mean(&lagged, SHORT_WINDOW);
            let roll5 = trailing_mean(&lagged, LONG_WINDOW);
            let i = stat.index();
            for (offset, features) in out[start..end].iter_mut().enumerate() {
                features.lagged[i] = lagged[offset];
                features.roll3[i] = roll3[offset];
                features.roll5[i] = roll5[offset];
            }
        }

        players += 1;
        start = end;
    }

    info!(rows = rows.len(), players, "built temporal features");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{PositionGroup, SeasonType};

    fn week(player_id: &str, season: i32, week: u32, passing_yards: Option<f64>) -> PlayerWeek {
        let mut stats = [None; STAT_COUNT];
        stats[CountingStat::PassingYards.index()] = passing_yards;
        stats[CountingStat::Receptions.index()] = passing_yards.map(|y| y / 100.0);
        PlayerWeek {
            player_id: player_id.to_string(),
            player_name: player_id.to_string(),
            position: "QB".to_string(),
            position_group: PositionGroup::Qb,
            recent_team: "KC".to_string(),
            opponent_team: "BUF".to_string(),
            season,
            week,
            season_type: SeasonType::Regular,
            stats,
            fantasy_points: None,
            fantasy_points_ppr: 10.0,
        }
    }

    fn passing(rows: &[TemporalFeatures], pick: fn(&TemporalFeatures) -> &StatLine) -> Vec<Option<f64>> {
        let i = CountingStat::PassingYards.index();
        rows.iter().map(|r| pick(r)[i]).collect()
    }

    #[test]
    fn lag_moves_values_back_one_game() {
        let lagged = lag_one_game(&[Some(1.0), None, Some(3.0)]);
        assert_eq!(lagged, vec![None, Some(1.0), None]);
        assert!(lag_one_game(&[]).is_empty());
    }

    #[test]
    fn trailing_mean_uses_available_values() {
        let means = trailing_mean(&[None, Some(2.0), Some(4.0), None, Some(9.0)], 3);
        assert_eq!(means, vec![None, Some(2.0), Some(3.0), Some(3.0), Some(6.5)]);
        assert_eq!(trailing_mean(&[None, None], 5), vec![None, None]);
    }

    #[test]
    fn six_week_passing_history_matches_hand_computation() {
        let yards = [200.0, 250.0, 300.0, 150.0, 400.0, 350.0];
        let rows = yards
            .iter()
            .enumerate()
            .map(|(i, y)| week("qb1", 2024, i as u32 + 1, Some(*y)))
            .collect::<Vec<_>>();
        let features = build_temporal_features(&rows).expect("features");

        let lagged = passing(&features, |f| &f.lagged);
        assert_eq!(
            lagged,
            vec![None, Some(200.0), Some(250.0), Some(300.0), Some(150.0), Some(400.0)]
        );

        let roll3 = passing(&features, |f| &f.roll3);
        assert_eq!(roll3[0], None);
        assert_eq!(roll3[1], Some(200.0));
        let week6 = roll3[5].unwrap();
        assert!((week6 - 283.333_333).abs() < 1e-4, "got {week6}");

        let roll5 = passing(&features, |f| &f.roll5);
        assert_eq!(roll5[1], Some(200.0));
        let expected = (200.0 + 250.0 + 300.0 + 150.0 + 400.0) / 5.0;
        assert!((roll5[5].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn roll5_never_sees_current_game() {
        let rows = (1..=8)
            .map(|w| week("qb1", 2024, w, Some(w as f64 * 10.0)))
            .collect::<Vec<_>>();
        let features = build_temporal_features(&rows).expect("features");
        let lagged = passing(&features, |f| &f.lagged);
        let roll5 = passing(&features, |f| &f.roll5);
        for k in 5..rows.len() {
            let window = &lagged[k - 4..=k];
            let mean = window.iter().flatten().sum::<f64>() / window.iter().flatten().count() as f64;
            assert!((roll5[k].unwrap() - mean).abs() < 1e-9);
            let own = rows[k].stat(CountingStat::PassingYards).unwrap();
            assert!(roll5[k].unwrap() < own, "game {k} mean must only use earlier games");
        }
    }

    #[test]
    fn history_carries_across_seasons_but_not_players() {
        let rows = vec![
            week("a", 2023, 17, Some(300.0)),
            week("a", 2024, 1, Some(100.0)),
            week("b", 2024, 1, Some(250.0)),
            week("b", 2024, 2, None),
            week("b", 2024, 3, Some(50.0)),
        ];
        let features = build_temporal_features(&rows).expect("features");
        let lagged = passing(&features, |f| &f.lagged);
        assert_eq!(lagged, vec![None, Some(300.0), None, Some(250.0), None]);
        let roll3 = passing(&features, |f| &f.roll3);
        assert_eq!(roll3, vec![None, Some(300.0), None, Some(250.0), Some(250.0)]);

        let rec = CountingStat::Receptions.index();
        assert_eq!(features[1].lagged[rec], Some(3.0));
        assert_eq!(features[2].lagged[rec], None);
    }

    #[test]
    fn unsorted_rows_are_rejected() {
        let rows = vec![week("a", 2024, 2, Some(1.0)), week("a", 2024, 1, Some(2.0))];
        assert!(build_temporal_features(&rows).is_err());
    }
}
