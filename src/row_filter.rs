use anyhow::{Result, anyhow};
use tracing::info;

use crate::records::{PlayerWeek, PositionGroup, SeasonType, WeeklyPlayerRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSummary {
    pub input_rows: usize,
    pub not_regular_season: usize,
    pub missing_target: usize,
    pub other_position: usize,
    pub kept: usize,
}

/// Keeps regular-season QB/RB/WR/TE rows with a known PPR total, sorted by
/// (player_id, season, week). A repeated key is an error.
pub fn filter_rows(records: Vec<WeeklyPlayerRecord>) -> Result<(Vec<PlayerWeek>, FilterSummary)> {
    let mut summary = FilterSummary {
        input_rows: records.len(),
        ..FilterSummary::default()
    };

    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        if record.season_type != SeasonType::Regular {
            summary.not_regular_season += 1;
            continue;
        }
        let Some(target) = record.fantasy_points_ppr else {
            summary.missing_target += 1;
            continue;
        };
        let Some(position_group) = PositionGroup::parse(&record.position_group) else {
            summary.other_position += 1;
            continue;
        };
        kept.push(PlayerWeek {
            player_id: record.player_id,
            player_name: record.player_name,
            position: record.position,
            position_group,
            recent_team: record.recent_team,
            opponent_team: record.opponent_team,
            season: record.season,
            week: record.week,
            season_type: record.season_type,
            stats: record.stats,
            fantasy_points: record.fantasy_points,
            fantasy_points_ppr: target,
        });
    }

    kept.sort_by(|a, b| a.key().cmp(&b.key()));
    if let Some(pair) = kept.windows(2).find(|w| w[0].key() == w[1].key()) {
        let (player_id, season, week) = pair[0].key();
        return Err(anyhow!(
            "duplicate weekly row for player {player_id} season {season} week {week}"
        ));
    }

    summary.kept = kept.len();
    info!(
        input = summary.input_rows,
        not_regular = summary.not_regular_season,
        missing_target = summary.missing_target,
        other_position = summary.other_position,
        kept = summary.kept,
        "filtered weekly rows"
    );
    Ok((kept, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::STAT_COUNT;

    fn record(
        player_id: &str,
        season: i32,
        week: u32,
        season_type: &str,
        group: &str,
        ppr: Option<f64>,
    ) -> WeeklyPlayerRecord {
        WeeklyPlayerRecord {
            player_id: player_id.to_string(),
            player_name: player_id.to_uppercase(),
            position: group.to_string(),
            position_group: group.to_string(),
            recent_team: "KC".to_string(),
            opponent_team: "BUF".to_string(),
            season,
            week,
            season_type: SeasonType::parse(season_type),
            stats: [None; STAT_COUNT],
            fantasy_points: ppr,
            fantasy_points_ppr: ppr,
        }
    }

    #[test]
    fn keeps_only_regular_offense_with_target() {
        let rows = vec![
            record("a", 2023, 1, "REG", "QB", Some(20.0)),
            record("a", 2023, 19, "POST", "QB", Some(25.0)),
            record("b", 2023, 1, "REG", "WR", None),
            record("c", 2023, 1, "REG", "SPEC", Some(9.0)),
            record("d", 2023, 1, "REG", "TE", Some(4.5)),
        ];
        let (kept, summary) = filter_rows(rows).expect("filter");
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.season_type == SeasonType::Regular));
        assert_eq!(
            summary,
            FilterSummary {
                input_rows: 5,
                not_regular_season: 1,
                missing_target: 1,
                other_position: 1,
                kept: 2,
            }
        );
    }

    #[test]
    fn output_is_sorted_by_player_then_time() {
        let rows = vec![
            record("b", 2024, 1, "REG", "RB", Some(1.0)),
            record("a", 2024, 2, "REG", "QB", Some(2.0)),
            record("a", 2023, 17, "REG", "QB", Some(3.0)),
            record("a", 2024, 1, "REG", "QB", Some(4.0)),
        ];
        let (kept, _) = filter_rows(rows).expect("filter");
        let keys = kept.iter().map(|r| r.key()).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![("a", 2023, 17), ("a", 2024, 1), ("a", 2024, 2), ("b", 2024, 1)]
        );
    }

    #[test]
    fn duplicate_player_week_is_rejected() {
        let rows = vec![
            record("a", 2024, 1, "REG", "QB", Some(1.0)),
            record("a", 2024, 1, "REG", "QB", Some(2.0)),
        ];
        let err = filter_rows(rows).expect_err("duplicate key");
        assert!(err.to_string().contains("duplicate weekly row"));
    }
}
