use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::records::ScheduledGame;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamGameContext {
    pub team: String,
    pub season: i32,
    pub week: u32,
    pub spread_line: Option<f64>,
    pub total_line: Option<f64>,
    pub is_home: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedTeamContext {
    pub team: String,
    pub season: i32,
    pub week: u32,
    pub spread_line: Option<f64>,
    pub total_line: Option<f64>,
    pub is_home: Option<bool>,
}

/// Splits every game into a home row and an away row. The spread is quoted
/// for the home side, so the away row carries it negated.
pub fn team_game_rows(games: &[ScheduledGame]) -> Vec<TeamGameContext> {
    let mut out = Vec::with_capacity(games.len() * 2);
    for game in games {
        out.push(TeamGameContext {
            team: game.home_team.clone(),
            season: game.season,
            week: game.week,
            spread_line: game.spread_line,
            total_line: game.total_line,
            is_home: true,
        });
        out.push(TeamGameContext {
            team: game.away_team.clone(),
            season: game.season,
            week: game.week,
            spread_line: game.spread_line.map(|s| -s),
            total_line: game.total_line,
            is_home: false,
        });
    }
    out
}

pub fn shift_to_previous_game(rows: Vec<TeamGameContext>) -> Result<Vec<ShiftedTeamContext>> {
    let mut by_team: BTreeMap<String, Vec<TeamGameContext>> = BTreeMap::new();
    for row in rows {
        by_team.entry(row.team.clone()).or_default().push(row);
    }

    let mut out = Vec::new();
    for (team, mut games) in by_team {
        games.sort_by_key(|g| (g.season, g.week));
        if let Some(pair) = games
            .windows(2)
            .find(|w| (w[0].season, w[0].week) == (w[1].season, w[1].week))
        {
            return Err(anyhow!(
                "team {team} has two games in season {} week {}",
                pair[0].season,
                pair[0].week
            ));
        }

        let mut previous: Option<&TeamGameContext> = None;
        for game in &games {
            out.push(ShiftedTeamContext {
                team: team.clone(),
                season: game.season,
                week: game.week,
                spread_line: previous.and_then(|p| p.spread_line),
                total_line: previous.and_then(|p| p.total_line),
                is_home: previous.map(|p| p.is_home),
            });
            previous = Some(game);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub struct ShiftedContextIndex {
    by_team: HashMap<String, HashMap<(i32, u32), ShiftedTeamContext>>,
    len: usize,
}

impl ShiftedContextIndex {
    pub fn new(rows: Vec<ShiftedTeamContext>) -> Self {
        let mut index = Self::default();
        for row in rows {
            let slot = index
                .by_team
                .entry(row.team.clone())
                .or_default()
                .insert((row.season, row.week), row);
            if slot.is_none() {
                index.len += 1;
            }
        }
        index
    }

    pub fn get(&self, season: i32, week: u32, team: &str) -> Option<&ShiftedTeamContext> {
        self.by_team.get(team)?.get(&(season, week))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub fn build_schedule_context(games: &[ScheduledGame]) -> Result<ShiftedContextIndex> {
    let shifted = shift_to_previous_game(team_game_rows(games))?;
    let index = ShiftedContextIndex::new(shifted);
    info!(games = games.len(), team_games = index.len(), "built schedule context");
    Ok(index)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadCheck {
    pub season: i32,
    pub sampled: usize,
    pub agreeing: usize,
}

impl SpreadCheck {
    pub fn agreement(&self) -> Option<f64> {
        (self.sampled > 0).then(|| self.agreeing as f64 / self.sampled as f64)
    }
}

/// Verifies per season that a positive `spread_line` favours the home team,
/// using the moneyline favourite as the known-sign sample. Games without both
/// moneylines, with a pick'em spread or with equal moneylines are skipped.
pub fn check_spread_convention(
    games: &[ScheduledGame],
    min_agreement: f64,
) -> Result<Vec<SpreadCheck>> {
    let mut by_season: BTreeMap<i32, SpreadCheck> = BTreeMap::new();
    for game in games {
        let entry = by_season.entry(game.season).or_insert(SpreadCheck {
            season: game.season,
            sampled: 0,
            agreeing: 0,
        });
        let (Some(spread), Some(home_ml), Some(away_ml)) =
            (game.spread_line, game.home_moneyline, game.away_moneyline)
        else {
            continue;
        };
        if spread == 0.0 || home_ml == away_ml {
            continue;
        }
        entry.sampled += 1;
        let spread_favours_home = spread > 0.0;
        let moneyline_favours_home = home_ml < away_ml;
        if spread_favours_home == moneyline_favours_home {
            entry.agreeing += 1;
        }
    }

    let checks = by_season.into_values().collect::<Vec<_>>();
    for check in &checks {
        match check.agreement() {
            None => warn!(
                season = check.season,
                "no games with both spread and moneylines; spread sign not verified"
            ),
            Some(ratio) if ratio < min_agreement => {
                return Err(anyhow!(
                    "spread_line sign disagrees with moneyline favourite in season {}: {}/{} agree ({:.2} < {:.2})",
                    check.season,
                    check.agreeing,
                    check.sampled,
                    ratio,
                    min_agreement
                ));
            }
            Some(ratio) => info!(
                season = check.season,
                sampled = check.sampled,
                agreement = ratio,
                "spread sign verified"
            ),
        }
    }
    Ok(checks)
}
