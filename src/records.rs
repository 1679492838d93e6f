use std::fmt;

pub const STAT_COUNT: usize = 16;

/// Raw per-game counting stats, in the order every per-stat array is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CountingStat {
    Completions,
    Attempts,
    PassingYards,
    PassingTds,
    Interceptions,
    Sacks,
    SackYards,
    Carries,
    RushingYards,
    RushingTds,
    RushingFumbles,
    Receptions,
    Targets,
    ReceivingYards,
    ReceivingTds,
    ReceivingFumbles,
}

impl CountingStat {
    pub const ALL: [CountingStat; STAT_COUNT] = [
        CountingStat::Completions,
        CountingStat::Attempts,
        CountingStat::PassingYards,
        CountingStat::PassingTds,
        CountingStat::Interceptions,
        CountingStat::Sacks,
        CountingStat::SackYards,
        CountingStat::Carries,
        CountingStat::RushingYards,
        CountingStat::RushingTds,
        CountingStat::RushingFumbles,
        CountingStat::Receptions,
        CountingStat::Targets,
        CountingStat::ReceivingYards,
        CountingStat::ReceivingTds,
        CountingStat::ReceivingFumbles,
    ];

    pub fn column(self) -> &'static str {
        match self {
            CountingStat::Completions => "completions",
            CountingStat::Attempts => "attempts",
            CountingStat::PassingYards => "passing_yards",
            CountingStat::PassingTds => "passing_tds",
            CountingStat::Interceptions => "interceptions",
            CountingStat::Sacks => "sacks",
            CountingStat::SackYards => "sack_yards",
            CountingStat::Carries => "carries",
            CountingStat::RushingYards => "rushing_yards",
            CountingStat::RushingTds => "rushing_tds",
            CountingStat::RushingFumbles => "rushing_fumbles",
            CountingStat::Receptions => "receptions",
            CountingStat::Targets => "targets",
            CountingStat::ReceivingYards => "receiving_yards",
            CountingStat::ReceivingTds => "receiving_tds",
            CountingStat::ReceivingFumbles => "receiving_fumbles",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

pub type StatLine = [Option<f64>; STAT_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PositionGroup {
    Qb,
    Rb,
    Wr,
    Te,
}

impl PositionGroup {
    pub const ALL: [PositionGroup; 4] = [
        PositionGroup::Qb,
        PositionGroup::Rb,
        PositionGroup::Wr,
        PositionGroup::Te,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "QB" => Some(PositionGroup::Qb),
            "RB" => Some(PositionGroup::Rb),
            "WR" => Some(PositionGroup::Wr),
            "TE" => Some(PositionGroup::Te),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PositionGroup::Qb => "QB",
            PositionGroup::Rb => "RB",
            PositionGroup::Wr => "WR",
            PositionGroup::Te => "TE",
        }
    }

    pub fn indicator_column(self) -> &'static str {
        match self {
            PositionGroup::Qb => "position_group_QB",
            PositionGroup::Rb => "position_group_RB",
            PositionGroup::Wr => "position_group_WR",
            PositionGroup::Te => "position_group_TE",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PositionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonType {
    Regular,
    Postseason,
    Other(String),
}

impl SeasonType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "REG" => SeasonType::Regular,
            "POST" => SeasonType::Postseason,
            other => SeasonType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SeasonType::Regular => "REG",
            SeasonType::Postseason => "POST",
            SeasonType::Other(raw) => raw,
        }
    }
}

/// One provider row per (player_id, season, week), before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyPlayerRecord {
    pub player_id: String,
    pub player_name: String,
    pub position: String,
    pub position_group: String,
    pub recent_team: String,
    pub opponent_team: String,
    pub season: i32,
    pub week: u32,
    pub season_type: SeasonType,
    pub stats: StatLine,
    pub fantasy_points: Option<f64>,
    pub fantasy_points_ppr: Option<f64>,
}

impl WeeklyPlayerRecord {
    pub fn stat(&self, stat: CountingStat) -> Option<f64> {
        self.stats[stat.index()]
    }
}

/// A regular-season offensive player-week with a known target.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerWeek {
    pub player_id: String,
    pub player_name: String,
    pub position: String,
    pub position_group: PositionGroup,
    pub recent_team: String,
    pub opponent_team: String,
    pub season: i32,
    pub week: u32,
    pub season_type: SeasonType,
    pub stats: StatLine,
    pub fantasy_points: Option<f64>,
    pub fantasy_points_ppr: f64,
}

impl PlayerWeek {
    pub fn stat(&self, stat: CountingStat) -> Option<f64> {
        self.stats[stat.index()]
    }

    pub fn key(&self) -> (&str, i32, u32) {
        (self.player_id.as_str(), self.season, self.week)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub game_id: String,
    pub season: i32,
    pub game_type: String,
    pub week: u32,
    pub home_team: String,
    pub away_team: String,
    // Points the home side is expected to win by; positive favours home.
    pub spread_line: Option<f64>,
    pub total_line: Option<f64>,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
}
