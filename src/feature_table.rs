use std::collections::{BTreeSet, HashSet};

use anyhow::{Result, anyhow};
use thiserror::Error;
use tracing::info;

use crate::matrix::FeatureMatrix;
use crate::records::{CountingStat, PlayerWeek, PositionGroup};
use crate::schedule_context::ShiftedContextIndex;
use crate::temporal::TemporalFeatures;

pub const IDENTITY_COLUMNS: [&str; 8] = [
    "player_id",
    "player_name",
    "recent_team",
    "position",
    "season",
    "week",
    "season_type",
    "opponent_team",
];
pub const LEAKAGE_COLUMNS: [&str; 1] = ["fantasy_points"];
pub const TARGET_COLUMN: &str = "fantasy_points_ppr";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureColumn {
    SpreadLine,
    TotalLine,
    IsHome,
    IsAway,
    Lagged(CountingStat),
    Roll3(CountingStat),
    Roll5(CountingStat),
    Position(PositionGroup),
}

impl FeatureColumn {
    pub fn name(self) -> String {
        match self {
            FeatureColumn::SpreadLine => "spread_line".to_string(),
            FeatureColumn::TotalLine => "total_line".to_string(),
            FeatureColumn::IsHome => "is_home".to_string(),
            FeatureColumn::IsAway => "is_away".to_string(),
            FeatureColumn::Lagged(stat) => stat.column().to_string(),
            FeatureColumn::Roll3(stat) => format!("{}_roll3", stat.column()),
            FeatureColumn::Roll5(stat) => format!("{}_roll5", stat.column()),
            FeatureColumn::Position(pos) => pos.indicator_column().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("table column `{0}` is not classified as identity, leakage, target or feature")]
    Unclassified(String),
    #[error("schema column `{0}` is missing from the feature table")]
    Missing(String),
    #[error("column `{0}` is classified more than once")]
    Duplicate(String),
}

/// Declared split of the table's columns. Training and evaluation both read
/// exactly `features`, in this order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    pub identity: Vec<String>,
    pub leakage: Vec<String>,
    pub target: String,
    pub features: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn standard() -> Self {
        let mut features = vec![
            FeatureColumn::SpreadLine,
            FeatureColumn::TotalLine,
            FeatureColumn::IsHome,
            FeatureColumn::IsAway,
        ];
        for stat in CountingStat::ALL {
            features.push(FeatureColumn::Lagged(stat));
            features.push(FeatureColumn::Roll3(stat));
            features.push(FeatureColumn::Roll5(stat));
        }
        features.extend(PositionGroup::ALL.map(FeatureColumn::Position));

        Self {
            identity: IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            leakage: LEAKAGE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            target: TARGET_COLUMN.to_string(),
            features,
        }
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn validate(&self, table_columns: &[String]) -> Result<(), SchemaError> {
        let mut classified: HashSet<String> = HashSet::new();
        let declared = self
            .identity
            .iter()
            .chain(&self.leakage)
            .cloned()
            .chain(std::iter::once(self.target.clone()))
            .chain(self.feature_names());
        for name in declared {
            if !classified.insert(name.clone()) {
                return Err(SchemaError::Duplicate(name));
            }
        }

        let present: HashSet<&str> = table_columns.iter().map(|c| c.as_str()).collect();
        if let Some(col) = table_columns.iter().find(|c| !classified.contains(*c)) {
            return Err(SchemaError::Unclassified(col.clone()));
        }
        let mut missing = classified
            .iter()
            .filter(|c| !present.contains(c.as_str()))
            .collect::<Vec<_>>();
        missing.sort();
        if let Some(col) = missing.first() {
            return Err(SchemaError::Missing((*col).clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredFeatureRow {
    pub player: PlayerWeek,
    pub spread_line: Option<f64>,
    pub total_line: Option<f64>,
    pub is_home: Option<f64>,
    pub is_away: Option<f64>,
    pub temporal: TemporalFeatures,
    pub position_indicators: [f64; 4],
}

impl EngineeredFeatureRow {
    pub fn new(
        player: PlayerWeek,
        temporal: TemporalFeatures,
        context: &ShiftedContextIndex,
    ) -> Self {
        let shifted = context.get(player.season, player.week, &player.recent_team);
        let is_home = shifted
            .and_then(|c| c.is_home)
            .map(|home| if home { 1.0 } else { 0.0 });
        let mut position_indicators = [0.0; 4];
        position_indicators[player.position_group.index()] = 1.0;

        Self {
            spread_line: shifted.and_then(|c| c.spread_line),
            total_line: shifted.and_then(|c| c.total_line),
            is_home,
            is_away: is_home.map(|h| 1.0 - h),
            temporal,
            position_indicators,
            player,
        }
    }

    pub fn position(&self) -> PositionGroup {
        self.player.position_group
    }

    pub fn position_indicator(&self, pos: PositionGroup) -> f64 {
        self.position_indicators[pos.index()]
    }

    pub fn feature_value(&self, column: FeatureColumn) -> Option<f64> {
        match column {
            FeatureColumn::SpreadLine => self.spread_line,
            FeatureColumn::TotalLine => self.total_line,
            FeatureColumn::IsHome => self.is_home,
            FeatureColumn::IsAway => self.is_away,
            FeatureColumn::Lagged(stat) => self.temporal.lagged[stat.index()],
            FeatureColumn::Roll3(stat) => self.temporal.roll3[stat.index()],
            FeatureColumn::Roll5(stat) => self.temporal.roll5[stat.index()],
            FeatureColumn::Position(pos) => Some(self.position_indicator(pos)),
        }
    }

    pub fn column_names() -> Vec<String> {
        let mut out = [
            "player_id",
            "player_name",
            "position",
            "recent_team",
            "opponent_team",
            "season",
            "week",
            "season_type",
            "fantasy_points",
            "fantasy_points_ppr",
            "spread_line",
            "total_line",
            "is_home",
            "is_away",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
        for stat in CountingStat::ALL {
            out.push(stat.column().to_string());
            out.push(format!("{}_roll3", stat.column()));
            out.push(format!("{}_roll5", stat.column()));
        }
        for pos in PositionGroup::ALL {
            out.push(pos.indicator_column().to_string());
        }
        out
    }

    pub fn cells(&self) -> Vec<String> {
        let p = &self.player;
        let mut out = vec![
            p.player_id.clone(),
            p.player_name.clone(),
            p.position.clone(),
            p.recent_team.clone(),
            p.opponent_team.clone(),
            p.season.to_string(),
            p.week.to_string(),
            p.season_type.as_str().to_string(),
            opt_to_string(p.fantasy_points),
            p.fantasy_points_ppr.to_string(),
            opt_to_string(self.spread_line),
            opt_to_string(self.total_line),
            opt_to_string(self.is_home),
            opt_to_string(self.is_away),
        ];
        for stat in CountingStat::ALL {
            let i = stat.index();
            out.push(opt_to_string(self.temporal.lagged[i]));
            out.push(opt_to_string(self.temporal.roll3[i]));
            out.push(opt_to_string(self.temporal.roll5[i]));
        }
        for pos in PositionGroup::ALL {
            out.push(self.position_indicator(pos).to_string());
        }
        out
    }
}

fn opt_to_string(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct FeatureTable {
    schema: FeatureSchema,
    columns: Vec<String>,
    rows: Vec<EngineeredFeatureRow>,
}

impl FeatureTable {
    /// Left-joins shifted team context onto each player-week and attaches
    /// its temporal features. `temporal` must be aligned with `players`.
    pub fn assemble(
        players: Vec<PlayerWeek>,
        temporal: Vec<TemporalFeatures>,
        context: &ShiftedContextIndex,
        schema: FeatureSchema,
    ) -> Result<Self> {
        if players.len() != temporal.len() {
            return Err(anyhow!(
                "temporal features cover {} rows but there are {} player rows",
                temporal.len(),
                players.len()
            ));
        }

        let columns = EngineeredFeatureRow::column_names();
        schema.validate(&columns)?;

        let rows = players
            .into_iter()
            .zip(temporal)
            .map(|(player, features)| EngineeredFeatureRow::new(player, features, context))
            .collect::<Vec<_>>();
        let unmatched = rows.iter().filter(|r| r.is_home.is_none()).count();
        info!(
            rows = rows.len(),
            features = schema.features.len(),
            without_context = unmatched,
            "assembled feature table"
        );

        Ok(Self {
            schema,
            columns,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[EngineeredFeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_matrix<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a EngineeredFeatureRow>,
    ) -> Result<FeatureMatrix> {
        let mut matrix = FeatureMatrix::new(self.schema.feature_names());
        let mut buf = Vec::with_capacity(self.schema.features.len());
        for row in rows {
            buf.clear();
            buf.extend(
                self.schema
                    .features
                    .iter()
                    .map(|col| row.feature_value(*col).unwrap_or(f64::NAN)),
            );
            matrix.push_row(&buf)?;
        }
        Ok(matrix)
    }

    pub fn targets<'a>(rows: impl IntoIterator<Item = &'a EngineeredFeatureRow>) -> Vec<f64> {
        rows.into_iter()
            .map(|r| r.player.fantasy_points_ppr)
            .collect()
    }

    pub fn seasons(&self) -> Vec<i32> {
        let seasons: BTreeSet<i32> = self.rows.iter().map(|r| r.player.season).collect();
        seasons.into_iter().collect()
    }
}
