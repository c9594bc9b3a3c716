//! Capabilities the monitoring core consumes from the upstream stats service, and the
//! shapes of the data they return.

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;

use crate::error::UpstreamError;
use crate::game::{GameId, PlayId, Side, Team, TeamId};

/// One game as listed on a day's schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub id: GameId,
    /// Upstream detailed-state text, e.g. "Scheduled" or "In Progress - Critical".
    pub status: String,
    pub start: DateTime<Utc>,
    pub venue: String,
    pub home_id: TeamId,
    pub away_id: TeamId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub date: NaiveDate,
    pub total_games: u32,
    pub games: Vec<ScheduledGame>,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.total_games == 0 || self.games.is_empty()
    }
}

/// A single play from the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Play {
    pub description: String,
    pub game_winning: bool,
    /// Period ordinal label, e.g. "2nd" or "OT".
    pub period: String,
    pub time_remaining: String,
    pub home_goals: u32,
    pub away_goals: u32,
    pub team_id: Option<TeamId>,
}

impl Play {
    pub fn goals(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_goals,
            Side::Away => self.away_goals,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveData {
    pub status: String,
    pub plays: IndexMap<PlayId, Play>,
    pub scoring_plays: Vec<PlayId>,
}

pub trait ScheduleSource: Send + Sync {
    /// Games on `date`, optionally restricted to one team.
    fn fetch_schedule(&self, date: NaiveDate, team: Option<TeamId>) -> Result<Schedule, UpstreamError>;
}

pub trait LiveDataSource: Send + Sync {
    fn fetch_live(&self, game: GameId) -> Result<LiveData, UpstreamError>;
}

pub trait TeamSource: Send + Sync {
    fn fetch_team(&self, team: TeamId) -> Result<Team, UpstreamError>;

    /// Every team id the league lists.
    fn all_team_ids(&self) -> Result<Vec<TeamId>, UpstreamError>;
}
