use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use tracing::{error, info_span, instrument};
use ureq::Agent;

use crate::error::UpstreamError;
use crate::game::{GameId, PlayId, Team, TeamId};
use crate::model;
use crate::source::{LiveData, LiveDataSource, Play, Schedule, ScheduleSource, ScheduledGame, TeamSource};

pub const NHL_API_BASE_URL: &str = "https://statsapi.web.nhl.com";
const SCHEDULE_LINK: &str = "/api/v1/schedule";
const TEAM_LINK: &str = "/api/v1/teams";

/// Blocking client for the NHL stats API. Implements every upstream source.
#[derive(Debug, Clone)]
pub struct NhlApi {
    base_url: String,
    agent: Agent,
}

impl NhlApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = Agent::new_with_config(Agent::config_builder().timeout_global(Some(timeout)).build());
        Self { base_url: base_url.trim_end_matches('/').to_string(), agent }
    }

    fn get_json<T: DeserializeOwned>(&self, link: &str, query: &[(&str, String)]) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, link);
        let response_result = {
            let _span = info_span!("nhl_fetch", url = %url).entered();
            let mut request = self.agent.get(&url);
            for (key, value) in query {
                request = request.query(*key, value);
            }
            request.call()
        };
        let response = response_result.map_err(|e| {
            error!(error = %e, url = %url, "Request failed");
            UpstreamError::from_ureq(&url, e)
        })?;
        let body = response.into_body().read_to_string().map_err(|e| {
            error!(error = %e, url = %url, "Failed to read response body");
            UpstreamError::from_ureq(&url, e)
        })?;
        parse_document(&body, &url)
    }

    /// Build a [`Schedule`] from a raw schedule response body (no network).
    pub fn parse_schedule(body: &str, date: NaiveDate) -> Result<Schedule, UpstreamError> {
        let doc: model::schedule::ScheduleDocument = parse_document(body, SCHEDULE_LINK)?;
        schedule_from_document(doc, date)
    }

    /// Build a [`Team`] from a raw team response body (no network).
    pub fn parse_team(body: &str) -> Result<Team, UpstreamError> {
        let doc: model::team::TeamsDocument = parse_document(body, TEAM_LINK)?;
        team_from_document(doc)
    }

    /// Build [`LiveData`] from a raw live feed body (no network).
    pub fn parse_live(body: &str) -> Result<LiveData, UpstreamError> {
        let feed: model::live::LiveFeed = parse_document(body, "feed/live")?;
        live_from_feed(feed)
    }
}

impl ScheduleSource for NhlApi {
    #[instrument(level = "info", skip(self))]
    fn fetch_schedule(&self, date: NaiveDate, team: Option<TeamId>) -> Result<Schedule, UpstreamError> {
        let day = date.format("%Y-%m-%d").to_string();
        let mut query = vec![("startDate", day.clone()), ("endDate", day)];
        if let Some(team) = team {
            query.push(("teamId", team.to_string()));
        }
        let doc: model::schedule::ScheduleDocument = self.get_json(SCHEDULE_LINK, &query)?;
        schedule_from_document(doc, date)
    }
}

impl LiveDataSource for NhlApi {
    #[instrument(level = "debug", skip(self))]
    fn fetch_live(&self, game: GameId) -> Result<LiveData, UpstreamError> {
        let feed: model::live::LiveFeed = self.get_json(&format!("/api/v1/game/{game}/feed/live"), &[])?;
        live_from_feed(feed)
    }
}

impl TeamSource for NhlApi {
    #[instrument(level = "info", skip(self))]
    fn fetch_team(&self, team: TeamId) -> Result<Team, UpstreamError> {
        let doc: model::team::TeamsDocument = self.get_json(&format!("{TEAM_LINK}/{team}"), &[])?;
        team_from_document(doc)
    }

    fn all_team_ids(&self) -> Result<Vec<TeamId>, UpstreamError> {
        let doc: model::team::TeamsDocument = self.get_json(TEAM_LINK, &[])?;
        Ok(doc.teams.iter().map(|t| TeamId(t.id)).collect())
    }
}

fn parse_document<T: DeserializeOwned>(body: &str, url: &str) -> Result<T, UpstreamError> {
    serde_json::from_str(body).map_err(|source| UpstreamError::Parse { url: url.to_string(), source })
}

/// Parse the schedule's `gameDate`, accepting RFC 3339 as well as the bare `Z` form.
fn parse_game_date(value: &str) -> Result<DateTime<Utc>, UpstreamError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ").map(|naive| naive.and_utc()))
        .map_err(|source| UpstreamError::InvalidTime { value: value.to_string(), source })
}

fn schedule_from_document(doc: model::schedule::ScheduleDocument, date: NaiveDate) -> Result<Schedule, UpstreamError> {
    let mut games = Vec::new();
    for game in doc.dates.into_iter().flat_map(|d| d.games) {
        games.push(ScheduledGame {
            id: GameId(game.game_pk),
            status: game.status.detailed_state,
            start: parse_game_date(&game.game_date)?,
            venue: game.venue.map(|v| v.name).unwrap_or_default(),
            home_id: TeamId(game.teams.home.team.id),
            away_id: TeamId(game.teams.away.team.id),
        });
    }
    Ok(Schedule { date, total_games: doc.total_games, games })
}

fn team_from_document(doc: model::team::TeamsDocument) -> Result<Team, UpstreamError> {
    let record = doc.teams.into_iter().next().ok_or_else(|| UpstreamError::MissingField {
        field: "teams",
        context: "team response".to_string(),
    })?;
    Ok(Team {
        id: TeamId(record.id),
        name: record.team_name,
        full_name: record.name,
        short_name: record.short_name,
        abbreviation: record.abbreviation,
        venue_name: record.venue.name,
        venue_city: record.venue.city,
        venue_timezone: record.venue.time_zone.id,
    })
}

fn live_from_feed(feed: model::live::LiveFeed) -> Result<LiveData, UpstreamError> {
    let plays: IndexMap<PlayId, Play> = feed
        .live_data
        .plays
        .all_plays
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let play = Play {
                description: record.result.description,
                game_winning: record.result.game_winning_goal.unwrap_or(false),
                period: record.about.ordinal_num,
                time_remaining: record.about.period_time_remaining,
                home_goals: record.about.goals.home,
                away_goals: record.about.goals.away,
                team_id: record.team.map(|t| TeamId(t.id)),
            };
            (PlayId::from(index), play)
        })
        .collect();
    let scoring_plays = feed.live_data.plays.scoring_plays.into_iter().map(PlayId::from).collect();
    Ok(LiveData { status: feed.game_data.status.detailed_state, plays, scoring_plays })
}
