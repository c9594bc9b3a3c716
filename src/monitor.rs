//! Per-game polling state machine.
//!
//! A [`GameMonitor`] owns one [`Game`]. Each [`GameMonitor::tick`] polls the live feed once,
//! advances the status, and returns the notifications that became due. [`GameMonitor::run`]
//! repeats that on a fixed cycle until the game is done or cancellation is requested.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::error::{MonitorError, StoreError, UpstreamError};
use crate::event::{NotificationEvent, PreGameNotice, ScoreUpdate};
use crate::game::{Game, GameStatus, PlayId, ScorePair, Side, Team, TeamId};
use crate::notify::NotificationDispatcher;
use crate::source::{LiveData, LiveDataSource, Play, Schedule, ScheduledGame};
use crate::store::{self, GameKeys, StateStore, field};
use crate::team_cache::TeamCache;

/// Local hour at which the pre-game message goes out.
pub const PRE_GAME_HOUR: u32 = 7;
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Team whose perspective messages are written from. Games without it are framed from
    /// the home side.
    pub tracked_team: Option<TeamId>,
    /// Recipients' timezone, used for the pre-game trigger and rendered start times.
    pub timezone: Tz,
    pub pre_game_hour: u32,
    pub cycle_interval: Duration,
    pub recipients: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tracked_team: None,
            timezone: chrono_tz::America::Los_Angeles,
            pre_game_hour: PRE_GAME_HOUR,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            recipients: Vec::new(),
        }
    }
}

/// Collaborators shared by every monitor, constructed once by the process entry point.
#[derive(Clone)]
pub struct MonitorContext {
    pub teams: Arc<TeamCache>,
    pub live: Arc<dyn LiveDataSource>,
    pub store: Arc<dyn StateStore>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub settings: MonitorSettings,
}

pub struct GameMonitor {
    game: Game,
    keys: GameKeys,
    ctx: MonitorContext,
}

/// Progress previously written for a game under the current schedule date.
#[derive(Default)]
struct Persisted {
    teams: Option<(Team, Team)>,
    status: Option<GameStatus>,
    notified: BTreeSet<PlayId>,
    past_scores: Vec<ScorePair>,
    pre_sent: bool,
}

impl GameMonitor {
    /// Wrap an already-initialized game.
    pub fn new(game: Game, ctx: MonitorContext) -> Self {
        let keys = GameKeys::new(game.id);
        Self { game, keys, ctx }
    }

    /// Initialize the first game of a team-filtered schedule.
    pub async fn initialize(ctx: MonitorContext, schedule: &Schedule) -> Result<Self, MonitorError> {
        let entry = match schedule.games.first() {
            Some(entry) if !schedule.is_empty() => entry,
            _ => return Err(MonitorError::ScheduleEmpty { date: schedule.date }),
        };
        Self::from_scheduled(ctx, schedule.date, entry).await
    }

    /// Build a monitor for one schedule entry, resuming any progress held in the store.
    ///
    /// Static fields are written once per schedule date; later calls on the same date reuse
    /// the stored teams instead of hitting the team source. Progress stamped with any other
    /// date belongs to an earlier schedule entry and is discarded.
    pub async fn from_scheduled(ctx: MonitorContext, date: NaiveDate, entry: &ScheduledGame) -> Result<Self, MonitorError> {
        let polled = GameStatus::classify(&entry.status).ok_or_else(|| UpstreamError::UnknownStatus(entry.status.clone()))?;
        let keys = GameKeys::new(entry.id);

        let persisted = {
            let store = Arc::clone(&ctx.store);
            let keys = keys.clone();
            tokio::task::spawn_blocking(move || load_or_reset(store.as_ref(), &keys, date)).await??
        };
        let already_stored = persisted.teams.is_some();

        let (home, away) = match persisted.teams {
            Some((home, away)) if home.id == entry.home_id && away.id == entry.away_id => {
                ctx.teams.seed(home.clone());
                ctx.teams.seed(away.clone());
                (home, away)
            }
            _ => ctx.teams.resolve_pair(entry.home_id, entry.away_id).await?,
        };

        let tracked = match ctx.settings.tracked_team {
            Some(team) if team == away.id => Side::Away,
            _ => Side::Home,
        };
        let mut game = Game::new(entry.id, home, away, entry.start, date, entry.venue.clone(), tracked, polled);
        game.restore_progress(persisted.status, persisted.notified, persisted.past_scores, persisted.pre_sent);

        // A game first seen as already final has nothing to announce; leave the store alone.
        if !already_stored && game.status() != GameStatus::Final {
            let store = Arc::clone(&ctx.store);
            let keys = keys.clone();
            let snapshot = game.clone();
            tokio::task::spawn_blocking(move || persist_static(store.as_ref(), &keys, &snapshot)).await??;
            debug!(game_id = %game.id, "Stored static game fields");
        }

        info!(game_id = %game.id, game = %game, status = %game.status(), tracked = %game.tracked, "Game initialized");
        Ok(Self { game, keys, ctx })
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn into_game(self) -> Game {
        self.game
    }

    /// True once nothing further can happen for this game.
    pub fn is_finished(&self) -> bool {
        match self.game.status() {
            GameStatus::Archived => true,
            GameStatus::Final => !self.game.pre_notification_sent(),
            _ => false,
        }
    }

    /// One poll-classify-diff cycle at the current wall-clock time.
    pub fn tick(&mut self) -> Result<Vec<NotificationEvent>, MonitorError> {
        self.tick_at(Utc::now())
    }

    /// One poll-classify-diff cycle, with `now` supplied to keep the pre-game trigger testable.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<Vec<NotificationEvent>, MonitorError> {
        if self.game.status() == GameStatus::Archived {
            return Ok(Vec::new());
        }

        let live = self.ctx.live.fetch_live(self.game.id)?;
        let previous = self.game.status();
        let polled = GameStatus::classify(&live.status).ok_or_else(|| UpstreamError::UnknownStatus(live.status.clone()))?;
        if self.game.advance_status(polled) {
            info!(game_id = %self.game.id, from = %previous, to = %polled, "Game status changed");
            self.persist(field::STATUS, polled.as_str());
        } else if polled < previous {
            debug!(game_id = %self.game.id, current = %previous, polled = %polled, "Ignoring status regression");
        }

        let mut events = Vec::new();
        match self.game.status() {
            GameStatus::Scheduled => events.extend(self.check_pre_game(now)),
            GameStatus::InProgress => events.extend(self.check_scoring(&live)?),
            GameStatus::Final => {
                // Goals scored since the last in-progress poll still get announced.
                if previous < GameStatus::Final {
                    events.extend(self.check_scoring(&live)?);
                }
                self.archive_if_announced()?;
            }
            GameStatus::Archived => {}
        }
        Ok(events)
    }

    fn check_pre_game(&mut self, now: DateTime<Utc>) -> Option<NotificationEvent> {
        if self.game.pre_notification_sent() {
            debug!(game_id = %self.game.id, "Pre-game notification already sent");
            return None;
        }
        let tz = self.ctx.settings.timezone;
        if now.with_timezone(&tz).hour() < self.ctx.settings.pre_game_hour {
            return None;
        }
        if !self.game.mark_pre_notification_sent() {
            return None;
        }
        self.persist(field::PRE_SENT, "Yes");

        let notice = PreGameNotice {
            game_id: self.game.id,
            tracked: self.game.tracked,
            my_team: self.game.my_team().name.clone(),
            opponent_full_name: self.game.opponent().full_name.clone(),
            venue: self.game.venue.clone(),
            start_local: self.game.start.with_timezone(&tz).format("%-I:%M %p").to_string(),
        };
        Some(NotificationEvent::PreGame(notice))
    }

    /// Emit one event per scoring play not yet notified, in ascending play order.
    fn check_scoring(&mut self, live: &LiveData) -> Result<Vec<NotificationEvent>, MonitorError> {
        let unnotified: BTreeSet<&PlayId> = live.scoring_plays.iter().filter(|id| !self.game.is_notified(id)).collect();
        if unnotified.is_empty() {
            return Ok(Vec::new());
        }

        // Validate the whole batch first so a malformed play cannot leave it half-applied.
        let mut batch: Vec<(&PlayId, &Play, Side)> = Vec::with_capacity(unnotified.len());
        for id in unnotified {
            let play = live.plays.get(id).ok_or_else(|| UpstreamError::MissingField {
                field: "allPlays",
                context: format!("scoring play {id} of game {}", self.game.id),
            })?;
            let scoring_side = play.team_id.and_then(|team| self.game.side_of(team)).ok_or_else(|| {
                UpstreamError::MissingField { field: "team", context: format!("scoring play {id} of game {}", self.game.id) }
            })?;
            batch.push((id, play, scoring_side));
        }

        let mut events = Vec::new();
        for (id, play, scoring_side) in batch {
            let tracked = self.game.tracked;
            let score = ScorePair(play.goals(tracked), play.goals(tracked.opposite()));
            if !self.game.record_score(score) {
                info!(game_id = %self.game.id, play = %id, mine = score.mine(), theirs = score.theirs(), "Duplicate scoring play; not notified");
                self.game.mark_notified(id.clone());
                continue;
            }
            self.persist_json(field::PAST_SCORES, self.game.past_scores());

            let update = ScoreUpdate {
                game_id: self.game.id,
                play_id: id.clone(),
                scoring_side,
                tracked,
                my_team: self.game.my_team().name.clone(),
                opponent: self.game.opponent().name.clone(),
                my_abbrev: self.game.my_team().abbreviation.clone(),
                opponent_abbrev: self.game.opponent().abbreviation.clone(),
                period: play.period.clone(),
                time_remaining: play.time_remaining.clone(),
                my_score: score.mine(),
                opponent_score: score.theirs(),
                description: play.description.clone(),
            };
            info!(game_id = %self.game.id, play = %id, side = %scoring_side, mine = score.mine(), theirs = score.theirs(), "Scoring play");
            events.push(if play.game_winning {
                NotificationEvent::GameWinningScore(update)
            } else {
                NotificationEvent::Score(update)
            });
            self.game.mark_notified(id.clone());
        }
        self.persist_json(field::NOTIFIED_PLAYS, self.game.notified_plays());
        Ok(events)
    }

    /// Clear the stored state of a final game once it has been announced.
    fn archive_if_announced(&mut self) -> Result<(), StoreError> {
        if !self.game.pre_notification_sent() {
            debug!(game_id = %self.game.id, "Final game was never announced; nothing to clean up");
            return Ok(());
        }
        let removed = self.ctx.store.clear_namespace(self.keys.namespace())?;
        self.game.advance_status(GameStatus::Archived);
        info!(game_id = %self.game.id, removed, "Game archived; state cleared");
        Ok(())
    }

    /// In-memory state is authoritative; a failed write is retried by the next write of the
    /// same key.
    fn persist(&self, name: &str, value: &str) {
        if let Err(e) = self.ctx.store.set(&self.keys.key(name), value) {
            warn!(game_id = %self.game.id, key = name, error = %e, "Failed to persist game state");
        }
    }

    fn persist_json<T: serde::Serialize + ?Sized>(&self, name: &str, value: &T) {
        if let Err(e) = store::write_json(self.ctx.store.as_ref(), &self.keys.key(name), value) {
            warn!(game_id = %self.game.id, key = name, error = %e, "Failed to persist game state");
        }
    }

    /// Poll until the game is done or cancellation is requested, dispatching every event.
    ///
    /// Cancellation is checked once per cycle; an in-flight poll always completes.
    pub fn run(mut self) -> Game {
        info!(game_id = %self.game.id, game = %self.game, "Monitor started");
        let cycle = self.ctx.settings.cycle_interval;
        while !self.game.cancel_requested() {
            let started = Instant::now();
            match self.tick() {
                Ok(events) => {
                    for event in &events {
                        self.ctx.dispatcher.dispatch(event, &self.ctx.settings.recipients);
                    }
                }
                Err(e) => error!(game_id = %self.game.id, error = %e, "Poll failed; retrying next cycle"),
            }
            if self.is_finished() {
                self.game.request_cancel();
                continue;
            }
            std::thread::sleep(cycle.saturating_sub(started.elapsed()));
        }
        info!(game_id = %self.game.id, game = %self.game, status = %self.game.status(), "Monitor finished");
        self.game
    }
}

/// Load the game's progress when it was written for `date`; otherwise clear whatever an
/// earlier schedule entry of the same game id left behind.
fn load_or_reset(store: &dyn StateStore, keys: &GameKeys, date: NaiveDate) -> Result<Persisted, StoreError> {
    let stamped = store.get(&keys.key(field::PRE_UPDATED))?;
    if stamped.as_deref() != Some(date.to_string().as_str()) {
        let removed = store.clear_namespace(keys.namespace())?;
        if removed > 0 {
            info!(namespace = keys.namespace(), stamped = ?stamped, %date, removed, "Discarded state from an earlier schedule date");
        }
        return Ok(Persisted::default());
    }

    let home: Option<Team> = store::read_json(store, &keys.key(field::HOME_TEAM))?;
    let away: Option<Team> = store::read_json(store, &keys.key(field::AWAY_TEAM))?;
    Ok(Persisted {
        teams: home.zip(away),
        status: store.get(&keys.key(field::STATUS))?.and_then(|s| s.parse().ok()),
        notified: store::read_json(store, &keys.key(field::NOTIFIED_PLAYS))?,
        past_scores: store::read_json(store, &keys.key(field::PAST_SCORES))?,
        pre_sent: store.get(&keys.key(field::PRE_SENT))?.as_deref() == Some("Yes"),
    })
}

fn persist_static(store: &dyn StateStore, keys: &GameKeys, game: &Game) -> Result<(), StoreError> {
    store.set(&keys.key(field::DATE), &game.date.to_string())?;
    store.set(&keys.key(field::START_TIME), &game.start.to_rfc3339())?;
    store.set(&keys.key(field::VENUE), &game.venue)?;
    store.set(&keys.key(field::STATUS), game.status().as_str())?;
    store.set(&keys.key(field::MY_FIELD), game.tracked.as_str())?;
    store.set(&keys.key(field::OPP_ID), &game.opponent().id.to_string())?;
    store::write_json(store, &keys.key(field::HOME_TEAM), &game.home)?;
    store::write_json(store, &keys.key(field::AWAY_TEAM), &game.away)?;
    // Written last: its presence means every field above is in place.
    store.set(&keys.key(field::PRE_UPDATED), &game.date.to_string())
}
