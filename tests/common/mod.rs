#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;

use hockey_score_notifier::error::{NotifyError, UpstreamError};
use hockey_score_notifier::game::{GameId, PlayId, Team, TeamId};
use hockey_score_notifier::monitor::{MonitorContext, MonitorSettings};
use hockey_score_notifier::notify::{NotificationDispatcher, Notifier};
use hockey_score_notifier::source::{
    LiveData, LiveDataSource, Play, Schedule, ScheduleSource, ScheduledGame, TeamSource,
};
use hockey_score_notifier::store::{MemoryStore, StateStore};
use hockey_score_notifier::team_cache::TeamCache;

pub const VGK: TeamId = TeamId(54);
pub const SJS: TeamId = TeamId(28);
pub const GAME: GameId = GameId(2019020001);

pub fn game_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 10, 2).unwrap()
}

pub fn team(id: TeamId) -> Team {
    match id.0 {
        54 => Team {
            id,
            name: "Golden Knights".into(),
            full_name: "Vegas Golden Knights".into(),
            short_name: "Vegas".into(),
            abbreviation: "VGK".into(),
            venue_name: "T-Mobile Arena".into(),
            venue_city: "Las Vegas".into(),
            venue_timezone: "America/Los_Angeles".into(),
        },
        28 => Team {
            id,
            name: "Sharks".into(),
            full_name: "San Jose Sharks".into(),
            short_name: "San Jose".into(),
            abbreviation: "SJS".into(),
            venue_name: "SAP Center at San Jose".into(),
            venue_city: "San Jose".into(),
            venue_timezone: "America/Los_Angeles".into(),
        },
        other => Team {
            id,
            name: format!("Team {other}"),
            full_name: format!("Full Team {other}"),
            short_name: format!("Short {other}"),
            abbreviation: format!("T{other}"),
            venue_name: format!("Arena {other}"),
            venue_city: "Somewhere".into(),
            venue_timezone: "America/New_York".into(),
        },
    }
}

pub fn upstream_down() -> UpstreamError {
    UpstreamError::Status { url: "fake://upstream".into(), status: 503 }
}

/// Team source that counts fetches per id.
#[derive(Default)]
pub struct FakeTeams {
    pub calls: Mutex<HashMap<TeamId, usize>>,
    pub failing: Mutex<Vec<TeamId>>,
}

impl FakeTeams {
    pub fn calls_for(&self, id: TeamId) -> usize {
        self.calls.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

impl TeamSource for FakeTeams {
    fn fetch_team(&self, id: TeamId) -> Result<Team, UpstreamError> {
        *self.calls.lock().entry(id).or_default() += 1;
        if self.failing.lock().contains(&id) {
            return Err(upstream_down());
        }
        Ok(team(id))
    }

    fn all_team_ids(&self) -> Result<Vec<TeamId>, UpstreamError> {
        Ok((1..=32).map(TeamId).collect())
    }
}

/// Live feed returning queued responses, then repeating the current one.
#[derive(Default)]
pub struct FakeLive {
    current: Mutex<Option<LiveData>>,
    queued: Mutex<VecDeque<Result<LiveData, UpstreamError>>>,
    latency: Mutex<Duration>,
    pub calls: AtomicUsize,
}

impl FakeLive {
    pub fn new(live: LiveData) -> Self {
        let fake = Self::default();
        fake.set(live);
        fake
    }

    pub fn set(&self, live: LiveData) {
        *self.current.lock() = Some(live);
    }

    /// Make every fetch block for `latency`, like a slow upstream.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn push_error(&self) {
        self.queued.lock().push_back(Err(upstream_down()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LiveDataSource for FakeLive {
    fn fetch_live(&self, _game: GameId) -> Result<LiveData, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if let Some(next) = self.queued.lock().pop_front() {
            return next;
        }
        self.current.lock().clone().ok_or_else(upstream_down)
    }
}

pub struct FakeSchedule {
    pub games: Vec<ScheduledGame>,
    pub requested: Mutex<Vec<(NaiveDate, Option<TeamId>)>>,
}

impl FakeSchedule {
    pub fn new(games: Vec<ScheduledGame>) -> Self {
        Self { games, requested: Mutex::new(Vec::new()) }
    }
}

impl ScheduleSource for FakeSchedule {
    fn fetch_schedule(&self, date: NaiveDate, team: Option<TeamId>) -> Result<Schedule, UpstreamError> {
        self.requested.lock().push((date, team));
        let games: Vec<ScheduledGame> = self
            .games
            .iter()
            .filter(|g| team.is_none_or(|t| g.home_id == t || g.away_id == t))
            .cloned()
            .collect();
        Ok(Schedule { date, total_games: games.len() as u32, games })
    }
}

/// Notifier recording every message; recipients listed in `failing` are rejected.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub failing: Vec<String>,
}

impl RecordingNotifier {
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self { sent: Mutex::new(Vec::new()), failing: recipients.iter().map(|r| r.to_string()).collect() }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(message, _, _)| message.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, message: &str, recipient: &str, sender: &str) -> Result<(), NotifyError> {
        if self.failing.iter().any(|r| r == recipient) {
            return Err(NotifyError::Rejected { recipient: recipient.to_string(), status: 400 });
        }
        self.sent.lock().push((message.to_string(), recipient.to_string(), sender.to_string()));
        Ok(())
    }
}

pub fn scheduled_game(status: &str) -> ScheduledGame {
    ScheduledGame {
        id: GAME,
        status: status.to_string(),
        start: Utc.with_ymd_and_hms(2019, 10, 3, 2, 0, 0).unwrap(),
        venue: "T-Mobile Arena".into(),
        home_id: VGK,
        away_id: SJS,
    }
}

pub fn schedule(status: &str) -> Schedule {
    Schedule { date: game_date(), total_games: 1, games: vec![scheduled_game(status)] }
}

/// A goal by `team` leaving the score at `home`-`away`.
pub fn goal(team: TeamId, home: u32, away: u32) -> Play {
    Play {
        description: format!("Goal by team {team} ({home}-{away})"),
        game_winning: false,
        period: "2nd".into(),
        time_remaining: "12:34".into(),
        home_goals: home,
        away_goals: away,
        team_id: Some(team),
    }
}

pub fn live(status: &str, goals: Vec<(&str, Play)>) -> LiveData {
    let mut plays: IndexMap<PlayId, Play> = IndexMap::new();
    let mut scoring_plays = Vec::new();
    for (id, play) in goals {
        plays.insert(PlayId::from(id), play);
        scoring_plays.push(PlayId::from(id));
    }
    LiveData { status: status.to_string(), plays, scoring_plays }
}

pub struct Harness {
    pub teams: Arc<FakeTeams>,
    pub live: Arc<FakeLive>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx: MonitorContext,
}

impl Harness {
    pub fn new(live: LiveData) -> Self {
        Self::with_store(live, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(live: LiveData, store: Arc<MemoryStore>) -> Self {
        let teams = Arc::new(FakeTeams::default());
        let live = Arc::new(FakeLive::new(live));
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = MonitorContext {
            teams: Arc::new(TeamCache::new(teams.clone())),
            live: live.clone(),
            store: store.clone(),
            dispatcher: Arc::new(NotificationDispatcher::new(notifier.clone(), "+15550000000")),
            settings: MonitorSettings {
                tracked_team: Some(VGK),
                timezone: chrono_tz::America::Los_Angeles,
                pre_game_hour: 7,
                cycle_interval: Duration::from_millis(5),
                recipients: vec!["+15551111111".into(), "+15552222222".into()],
            },
        };
        Self { teams, live, store, notifier, ctx }
    }

    pub fn store_value(&self, field: &str) -> Option<String> {
        self.store.get(&format!("game:{GAME}:{field}")).unwrap()
    }
}
