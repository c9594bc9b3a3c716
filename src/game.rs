use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Upstream team identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upstream game identifier (the NHL `gamePk`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static team metadata. Never mutated once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    /// Display name, e.g. "Golden Knights".
    pub name: String,
    pub full_name: String,
    pub short_name: String,
    pub abbreviation: String,
    pub venue_name: String,
    pub venue_city: String,
    pub venue_timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a tracked game. Variants are declared in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Archived,
}

impl GameStatus {
    /// Classify an upstream detailed-state string. `None` means the text is not recognised.
    pub fn classify(detailed_state: &str) -> Option<Self> {
        let state = detailed_state.trim();
        if state == "Scheduled" || state == "Pre-Game" {
            Some(GameStatus::Scheduled)
        } else if state.contains("In Progress") || state.contains("Game Over") {
            Some(GameStatus::InProgress)
        } else if state.contains("Final") || state == "Postponed" {
            Some(GameStatus::Final)
        } else {
            None
        }
    }

    /// Forward-only transitions; `Archived` is reachable from `Final` alone.
    pub fn can_advance_to(self, next: GameStatus) -> bool {
        match next {
            GameStatus::Archived => self == GameStatus::Final,
            _ => next > self,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "Scheduled",
            GameStatus::InProgress => "InProgress",
            GameStatus::Final => "Final",
            GameStatus::Archived => "Archived",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(GameStatus::Scheduled),
            "InProgress" => Ok(GameStatus::InProgress),
            "Final" => Ok(GameStatus::Final),
            "Archived" => Ok(GameStatus::Archived),
            other => Err(format!("unknown game status `{other}`")),
        }
    }
}

/// Identifier of a play within a game's feed.
///
/// Ordering is numeric when both ids are numeric, lexical otherwise, with numeric ids first,
/// so that "9" sorts before "10".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayId(String);

impl PlayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for PlayId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for PlayId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<usize> for PlayId {
    fn from(index: usize) -> Self {
        Self(index.to_string())
    }
}

/// Score as seen from the tracked side: `(mine, theirs)`. Persisted as a JSON pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScorePair(pub u32, pub u32);

impl ScorePair {
    pub fn mine(self) -> u32 {
        self.0
    }

    pub fn theirs(self) -> u32 {
        self.1
    }
}

/// Shared cooperative cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(atomic::Ordering::SeqCst)
    }
}

/// One game's state as tracked across polls.
///
/// Static fields are public; the progress fields are only changed through methods that keep
/// them append-only and the status monotonic.
#[derive(Debug, Clone)]
pub struct Game {
    pub id: GameId,
    pub home: Team,
    pub away: Team,
    pub start: DateTime<Utc>,
    /// Schedule date the game was discovered under.
    pub date: NaiveDate,
    pub venue: String,
    /// Side of the team whose games we follow.
    pub tracked: Side,
    status: GameStatus,
    notified_plays: BTreeSet<PlayId>,
    past_scores: Vec<ScorePair>,
    pre_notification_sent: bool,
    cancel: CancelFlag,
}

impl Game {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: GameId,
        home: Team,
        away: Team,
        start: DateTime<Utc>,
        date: NaiveDate,
        venue: String,
        tracked: Side,
        status: GameStatus,
    ) -> Self {
        Self {
            id,
            home,
            away,
            start,
            date,
            venue,
            tracked,
            status,
            notified_plays: BTreeSet::new(),
            past_scores: Vec::new(),
            pre_notification_sent: false,
            cancel: CancelFlag::new(),
        }
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Move to `next` if the transition is forward. Returns whether the status changed.
    pub fn advance_status(&mut self, next: GameStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn team(&self, side: Side) -> &Team {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn my_team(&self) -> &Team {
        self.team(self.tracked)
    }

    pub fn opponent(&self) -> &Team {
        self.team(self.tracked.opposite())
    }

    /// Which side a team id plays on in this game, if any.
    pub fn side_of(&self, team: TeamId) -> Option<Side> {
        if team == self.home.id {
            Some(Side::Home)
        } else if team == self.away.id {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn notified_plays(&self) -> &BTreeSet<PlayId> {
        &self.notified_plays
    }

    pub fn is_notified(&self, play: &PlayId) -> bool {
        self.notified_plays.contains(play)
    }

    /// Returns false if the play was already marked.
    pub fn mark_notified(&mut self, play: PlayId) -> bool {
        self.notified_plays.insert(play)
    }

    pub fn past_scores(&self) -> &[ScorePair] {
        &self.past_scores
    }

    /// Append a score pair. Returns false, leaving the history untouched, when the pair was
    /// already observed.
    pub fn record_score(&mut self, score: ScorePair) -> bool {
        if self.past_scores.contains(&score) {
            return false;
        }
        self.past_scores.push(score);
        true
    }

    pub fn pre_notification_sent(&self) -> bool {
        self.pre_notification_sent
    }

    /// Returns true only on the call that flips the flag.
    pub fn mark_pre_notification_sent(&mut self) -> bool {
        !std::mem::replace(&mut self.pre_notification_sent, true)
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Merge progress restored from the state store into a freshly built game.
    pub(crate) fn restore_progress(
        &mut self,
        status: Option<GameStatus>,
        notified: BTreeSet<PlayId>,
        past_scores: Vec<ScorePair>,
        pre_notification_sent: bool,
    ) {
        if let Some(persisted) = status {
            // The persisted status wins unless the fresh poll is further along.
            if persisted > self.status && persisted != GameStatus::Archived {
                self.status = persisted;
            }
        }
        self.notified_plays.extend(notified);
        for score in past_scores {
            self.record_score(score);
        }
        self.pre_notification_sent |= pre_notification_sent;
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.away.name, self.home.name)
    }
}
