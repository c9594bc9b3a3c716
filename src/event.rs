use crate::game::{GameId, PlayId, Side};

/// Something worth telling the recipients about.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    PreGame(PreGameNotice),
    Score(ScoreUpdate),
    GameWinningScore(ScoreUpdate),
}

impl NotificationEvent {
    pub fn game_id(&self) -> GameId {
        match self {
            NotificationEvent::PreGame(notice) => notice.game_id,
            NotificationEvent::Score(update) | NotificationEvent::GameWinningScore(update) => update.game_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::PreGame(_) => "pre_game",
            NotificationEvent::Score(_) => "score",
            NotificationEvent::GameWinningScore(_) => "game_winning_score",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreGameNotice {
    pub game_id: GameId,
    pub tracked: Side,
    pub my_team: String,
    pub opponent_full_name: String,
    pub venue: String,
    /// Start time already rendered in the recipients' timezone, e.g. "7:00 PM".
    pub start_local: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub game_id: GameId,
    pub play_id: PlayId,
    pub scoring_side: Side,
    pub tracked: Side,
    pub my_team: String,
    pub opponent: String,
    pub my_abbrev: String,
    pub opponent_abbrev: String,
    pub period: String,
    pub time_remaining: String,
    pub my_score: u32,
    pub opponent_score: u32,
    pub description: String,
}

impl ScoreUpdate {
    pub fn we_scored(&self) -> bool {
        self.scoring_side == self.tracked
    }

    /// Name of the team that scored.
    pub fn scorer(&self) -> &str {
        if self.we_scored() { &self.my_team } else { &self.opponent }
    }
}
