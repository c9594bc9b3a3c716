use serde::{Deserialize, Serialize};

use crate::model::schedule::{Status, TeamRef};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveFeed {
    pub game_data: GameData,
    pub live_data: LiveDataDocument,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GameData {
    pub status: Status,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiveDataDocument {
    pub plays: Plays,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plays {
    #[serde(default)]
    pub all_plays: Vec<PlayRecord>,
    /// Indexes into `all_plays`.
    #[serde(default)]
    pub scoring_plays: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayRecord {
    pub result: PlayResult,
    pub about: About,
    #[serde(default)]
    pub team: Option<TeamRef>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResult {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub game_winning_goal: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    #[serde(default)]
    pub ordinal_num: String,
    #[serde(default)]
    pub period_time_remaining: String,
    #[serde(default)]
    pub goals: Goals,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Goals {
    pub home: u32,
    pub away: u32,
}
