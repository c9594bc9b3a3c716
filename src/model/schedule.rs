use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDocument {
    #[serde(default)]
    pub total_games: u32,
    #[serde(default)]
    pub dates: Vec<ScheduleDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleDate {
    pub date: String,
    #[serde(default)]
    pub games: Vec<ScheduleGame>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGame {
    pub game_pk: u64,
    /// UTC start, `YYYY-MM-DDTHH:MM:SSZ`.
    pub game_date: String,
    pub status: Status,
    pub teams: Matchup,
    #[serde(default)]
    pub venue: Option<VenueRef>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub detailed_state: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Matchup {
    pub home: MatchupSide,
    pub away: MatchupSide,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchupSide {
    pub team: TeamRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VenueRef {
    pub name: String,
}
