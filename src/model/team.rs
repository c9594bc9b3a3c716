use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct TeamsDocument {
    #[serde(default)]
    pub teams: Vec<TeamRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub id: u32,
    /// Full name, e.g. "Vegas Golden Knights".
    pub name: String,
    pub abbreviation: String,
    pub team_name: String,
    #[serde(default)]
    pub location_name: Option<String>,
    pub short_name: String,
    pub venue: TeamVenue,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamVenue {
    pub name: String,
    pub city: String,
    pub time_zone: TimeZoneRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeZoneRef {
    pub id: String,
}
