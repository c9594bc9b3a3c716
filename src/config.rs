use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;

use crate::fleet::DEFAULT_DISCOVERY_WORKERS;
use crate::game::TeamId;
use crate::monitor::PRE_GAME_HOUR;
use crate::nhl::NHL_API_BASE_URL;

/// Vegas Golden Knights.
pub const DEFAULT_TEAM_ID: u32 = 54;

#[derive(Debug, Clone, PartialEq)]
pub enum StateBackend {
    Memory,
    File(PathBuf),
    Redis(String),
}

#[derive(Clone, PartialEq)]
pub enum NotifierConfig {
    Twilio { account_sid: String, auth_token: String },
    Discord,
    Log,
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierConfig::Twilio { account_sid, .. } => {
                f.debug_struct("Twilio").field("account_sid", account_sid).finish_non_exhaustive()
            }
            NotifierConfig::Discord => f.write_str("Discord"),
            NotifierConfig::Log => f.write_str("Log"),
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub team_id: TeamId,
    /// Follow every game of the day instead of only `team_id`'s.
    pub watch_all_games: bool,
    pub timezone: Tz,
    pub pre_game_hour: u32,
    pub cycle_interval: Duration,
    pub discovery_interval: Duration,
    pub discovery_workers: usize,
    pub http_timeout: Duration,
    pub state: StateBackend,
    pub notifier: NotifierConfig,
    pub sender: String,
    pub recipients: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so parsing can be exercised without touching the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base_url = get("NHL_API_BASE_URL").unwrap_or_else(|| NHL_API_BASE_URL.to_string());
        let team_id = TeamId(parse_or("TEAM_ID", get("TEAM_ID"), DEFAULT_TEAM_ID)?);
        let watch_all_games = get("WATCH_ALL_GAMES").map(|v| parse_bool(&v)).unwrap_or(false);

        let tz_name = get("TIMEZONE").unwrap_or_else(|| "America/Los_Angeles".to_string());
        let timezone = Tz::from_str(&tz_name)
            .map_err(|_| anyhow!("Invalid TIMEZONE: {tz_name} (expected IANA tz like America/Los_Angeles)"))?;

        let pre_game_hour = parse_or("PRE_GAME_HOUR", get("PRE_GAME_HOUR"), PRE_GAME_HOUR)?;
        if pre_game_hour > 23 {
            bail!("Invalid PRE_GAME_HOUR: {pre_game_hour} (expected 0-23)");
        }
        let cycle_interval = Duration::from_secs(parse_or("CYCLE_INTERVAL_SECS", get("CYCLE_INTERVAL_SECS"), 10)?);
        let discovery_interval =
            Duration::from_secs(parse_or("DISCOVERY_INTERVAL_SECS", get("DISCOVERY_INTERVAL_SECS"), 10)?);
        let discovery_workers = parse_or("DISCOVERY_WORKERS", get("DISCOVERY_WORKERS"), DEFAULT_DISCOVERY_WORKERS)?;
        let http_timeout = Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 10)?);

        let state = match get("STATE_BACKEND").as_deref() {
            Some("memory") => StateBackend::Memory,
            Some("file") => StateBackend::File(state_file(&get)),
            Some("redis") => {
                StateBackend::Redis(get("REDIS_URL").context("REDIS_URL must be set when STATE_BACKEND=redis")?)
            }
            Some(other) => bail!("Invalid STATE_BACKEND: {other} (expected memory, file or redis)"),
            None => match get("REDIS_URL") {
                Some(url) => StateBackend::Redis(url),
                None => StateBackend::File(state_file(&get)),
            },
        };

        let twilio = get("TWIL_ACCOUNT_SID").zip(get("TWIL_AUTH_TOKEN"));
        let notifier = match get("NOTIFIER").as_deref() {
            Some("twilio") => {
                let (account_sid, auth_token) =
                    twilio.context("TWIL_ACCOUNT_SID and TWIL_AUTH_TOKEN must be set when NOTIFIER=twilio")?;
                NotifierConfig::Twilio { account_sid, auth_token }
            }
            Some("discord") => NotifierConfig::Discord,
            Some("log") => NotifierConfig::Log,
            Some(other) => bail!("Invalid NOTIFIER: {other} (expected twilio, discord or log)"),
            None => match twilio {
                Some((account_sid, auth_token)) => NotifierConfig::Twilio { account_sid, auth_token },
                None => NotifierConfig::Log,
            },
        };

        let sender = get("FROM_NUMBER")
            .or_else(|| get("SENDER"))
            .unwrap_or_else(|| "hockey-score-notifier".to_string());
        if matches!(notifier, NotifierConfig::Twilio { .. }) && get("FROM_NUMBER").is_none() {
            bail!("FROM_NUMBER must be set when sending SMS through Twilio");
        }
        let recipients = match get("PHONEBOOK") {
            Some(raw) => parse_recipients(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            api_base_url,
            team_id,
            watch_all_games,
            timezone,
            pre_game_hour,
            cycle_interval,
            discovery_interval,
            discovery_workers,
            http_timeout,
            state,
            notifier,
            sender,
            recipients,
        })
    }

    /// Team filter for schedule discovery.
    pub fn team_filter(&self) -> Option<TeamId> {
        if self.watch_all_games { None } else { Some(self.team_id) }
    }
}

fn state_file(get: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(get("STATE_FILE").unwrap_or_else(|| "hockey-state.json".to_string()))
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw.parse::<T>().with_context(|| format!("Invalid {key}: {raw}")),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

/// Recipients as a JSON array of strings, or comma-separated.
pub fn parse_recipients(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    let list: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).with_context(|| format!("PHONEBOOK is not a JSON array of strings: {trimmed}"))?
    } else {
        trimmed.split(',').map(str::to_string).collect()
    };
    Ok(list.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}
