//! Polls the NHL stats API for a day's games and texts pre-game and scoring updates.

pub mod config;
pub mod discord;
pub mod error;
pub mod event;
pub mod fleet;
pub mod game;
pub mod model;
pub mod monitor;
pub mod nhl;
pub mod notify;
pub mod source;
pub mod store;
pub mod team_cache;
pub mod twilio;
