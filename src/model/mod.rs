//! Wire types for the NHL stats API responses.

pub mod live;
pub mod schedule;
pub mod team;
