//! API request handlers.

pub mod cron;
pub mod favorites;
pub mod health;
pub mod prices;
pub mod trade;
