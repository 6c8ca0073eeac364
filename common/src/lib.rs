//! TickerDeck Common Types
//!
//! This crate contains shared types used across the TickerDeck services,
//! including identifiers, monetary types, token universe definitions and
//! trade records.

pub mod identifiers;
pub mod monetary;
pub mod token;
pub mod trade;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use token::*;
pub use trade::*;
pub use error::*;
pub use time::*;
