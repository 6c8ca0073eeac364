//! Simulated trade records.

use crate::{Currency, IdempotencyKey, TokenId, TradeId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Sign applied to slippage: buyers pay up, sellers receive less.
    pub fn slippage_sign(&self) -> Decimal {
        match self {
            TradeSide::Buy => Decimal::ONE,
            TradeSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Request to execute a simulated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub user_id: UserId,
    pub token_id: TokenId,
    pub side: TradeSide,
    /// Token quantity.
    pub quantity: Decimal,
    /// Currency to price the fill in; the service's local currency if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
}

/// Result of a simulated trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub trade_id: TradeId,
    pub user_id: UserId,
    pub token_id: TokenId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    /// Fill price per unit, slippage included.
    pub price: Decimal,
    /// `price * quantity`, rounded to the currency.
    pub notional: Decimal,
    pub currency: Currency,
    /// USD to `currency` rate used for pricing.
    pub fx_rate: Decimal,
    /// Provider of the underlying price.
    pub price_source: String,
    pub executed_at: DateTime<Utc>,
    /// Always true: nothing is routed to a venue.
    pub simulated: bool,
}

/// Stored outcome of an executed trade, keyed by idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    /// SHA-256 hex digest of the request that produced `receipt`.
    pub fingerprint: String,
    pub receipt: TradeReceipt,
    pub stored_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(key: IdempotencyKey, fingerprint: String, receipt: TradeReceipt) -> Self {
        Self {
            key,
            fingerprint,
            receipt,
            stored_at: Utc::now(),
        }
    }

    /// Whether a request with `fingerprint` may replay this record.
    pub fn matches(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }
}
