//! Monetary types for TickerDeck.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places kept for sub-unit prices (e.g. 0.00001234 EUR).
pub const SUB_UNIT_PRICE_DP: u32 = 8;

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Three ASCII letters.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 3 && self.0.chars().all(|c| c.is_ascii_uppercase())
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    /// Round a unit price in this currency.
    ///
    /// Prices of at least one unit use the currency's standard precision,
    /// smaller prices keep [`SUB_UNIT_PRICE_DP`] places so cheap tokens do
    /// not collapse to zero.
    pub fn round_price(&self, value: Decimal) -> Decimal {
        if value.abs() >= Decimal::ONE {
            value.round_dp(self.decimal_places())
        } else {
            value.round_dp(SUB_UNIT_PRICE_DP)
        }
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A currency pair for FX operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency.
    pub base: Currency,
    /// Quote currency.
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// USD into the given currency, the only direction prices are converted.
    pub fn from_usd(quote: Currency) -> Self {
        Self::new(Currency::usd(), quote)
    }

    /// Whether base and quote are the same currency.
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// FX rate between two currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    /// The currency pair.
    pub pair: CurrencyPair,
    /// Units of quote currency per unit of base currency.
    pub rate: Decimal,
    /// When this rate was quoted.
    pub quoted_at: DateTime<Utc>,
    /// Rate source.
    pub source: String,
}

impl FxRate {
    /// Create a new FX rate quoted now.
    pub fn new(pair: CurrencyPair, rate: Decimal, source: impl Into<String>) -> Self {
        Self {
            pair,
            rate,
            quoted_at: Utc::now(),
            source: source.into(),
        }
    }

    /// The `X/X` rate.
    pub fn identity(currency: Currency) -> Self {
        Self::new(
            CurrencyPair::new(currency.clone(), currency),
            Decimal::ONE,
            "IDENTITY",
        )
    }

    /// Convert a base-currency unit price into the quote currency.
    ///
    /// `None` if the product does not fit in a `Decimal`.
    pub fn convert_price(&self, value: Decimal) -> Option<Decimal> {
        value
            .checked_mul(self.rate)
            .map(|v| self.pair.quote.round_price(v))
    }
}
