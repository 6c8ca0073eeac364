//! Price provider traits and the fallback merge chain.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tickerdeck_common::{Quote, TokenId, TokenRef};
use tracing::{debug, warn};

use crate::error::{MarketError, MarketResult};

/// Trait for upstream USD price sources.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Check if this provider can quote the token at all.
    fn supports(&self, _token: &TokenRef) -> bool {
        true
    }

    /// Fetch USD quotes for a batch of tokens.
    ///
    /// Tokens the upstream does not know are absent from the result rather
    /// than failing the batch.
    async fn fetch_prices(&self, tokens: &[TokenRef]) -> MarketResult<Vec<Quote>>;
}

/// Tries providers in order, asking each one only for tokens still missing.
pub struct FallbackPriceProvider {
    providers: Vec<Arc<dyn PriceProvider>>,
    failures: DashMap<String, u64>,
}

impl FallbackPriceProvider {
    /// Create a new fallback chain. Earlier providers win.
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        Self {
            providers,
            failures: DashMap::new(),
        }
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Failure counts per provider since start.
    pub fn failure_counts(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .failures
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        counts.sort();
        counts
    }
}

#[async_trait]
impl PriceProvider for FallbackPriceProvider {
    fn name(&self) -> &str {
        "FALLBACK"
    }

    fn supports(&self, token: &TokenRef) -> bool {
        self.providers.iter().any(|p| p.supports(token))
    }

    async fn fetch_prices(&self, tokens: &[TokenRef]) -> MarketResult<Vec<Quote>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: HashSet<&TokenId> = tokens.iter().map(|t| &t.id).collect();
        let mut answered: HashSet<TokenId> = HashSet::new();
        let mut quotes = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for provider in &self.providers {
            let pending: Vec<TokenRef> = tokens
                .iter()
                .filter(|t| !answered.contains(&t.id) && provider.supports(t))
                .cloned()
                .collect();
            if pending.is_empty() {
                continue;
            }

            attempted += 1;
            match provider.fetch_prices(&pending).await {
                Ok(batch) => {
                    let before = quotes.len();
                    for quote in batch {
                        if wanted.contains(&quote.token_id) && answered.insert(quote.token_id.clone()) {
                            quotes.push(quote);
                        }
                    }
                    debug!(
                        provider = provider.name(),
                        requested = pending.len(),
                        answered = quotes.len() - before,
                        "Got prices from provider"
                    );
                }
                Err(e) => {
                    failed += 1;
                    *self.failures.entry(provider.name().to_string()).or_insert(0) += 1;
                    warn!(
                        provider = provider.name(),
                        requested = pending.len(),
                        error = %e,
                        "Provider failed to return prices"
                    );
                }
            }

            if answered.len() == wanted.len() {
                break;
            }
        }

        if attempted == 0 {
            return Err(MarketError::NoProvidersAvailable);
        }
        if failed == attempted && quotes.is_empty() {
            return Err(MarketError::AllProvidersFailed);
        }

        Ok(quotes)
    }
}

/// Mock price provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockPriceProvider {
    name: String,
    quotes: DashMap<TokenId, Quote>,
    failing: std::sync::atomic::AtomicBool,
    delay: parking_lot::Mutex<Option<std::time::Duration>>,
    requests: parking_lot::Mutex<Vec<Vec<TokenId>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockPriceProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quotes: DashMap::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
            delay: parking_lot::Mutex::new(None),
            requests: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set the USD price of a token.
    pub fn set_price(&self, token_id: &str, usd: rust_decimal::Decimal) {
        let id = TokenId::new(token_id);
        self.quotes
            .insert(id.clone(), Quote::new(id, usd, self.name.clone()));
    }

    /// Set a full quote.
    pub fn set_quote(&self, quote: Quote) {
        self.quotes.insert(quote.token_id.clone(), quote);
    }

    /// Make every subsequent fetch fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Hold every subsequent fetch for `delay` before answering.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Token ids of every request received, in order.
    pub fn requests(&self) -> Vec<Vec<TokenId>> {
        self.requests.lock().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl PriceProvider for MockPriceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_prices(&self, tokens: &[TokenRef]) -> MarketResult<Vec<Quote>> {
        self.requests
            .lock()
            .push(tokens.iter().map(|t| t.id.clone()).collect());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MarketError::ProviderError {
                provider: self.name.clone(),
                message: "mock failure".to_string(),
            });
        }

        Ok(tokens
            .iter()
            .filter_map(|t| self.quotes.get(&t.id).map(|q| q.clone()))
            .collect())
    }
}
