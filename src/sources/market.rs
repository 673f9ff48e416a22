//! Price source.
//!
//! The ledger core never fails hard on missing market data: valuations
//! treat unpriced symbols as zero contribution. `PriceCache` is the
//! synchronous view the request adapter reads; `MarketDataClient` polls an
//! external market-data service and refreshes the cache in the background.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};

/// A cached quote for one symbol.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    /// Last observed price
    pub price: Decimal,
    /// Previous session close, if known
    pub previous_close: Option<Decimal>,
    /// When the quote was observed (ms)
    pub updated_at: i64,
}

/// Thread-safe symbol -> quote cache.
#[derive(Default)]
pub struct PriceCache {
    quotes: DashMap<String, PriceQuote>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price observation for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let now = chrono::Utc::now().timestamp_millis();
        self.quotes
            .entry(symbol.to_string())
            .and_modify(|q| {
                q.price = price;
                q.updated_at = now;
            })
            .or_insert(PriceQuote {
                price,
                previous_close: None,
                updated_at: now,
            });
    }

    /// Record a previous session close for a symbol.
    pub fn set_previous_close(&self, symbol: &str, close: Decimal) {
        let now = chrono::Utc::now().timestamp_millis();
        self.quotes
            .entry(symbol.to_string())
            .and_modify(|q| q.previous_close = Some(close))
            .or_insert(PriceQuote {
                price: close,
                previous_close: Some(close),
                updated_at: now,
            });
    }

    /// Latest price for a symbol, if cached.
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.quotes.get(symbol).map(|q| q.price)
    }

    /// Latest price for a symbol, failing with `PriceUnavailable` when the
    /// symbol has never been quoted. Used where a hard price is required
    /// (market order execution).
    pub fn current_price(&self, symbol: &str) -> Result<Decimal> {
        self.price(symbol)
            .ok_or_else(|| LedgerError::PriceUnavailable(symbol.to_string()))
    }

    /// Prices for the requested symbols. Symbols without a quote are simply
    /// omitted; valuation treats them as zero contribution.
    pub fn prices(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        symbols
            .iter()
            .filter_map(|s| self.price(s).map(|p| (s.clone(), p)))
            .collect()
    }

    /// Previous closes for the requested symbols, where known.
    pub fn previous_closes(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        symbols
            .iter()
            .filter_map(|s| {
                self.quotes
                    .get(s)
                    .and_then(|q| q.previous_close)
                    .map(|p| (s.clone(), p))
            })
            .collect()
    }
}

/// Wire format of the market-data service's quote endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotesResponse {
    prices: HashMap<String, Decimal>,
    #[serde(default)]
    previous_closes: HashMap<String, Decimal>,
}

/// HTTP client against the external market-data service.
pub struct MarketDataClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<PriceCache>,
}

impl MarketDataClient {
    pub fn new(base_url: String, cache: Arc<PriceCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            cache,
        }
    }

    /// Fetch quotes for the given symbols and refresh the cache.
    pub async fn refresh(&self, symbols: &[String]) -> Result<()> {
        if symbols.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/v1/quotes", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbols", symbols.join(","))])
            .send()
            .await?
            .error_for_status()?;
        let quotes: QuotesResponse = response.json().await?;

        for (symbol, price) in &quotes.prices {
            self.cache.set_price(symbol, *price);
        }
        for (symbol, close) in &quotes.previous_closes {
            self.cache.set_previous_close(symbol, *close);
        }

        debug!("Refreshed {} quotes from market data", quotes.prices.len());
        Ok(())
    }

    /// Poll the market-data service on an interval, refreshing quotes for
    /// every symbol the given callback reports.
    pub fn start_polling<F>(self: Arc<Self>, interval: Duration, symbols: F)
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let symbols = symbols();
                if let Err(e) = self.refresh(&symbols).await {
                    warn!("Market data refresh failed: {}", e);
                }
            }
        });
    }
}
