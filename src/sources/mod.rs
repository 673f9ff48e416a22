//! Market-data collaborators: the in-process price cache the ledger reads
//! from, and the HTTP client that keeps it warm.

mod market;

pub use market::{MarketDataClient, PriceCache, PriceQuote};
