use std::env;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Path to the SQLite ledger database.
    pub database_path: String,
    /// Base URL of the market-data service (optional; without it the price
    /// cache is only populated by whatever the process writes into it).
    pub market_data_url: Option<String>,
    /// Market-data poll interval in seconds.
    pub price_poll_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with sane defaults.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "bourse.db".to_string()),
            market_data_url: env::var("MARKET_DATA_URL").ok(),
            price_poll_secs: env::var("PRICE_POLL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
        }
    }
}
