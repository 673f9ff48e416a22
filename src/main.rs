use std::sync::Arc;
use std::time::Duration;

use bourse::config::Config;
use bourse::services::{LedgerService, LedgerStore};
use bourse::sources::{MarketDataClient, PriceCache};
use bourse::{api, AppState};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bourse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting Bourse server on {}:{}", config.host, config.port);

    // Open the ledger store
    let store = Arc::new(LedgerStore::new(&config.database_path)?);
    let ledger = LedgerService::new(store);

    // Price cache, kept warm by the market-data poller when configured
    let prices = Arc::new(PriceCache::new());
    if let Some(ref market_url) = config.market_data_url {
        info!("Market data URL configured, starting quote polling");
        let client = Arc::new(MarketDataClient::new(market_url.clone(), prices.clone()));
        let poll_ledger = ledger.clone();
        client.start_polling(Duration::from_secs(config.price_poll_secs), move || {
            // Poll every symbol held in any open position.
            match poll_ledger.open_symbols() {
                Ok(symbols) => symbols,
                Err(e) => {
                    tracing::warn!("Failed to list open symbols: {}", e);
                    Vec::new()
                }
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        ledger,
        prices,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = api::router()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Bourse server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
