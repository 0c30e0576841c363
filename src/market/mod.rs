pub mod cache;
pub mod indicators;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoinTrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
    pub volume: f64,
}

/// Remote read-only market data. Implementations must bound each call with
/// a timeout; the cache's TTL is how the engine respects upstream rate limits.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the recent price series for a symbol, oldest first.
    async fn fetch(&self, symbol: &str) -> Result<Vec<PricePoint>, CoinTrackerError>;
}
