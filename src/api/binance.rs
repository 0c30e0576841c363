use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::CoinTrackerError;
use crate::market::{MarketDataSource, PricePoint};

const BINANCE_API_URL: &str = "https://api.binance.com";

// Binance returns each kline as a positional JSON array:
// [open time, open, high, low, close, volume, close time, quote volume,
//  trades, taker base, taker quote, ignore]
type RawKline = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

pub struct BinanceSource {
    client: Client,
    interval: String,
    limit: u32,
}

impl BinanceSource {
    pub fn new(interval: &str, limit: u32, timeout: Duration) -> Result<Self, CoinTrackerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            interval: interval.to_string(),
            limit,
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceSource {
    async fn fetch(&self, symbol: &str) -> Result<Vec<PricePoint>, CoinTrackerError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}USDT&interval={}&limit={}",
            BINANCE_API_URL,
            symbol.to_uppercase(),
            self.interval,
            self.limit
        );
        let klines: Vec<RawKline> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut points = Vec::with_capacity(klines.len());
        for kline in klines {
            let price: f64 = kline.4.parse().map_err(|_| CoinTrackerError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("unparseable close price '{}'", kline.4),
            })?;
            let volume: f64 = kline.5.parse().unwrap_or(0.0);
            points.push(PricePoint {
                timestamp: kline.0 / 1000,
                price,
                volume,
            });
        }
        Ok(points)
    }
}
