use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::CoinTrackerError;
use crate::market::{MarketDataSource, PricePoint};

#[derive(Debug, Clone)]
struct CacheEntry {
    points: Vec<PricePoint>,
    // None for entries restored from a persisted snapshot, which are always
    // refreshed before first use.
    fetched_at: Option<Instant>,
    consecutive_failures: u32,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.map_or(false, |t| t.elapsed() < ttl)
    }
}

#[derive(Debug, Clone)]
pub struct SeriesRead {
    pub points: Vec<PricePoint>,
    pub refreshed: bool,
    pub stale: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub series: HashMap<String, Vec<PricePoint>>,
}

pub struct MarketCache {
    source: Arc<dyn MarketDataSource>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_failures: u32,
}

impl MarketCache {
    pub fn new(source: Arc<dyn MarketDataSource>, ttl: Duration, max_failures: u32) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_failures,
        }
    }

    /// Serve from memory while fresh; otherwise attempt exactly one refresh.
    /// A failed refresh degrades to the last known series instead of failing
    /// the caller, so one instrument's outage cannot block the others.
    pub async fn get(&self, symbol: &str) -> Result<SeriesRead, CoinTrackerError> {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(symbol) {
                if entry.is_fresh(self.ttl) {
                    return Ok(SeriesRead {
                        points: entry.points.clone(),
                        refreshed: false,
                        stale: entry.consecutive_failures >= self.max_failures,
                    });
                }
            }
        }

        match self.source.fetch(symbol).await {
            Ok(points) => {
                debug!("refreshed {} ({} points)", symbol, points.len());
                let mut entries = self.entries.lock().await;
                entries.insert(
                    symbol.to_string(),
                    CacheEntry {
                        points: points.clone(),
                        fetched_at: Some(Instant::now()),
                        consecutive_failures: 0,
                    },
                );
                Ok(SeriesRead {
                    points,
                    refreshed: true,
                    stale: false,
                })
            }
            Err(e) => {
                let mut entries = self.entries.lock().await;
                match entries.get_mut(symbol) {
                    Some(entry) => {
                        entry.consecutive_failures += 1;
                        warn!(
                            "refresh failed for {} ({} consecutive): {}",
                            symbol, entry.consecutive_failures, e
                        );
                        Ok(SeriesRead {
                            points: entry.points.clone(),
                            refreshed: false,
                            stale: entry.consecutive_failures >= self.max_failures,
                        })
                    }
                    None => Err(CoinTrackerError::DataUnavailable {
                        symbol: symbol.to_string(),
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        let entries = self.entries.lock().await;
        CacheSnapshot {
            series: entries
                .iter()
                .map(|(symbol, entry)| (symbol.clone(), entry.points.clone()))
                .collect(),
        }
    }

    pub async fn restore(&self, snapshot: CacheSnapshot) {
        let mut entries = self.entries.lock().await;
        for (symbol, points) in snapshot.series {
            entries.insert(
                symbol,
                CacheEntry {
                    points,
                    fetched_at: None,
                    consecutive_failures: 0,
                },
            );
        }
    }
}
