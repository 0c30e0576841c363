use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::alarm::{Alarm, AlarmCondition, AlarmState};
use crate::error::CoinTrackerError;
use crate::market::indicators::IndicatorSnapshot;
use crate::market::{MarketDataSource, PricePoint};
use crate::notify::ChatTransport;
use crate::storage::Storage;

pub const BASE_TS: i64 = 1_700_000_000;

/// One point per minute, oldest first, ending at BASE_TS + (n-1) minutes.
pub fn points(prices: &[f64]) -> Vec<PricePoint> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &price)| PricePoint {
            timestamp: BASE_TS + i as i64 * 60,
            price,
            volume: 0.0,
        })
        .collect()
}

pub fn alarm(id: u64, symbol: &str, condition: AlarmCondition) -> Alarm {
    Alarm {
        id,
        owner: "7".to_string(),
        symbol: symbol.to_string(),
        condition,
        state: AlarmState::Active,
        last_fired: None,
        cooldown_secs: None,
        trigger_count: 0,
        created_at: BASE_TS,
        expires_at: None,
    }
}

pub fn snapshot_at(symbol: &str, price: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        symbol: symbol.to_string(),
        timestamp: BASE_TS,
        price,
        stale: false,
        values: HashMap::new(),
        points: points(&[price]),
    }
}

pub fn snapshot_with(symbol: &str, price: f64, values: &[(&str, f64)]) -> IndicatorSnapshot {
    let mut snapshot = snapshot_at(symbol, price);
    snapshot.values = values
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect();
    snapshot
}

pub fn snapshot_from_points(symbol: &str, points: Vec<PricePoint>) -> IndicatorSnapshot {
    let last = points.last().expect("snapshot needs at least one point");
    IndicatorSnapshot {
        symbol: symbol.to_string(),
        timestamp: last.timestamp,
        price: last.price,
        stale: false,
        values: HashMap::new(),
        points,
    }
}

/// Market data source backed by a mutable in-memory series per symbol.
pub struct StaticSource {
    pub series: Mutex<HashMap<String, Vec<PricePoint>>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(symbol: &str, prices: &[f64]) -> Self {
        let source = Self::new();
        source.set(symbol, prices);
        source
    }

    pub fn set(&self, symbol: &str, prices: &[f64]) {
        self.series
            .lock()
            .unwrap()
            .insert(symbol.to_string(), points(prices));
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    async fn fetch(&self, symbol: &str) -> Result<Vec<PricePoint>, CoinTrackerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoinTrackerError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        self.series
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| CoinTrackerError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })
    }
}

/// Chat transport that records deliveries and can fail the next N sends.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    pub failures_remaining: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures_remaining: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, owner: &str, message: &str) -> Result<(), CoinTrackerError> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(CoinTrackerError::Delivery(
                "simulated send failure".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((owner.to_string(), message.to_string()));
        Ok(())
    }
}

/// In-memory storage that can be switched into a failing mode.
pub struct MemoryStorage {
    pub docs: Mutex<HashMap<String, String>>,
    pub fail_saves: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            fail_saves: AtomicBool::new(false),
        }
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CoinTrackerError> {
        Ok(self.docs.lock().unwrap().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoinTrackerError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CoinTrackerError::Storage(format!(
                "simulated write failure for {}",
                key
            )));
        }
        self.docs
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
