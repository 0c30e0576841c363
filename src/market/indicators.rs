use std::collections::HashMap;

use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::Next;

use crate::config::Config;
use crate::market::PricePoint;

/// Everything derived from one instrument's price series in one cycle.
/// Recomputed every cycle, never persisted.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timestamp: i64,
    pub price: f64,
    pub stale: bool,
    pub values: HashMap<String, f64>,
    pub points: Vec<PricePoint>,
}

impl IndicatorSnapshot {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

// All computations return None when the series is shorter than the
// indicator's window; callers treat that as "not evaluable this cycle".

pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }
    let mut rsi = RelativeStrengthIndex::new(period).ok()?;
    prices.iter().fold(None, |_, &p| Some(rsi.next(p)))
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64)> {
    if prices.len() < slow + signal {
        return None;
    }
    let mut macd = MovingAverageConvergenceDivergence::new(fast, slow, signal).ok()?;
    let out = prices.iter().fold(None, |_, &p| Some(macd.next(p)))?;
    Some((out.macd, out.signal))
}

pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let mut sma = SimpleMovingAverage::new(period).ok()?;
    prices.iter().fold(None, |_, &p| Some(sma.next(p)))
}

pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let mut ema = ExponentialMovingAverage::new(period).ok()?;
    prices.iter().fold(None, |_, &p| Some(ema.next(p)))
}

/// Percent change between the latest price and the newest point at least
/// `window_secs` old. Windows are wall-clock so the result stays correct
/// when evaluation cycles are missed or irregular.
pub fn percent_change(points: &[PricePoint], window_secs: i64, now: i64) -> Option<f64> {
    let latest = points.last()?;
    let cutoff = now - window_secs;
    let reference = points.iter().rev().find(|p| p.timestamp <= cutoff)?;
    if reference.price == 0.0 {
        return None;
    }
    Some((latest.price - reference.price) / reference.price * 100.0)
}

pub fn volatility(prices: &[f64]) -> Option<f64> {
    let first = *prices.first()?;
    let high = prices.iter().fold(first, |acc, &p| acc.max(p));
    let low = prices.iter().fold(first, |acc, &p| acc.min(p));
    if low == 0.0 {
        return Some(0.0);
    }
    Some((high - low) / low * 100.0)
}

/// Whether a name can ever appear in a snapshot. Distinguishes "not enough
/// history yet" from a condition referencing an indicator that does not exist.
pub fn is_supported(name: &str) -> bool {
    if matches!(name, "macd" | "macd_signal" | "volatility") {
        return true;
    }
    match name.split_once('_') {
        Some((prefix, period)) => {
            matches!(prefix, "rsi" | "sma" | "ema") && period.parse::<usize>().is_ok()
        }
        None => false,
    }
}

pub fn snapshot(
    symbol: &str,
    points: &[PricePoint],
    stale: bool,
    config: &Config,
    now: i64,
) -> Option<IndicatorSnapshot> {
    let last = points.last()?;
    let closes: Vec<f64> = points.iter().map(|p| p.price).collect();

    let mut values = HashMap::new();
    if let Some(v) = rsi(&closes, config.rsi_period) {
        values.insert(format!("rsi_{}", config.rsi_period), v);
    }
    if let Some((m, s)) = macd(&closes, config.macd_fast, config.macd_slow, config.macd_signal) {
        values.insert("macd".to_string(), m);
        values.insert("macd_signal".to_string(), s);
    }
    if let Some(v) = sma(&closes, config.sma_period) {
        values.insert(format!("sma_{}", config.sma_period), v);
    }
    if let Some(v) = ema(&closes, config.ema_period) {
        values.insert(format!("ema_{}", config.ema_period), v);
    }
    if let Some(v) = volatility(&closes) {
        values.insert("volatility".to_string(), v);
    }

    Some(IndicatorSnapshot {
        symbol: symbol.to_string(),
        timestamp: now,
        price: last.price,
        stale,
        values,
        points: points.to_vec(),
    })
}
