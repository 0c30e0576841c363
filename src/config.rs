use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoinTrackerError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: String,
    pub data_dir: PathBuf,
    pub eval_interval_secs: u64,
    pub default_cooldown_secs: u64,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub kline_interval: String,
    pub kline_limit: u32,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub sma_period: usize,
    pub ema_period: usize,
    pub max_fetch_failures: u32,
    pub send_timeout_secs: u64,
    pub retry_backoff_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            data_dir: PathBuf::from("data"),
            eval_interval_secs: 60,
            default_cooldown_secs: 900,
            cache_ttl_secs: 10,
            fetch_timeout_secs: 5,
            kline_interval: "5m".to_string(),
            kline_limit: 300,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            sma_period: 20,
            ema_period: 20,
            max_fetch_failures: 3,
            send_timeout_secs: 5,
            retry_backoff_secs: 2,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, CoinTrackerError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn eval_interval(&self) -> Duration {
        Duration::from_secs(self.eval_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}
