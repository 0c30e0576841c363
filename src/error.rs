use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoinTrackerError {
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient data for {0}")]
    InsufficientData(String),

    #[error("alarm {id} cannot be evaluated: {reason}")]
    Evaluation { id: u64, reason: String },

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
